use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpigpio_client::EdgeEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that can be printed in every output format.
pub trait Record: Serialize {
    /// Label/value pairs for the table and pretty formats.
    fn fields(&self) -> Vec<(&'static str, String)>;
}

/// One level change as reported by the notification stream.
#[derive(Serialize)]
pub struct EdgeOutput {
    pub gpio: u32,
    pub level: u8,
    pub tick: u32,
}

impl From<EdgeEvent> for EdgeOutput {
    fn from(event: EdgeEvent) -> Self {
        Self {
            gpio: event.gpio,
            level: event.level.code() as u8,
            tick: event.tick,
        }
    }
}

impl Record for EdgeOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gpio", self.gpio.to_string()),
            ("level", self.level.to_string()),
            ("tick", self.tick.to_string()),
        ]
    }
}

pub fn print_record<R: Record>(record: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (label, value) in record.fields() {
                table.add_row(vec![label.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = record
                .fields()
                .into_iter()
                .map(|(label, value)| format!("{label}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

/// Render many records of one kind as a single table, or one line each.
pub fn print_records<R: Record>(records: &[R], format: OutputFormat) {
    match format {
        OutputFormat::Table if !records.is_empty() => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(
                    records[0]
                        .fields()
                        .into_iter()
                        .map(|(label, _)| label.to_ascii_uppercase())
                        .collect::<Vec<_>>(),
                );
            for record in records {
                table.add_row(
                    record
                        .fields()
                        .into_iter()
                        .map(|(_, value)| value)
                        .collect::<Vec<_>>(),
                );
            }
            println!("{table}");
        }
        _ => {
            for record in records {
                print_record(record, format);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        gpio: u32,
        level: u8,
    }

    impl Record for Sample {
        fn fields(&self) -> Vec<(&'static str, String)> {
            vec![("gpio", self.gpio.to_string()), ("level", self.level.to_string())]
        }
    }

    #[test]
    fn json_uses_serde_field_names() {
        let json =
            serde_json::to_string(&Sample { gpio: 4, level: 1 }).expect("sample should serialize");
        assert_eq!(json, r#"{"gpio":4,"level":1}"#);
    }

    #[test]
    fn fields_are_ordered() {
        let labels: Vec<_> = Sample { gpio: 4, level: 1 }
            .fields()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["gpio", "level"]);
    }
}
