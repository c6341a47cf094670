//! Diagnostics on stderr; stdout carries only command output.
//!
//! Client events are tagged with the thread that emitted them, so edges
//! dispatched on `rpigpio-notify` and guard expiries on
//! `rpigpio-timer-guard` can be told apart from the caller's thread.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Filter directives that override `--log-level`, e.g.
/// `rpigpio_client::listener=trace`.
pub const ENV_LOG: &str = "RPIGPIO_LOG";

/// Crates whose events `--log-level` applies to.
const CRATES: [&str; 4] = [
    "rpigpio",
    "rpigpio_client",
    "rpigpio_frame",
    "rpigpio_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// `level` for the client crates, errors only for everything else.
    pub fn directives(self) -> String {
        let level = self.as_str();
        CRATES
            .iter()
            .map(|name| format!("{name}={level}"))
            .fold(String::from("error"), |acc, directive| {
                acc + "," + &directive
            })
    }
}

/// The filter for this run: [`ENV_LOG`] when set and valid, else `level`.
fn filter(level: LogLevel) -> EnvFilter {
    match std::env::var(ENV_LOG) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .unwrap_or_else(|err| {
                eprintln!("ignoring {ENV_LOG}: {err}");
                EnvFilter::new(level.directives())
            }),
        _ => EnvFilter::new(level.directives()),
    }
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
