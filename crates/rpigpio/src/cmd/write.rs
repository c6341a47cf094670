use serde::Serialize;

use crate::cmd::{level_bit, DaemonArgs, WriteArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct WriteOutput {
    gpio: u32,
    level: u8,
    written: bool,
}

impl Record for WriteOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gpio", self.gpio.to_string()),
            ("level", self.level.to_string()),
            ("written", self.written.to_string()),
        ]
    }
}

pub fn run(args: WriteArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;
    pi.gpio()
        .write(args.gpio, args.level)
        .map_err(|err| pigpio_error(&format!("write GPIO {}", args.gpio), err))?;

    print_record(
        &WriteOutput {
            gpio: args.gpio,
            level: level_bit(args.level),
            written: true,
        },
        format,
    );
    Ok(SUCCESS)
}
