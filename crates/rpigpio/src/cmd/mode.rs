use serde::Serialize;

use crate::cmd::{DaemonArgs, ModeArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct ModeOutput {
    gpio: u32,
    mode: &'static str,
    code: u32,
}

impl Record for ModeOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gpio", self.gpio.to_string()),
            ("mode", self.mode.to_string()),
            ("code", self.code.to_string()),
        ]
    }
}

pub fn run(args: ModeArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;
    let gpio = pi.gpio();

    if let Some(mode) = args.mode {
        gpio.set_mode(args.gpio, mode)
            .map_err(|err| pigpio_error(&format!("set mode of GPIO {}", args.gpio), err))?;
    }
    let mode = gpio
        .get_mode(args.gpio)
        .map_err(|err| pigpio_error(&format!("get mode of GPIO {}", args.gpio), err))?;

    print_record(
        &ModeOutput {
            gpio: args.gpio,
            mode: mode.name(),
            code: mode.code(),
        },
        format,
    );
    Ok(SUCCESS)
}
