use serde::Serialize;

use crate::cmd::{level_bit, DaemonArgs, ReadArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_records, OutputFormat, Record};

#[derive(Serialize)]
struct LevelOutput {
    gpio: u32,
    level: u8,
}

impl Record for LevelOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("gpio", self.gpio.to_string()), ("level", self.level.to_string())]
    }
}

pub fn run(args: ReadArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;
    let gpio = pi.gpio();

    let mut levels = Vec::with_capacity(args.gpios.len());
    for number in args.gpios {
        let level = gpio
            .read(number)
            .map_err(|err| pigpio_error(&format!("read GPIO {number}"), err))?;
        levels.push(LevelOutput {
            gpio: number,
            level: level_bit(level),
        });
    }

    print_records(&levels, format);
    Ok(SUCCESS)
}
