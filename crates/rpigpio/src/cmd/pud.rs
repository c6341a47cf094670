use serde::Serialize;

use crate::cmd::{DaemonArgs, PudArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct PudOutput {
    gpio: u32,
    pull: String,
}

impl Record for PudOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("gpio", self.gpio.to_string()), ("pull", self.pull.clone())]
    }
}

pub fn run(args: PudArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;
    pi.gpio()
        .set_pull_up_down(args.gpio, args.pull)
        .map_err(|err| pigpio_error(&format!("set pull of GPIO {}", args.gpio), err))?;

    print_record(
        &PudOutput {
            gpio: args.gpio,
            pull: args.pull.to_string(),
        },
        format,
    );
    Ok(SUCCESS)
}
