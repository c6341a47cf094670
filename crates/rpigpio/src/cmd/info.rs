use serde::Serialize;

use crate::cmd::{DaemonArgs, InfoArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct InfoOutput {
    endpoint: String,
    pigpio_version: u32,
    hardware_revision: String,
    tick: u32,
    connected: bool,
}

impl Record for InfoOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("endpoint", self.endpoint.clone()),
            ("pigpio_version", self.pigpio_version.to_string()),
            ("hardware_revision", self.hardware_revision.clone()),
            ("tick", self.tick.to_string()),
            ("connected", self.connected.to_string()),
        ]
    }
}

pub fn run(_args: InfoArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;

    let pigpio_version = pi
        .pigpio_version()
        .map_err(|err| pigpio_error("query version", err))?;
    let revision = pi
        .hardware_revision()
        .map_err(|err| pigpio_error("query hardware revision", err))?;
    let tick = pi.tick().map_err(|err| pigpio_error("query tick", err))?;

    let out = InfoOutput {
        endpoint: pi.config().endpoint.to_string(),
        pigpio_version,
        hardware_revision: format!("{revision:#010x}"),
        tick,
        connected: true,
    };

    print_record(&out, format);
    Ok(SUCCESS)
}
