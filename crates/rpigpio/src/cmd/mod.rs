use std::time::Duration;

use clap::{Args, Subcommand};
use rpigpio_client::{ClientConfig, Edge, EdgeTrigger, Level, Mode, Pi, Pull};
use rpigpio_transport::{TcpEndpoint, DEFAULT_HOST, DEFAULT_PORT, ENV_ADDR, ENV_PORT};

use crate::exit::{pigpio_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod mode;
pub mod monitor;
pub mod pud;
pub mod read;
pub mod time;
pub mod version;
pub mod wait;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read GPIO levels.
    Read(ReadArgs),
    /// Drive a GPIO low or high.
    Write(WriteArgs),
    /// Show or set a GPIO mode.
    Mode(ModeArgs),
    /// Set a GPIO pull resistor.
    Pud(PudArgs),
    /// Block until a GPIO edge arrives.
    Wait(WaitArgs),
    /// Measure the time between two edges.
    Time(TimeArgs),
    /// Print level changes as they arrive.
    Monitor(MonitorArgs),
    /// Show daemon tick, hardware revision and version.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Read(args) => read::run(args, daemon, format),
        Command::Write(args) => write::run(args, daemon, format),
        Command::Mode(args) => mode::run(args, daemon, format),
        Command::Pud(args) => pud::run(args, daemon, format),
        Command::Wait(args) => wait::run(args, daemon, format),
        Command::Time(args) => time::run(args, daemon, format),
        Command::Monitor(args) => monitor::run(args, daemon, format),
        Command::Info(args) => info::run(args, daemon, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the daemon lives; shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Daemon host name or address.
    #[arg(long, env = ENV_ADDR, default_value = DEFAULT_HOST, global = true)]
    pub host: String,
    /// Daemon TCP port.
    #[arg(long, env = ENV_PORT, default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    pub connect_timeout: String,
}

impl DaemonArgs {
    pub fn config(&self) -> CliResult<ClientConfig> {
        let timeout = parse_duration(&self.connect_timeout)?;
        Ok(ClientConfig::new(TcpEndpoint::new(self.host.clone(), self.port))
            .with_connect_timeout(timeout))
    }

    pub fn connect(&self) -> CliResult<Pi> {
        let config = self.config()?;
        let endpoint = config.endpoint.to_string();
        Pi::connect(config).map_err(|err| pigpio_error(&format!("connect to {endpoint}"), err))
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// GPIOs to read.
    #[arg(required = true, num_args = 1..)]
    pub gpios: Vec<u32>,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    pub gpio: u32,
    /// Level: 0, 1, low or high.
    pub level: Level,
}

#[derive(Args, Debug)]
pub struct ModeArgs {
    pub gpio: u32,
    /// Mode to set (input, output, alt0-alt5). Omit to only read it.
    pub mode: Option<Mode>,
}

#[derive(Args, Debug)]
pub struct PudArgs {
    pub gpio: u32,
    /// Pull: off, down or up.
    pub pull: Pull,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    pub gpio: u32,
    /// Edge to wait for: rising, falling or either.
    #[arg(long, default_value = "either")]
    pub edge: Edge,
    /// Maximum wait (e.g. 10s, 250ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct TimeArgs {
    /// Start trigger as GPIO:EDGE, e.g. 19:falling.
    #[arg(long)]
    pub start: EdgeTrigger,
    /// Stop trigger as GPIO:EDGE, e.g. 26:rising.
    #[arg(long)]
    pub stop: EdgeTrigger,
    /// Guard timeout (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// GPIOs to watch.
    #[arg(required = true, num_args = 1..)]
    pub gpios: Vec<u32>,
    /// Edge to report: rising, falling or either.
    #[arg(long, default_value = "either")]
    pub edge: Edge,
    /// Exit after N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `250ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// The daemon reports levels as 0/1; keep that in machine output.
pub fn level_bit(level: Level) -> u8 {
    level.code() as u8
}
