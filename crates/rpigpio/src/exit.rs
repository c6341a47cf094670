use std::fmt;
use std::io;

use rpigpio_client::PigpioError;
use rpigpio_frame::FrameError;
use rpigpio_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DAEMON_ERROR: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn pigpio_error(context: &str, err: PigpioError) -> CliError {
    match err {
        PigpioError::Transport(err) => transport_error(context, err),
        PigpioError::Frame(err) => frame_error(context, err),
        PigpioError::Daemon { .. } | PigpioError::UnknownCode(_) => {
            CliError::new(DAEMON_ERROR, format!("{context}: {err}"))
        }
        PigpioError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PigpioError::Disconnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PigpioError::InvalidGpio(_) | PigpioError::InvalidArgument(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        PigpioError::NotStarted | PigpioError::Cancelled => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}
