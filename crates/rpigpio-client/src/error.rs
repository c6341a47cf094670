use std::time::Duration;

use crate::codes::ErrorCode;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum PigpioError {
    /// The daemon rejected a command.
    #[error("daemon error {code}: {message}")]
    Daemon { code: i32, message: &'static str },

    /// The daemon returned a negative result that is not in the code table.
    #[error("daemon returned unmapped error code {0}")]
    UnknownCode(i32),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpigpio_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rpigpio_frame::FrameError),

    /// A wait or guarded operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The notification listener is not running.
    #[error("notification listener not started")]
    NotStarted,

    /// The notification stream ended without a stop request.
    #[error("notification stream disconnected: {0}")]
    Disconnected(String),

    /// GPIO number outside the range the notification stream reports.
    #[error("GPIO {0} not 0-31")]
    InvalidGpio(u32),

    /// A blocking measurement was disabled from another thread before it
    /// produced a result.
    #[error("measurement cancelled")]
    Cancelled,

    /// A caller-supplied argument cannot be encoded or used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PigpioError {
    /// Translate a negative daemon result.
    pub fn daemon(code: i32) -> Self {
        match ErrorCode::from_code(code) {
            Some(known) => Self::Daemon {
                code,
                message: known.message(),
            },
            None => Self::UnknownCode(code),
        }
    }

    /// The daemon code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Daemon { code, .. } | Self::UnknownCode(code) => Some(*code),
            _ => None,
        }
    }

    /// The table entry for a daemon error.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Daemon { code, .. } => ErrorCode::from_code(*code),
            _ => None,
        }
    }

    /// True for transport and framing faults.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Frame(_))
    }
}

pub type Result<T> = std::result::Result<T, PigpioError>;
