/// Errors that can occur while exchanging frames with the daemon.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The response does not answer the command that was sent.
    #[error("response for command {actual} while waiting for command {expected}")]
    UnexpectedResponse { expected: u32, actual: u32 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
