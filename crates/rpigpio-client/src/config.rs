use std::time::Duration;

use rpigpio_frame::FrameConfig;
use rpigpio_transport::TcpEndpoint;

/// Default time allowed for establishing each TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by the command channel and the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: TcpEndpoint,
    pub connect_timeout: Duration,
    /// Applied to both sockets. Reads never time out: a response is awaited
    /// for as long as the daemon takes.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: TcpEndpoint::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `endpoint` with default timeouts.
    pub fn new(endpoint: TcpEndpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Endpoint from `PIGPIO_ADDR` / `PIGPIO_PORT`, default timeouts.
    pub fn from_env() -> Self {
        Self::new(TcpEndpoint::from_env())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            read_timeout: None,
            write_timeout: self.write_timeout,
        }
    }
}
