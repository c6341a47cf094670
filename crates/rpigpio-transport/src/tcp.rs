use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::DaemonStream;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";
/// Port the daemon listens on by default.
pub const DEFAULT_PORT: u16 = 8888;
/// Environment variable naming the daemon host.
pub const ENV_ADDR: &str = "PIGPIO_ADDR";
/// Environment variable naming the daemon port.
pub const ENV_PORT: &str = "PIGPIO_PORT";

/// Address of a pigpio daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for TcpEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TcpEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build an endpoint from `PIGPIO_ADDR` and `PIGPIO_PORT`.
    ///
    /// A missing host falls back to [`DEFAULT_HOST`]; a missing or
    /// unparsable port falls back to [`DEFAULT_PORT`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup(ENV_ADDR)
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup(ENV_PORT)
            .and_then(|port| port.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        Self { host, port }
    }

    /// Connect to the daemon (blocking).
    pub fn connect(&self, timeout: Duration) -> Result<DaemonStream> {
        let address = self.resolve()?;
        let stream = TcpStream::connect_timeout(&address, timeout).map_err(|source| {
            TransportError::Connect {
                endpoint: self.to_string(),
                source,
            }
        })?;
        info!(endpoint = %self, %address, "connected to daemon");
        DaemonStream::from_tcp(stream)
    }

    fn resolve(&self) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?
            .collect();
        // Prefer IPv4: the daemon binds 0.0.0.0 unless told otherwise.
        let address = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| TransportError::Resolve {
                endpoint: self.to_string(),
                source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"),
            })?;
        debug!(endpoint = %self, %address, "resolved daemon address");
        Ok(address)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
