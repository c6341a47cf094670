//! TCP transport to a pigpio daemon.
//!
//! The daemon speaks a fixed-size binary protocol over plain TCP. A client
//! opens two independent connections to the same endpoint: one for
//! command/response pairs and one for the GPIO notification stream.
//!
//! This is the lowest layer of rpigpio. Everything else builds on top of
//! the [`DaemonStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::DaemonStream;
pub use tcp::{TcpEndpoint, DEFAULT_HOST, DEFAULT_PORT, ENV_ADDR, ENV_PORT};
