use crate::config::ClientConfig;
use crate::error::Result;
use crate::pi::Pi;

/// Connect to the daemon named by `PIGPIO_ADDR` / `PIGPIO_PORT`
/// (default `localhost:8888`).
pub fn connect() -> Result<Pi> {
    connect_with_config(ClientConfig::from_env())
}

/// Connect with explicit configuration.
pub fn connect_with_config(config: ClientConfig) -> Result<Pi> {
    Pi::connect(config)
}
