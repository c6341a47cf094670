//! Client for the pigpio daemon.
//!
//! rpigpio drives the GPIO, I2C, SPI and serial peripherals of a Raspberry
//! Pi through the pigpio daemon's TCP socket interface, and delivers edge
//! notifications and microsecond edge timing computed from daemon ticks.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP endpoint configuration and the daemon stream
//! - [`frame`]: fixed-size command, response and notification frames
//! - [`client`]: command channel, notification listener, event timer and
//!   peripheral wrappers
//!
//! The most common entry points are re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use rpigpio_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpigpio_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use rpigpio_client::*;
}

pub use rpigpio_client::{
    connect, connect_with_config, ClientConfig, Edge, EdgeEvent, EdgeTrigger, EventTimer, Level,
    Mode, NotificationListener, PigpioError, Pi, Pull, Result, TimerOutcome, TimerResult,
    TimerState,
};
