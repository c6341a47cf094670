//! Blocking client for the pigpio daemon.
//!
//! This is the "just works" layer. Connect with [`connect`], then drive
//! GPIO, I2C, SPI and serial peripherals through the [`Pi`] facade, or
//! subscribe to level changes and time edges through the
//! [`NotificationListener`] and [`EventTimer`].
//!
//! ```no_run
//! use std::time::Duration;
//! use rpigpio_client::{Edge, EdgeTrigger};
//!
//! let pi = rpigpio_client::connect()?;
//! let timer = pi.event_timer()?;
//! timer.configure(EdgeTrigger::new(19, Edge::Falling), EdgeTrigger::new(26, Edge::Rising))?;
//! let result = timer.run(Duration::from_secs(1))?;
//! println!("{:?} after {} us", result.outcome, result.elapsed_us);
//! # Ok::<(), rpigpio_client::PigpioError>(())
//! ```

pub mod channel;
pub mod codes;
pub mod config;
pub mod connector;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod listener;
pub mod opcode;
pub mod pi;
pub mod registry;
pub mod serial;
pub mod spi;
pub mod timer;

pub use channel::{CommandChannel, HeldResponse};
pub use codes::ErrorCode;
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT};
pub use connector::{connect, connect_with_config};
pub use error::{PigpioError, Result};
pub use gpio::{Gpio, Level, Mode, Pull};
pub use i2c::{I2c, I2cDevice};
pub use listener::NotificationListener;
pub use opcode::Opcode;
pub use pi::Pi;
pub use registry::{
    Edge, EdgeCallback, EdgeEvent, SubscriberRegistry, SubscriptionId, MAX_NOTIFY_GPIO,
};
pub use serial::{Serial, SerialPort};
pub use spi::{Spi, SpiDevice};
pub use timer::{EdgeTrigger, EventTimer, TimerOutcome, TimerResult, TimerState};
