use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::channel::CommandChannel;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::gpio::Gpio;
use crate::i2c::I2c;
use crate::listener::NotificationListener;
use crate::opcode::Opcode;
use crate::serial::Serial;
use crate::spi::Spi;
use crate::timer::EventTimer;

/// A connection to one daemon.
///
/// Owns the command channel and, once [`notifier`](Self::notifier) is first
/// called, the notification listener. Peripheral wrappers share the same
/// command channel.
pub struct Pi {
    config: ClientConfig,
    channel: Arc<CommandChannel>,
    notifier: Mutex<Option<Arc<NotificationListener>>>,
}

impl Pi {
    /// Open the command connection.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let channel = Arc::new(CommandChannel::connect(&config)?);
        info!(endpoint = %config.endpoint, "connected");
        Ok(Self {
            config,
            channel,
            notifier: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub fn gpio(&self) -> Gpio {
        Gpio::new(Arc::clone(&self.channel))
    }

    pub fn i2c(&self) -> I2c {
        I2c::new(Arc::clone(&self.channel))
    }

    pub fn serial(&self) -> Serial {
        Serial::new(Arc::clone(&self.channel))
    }

    pub fn spi(&self) -> Spi {
        Spi::new(Arc::clone(&self.channel))
    }

    /// The notification listener, started on first use.
    ///
    /// A listener that lost its stream is restarted.
    pub fn notifier(&self) -> Result<Arc<NotificationListener>> {
        let mut slot = lock(&self.notifier);
        let listener = slot.get_or_insert_with(|| {
            Arc::new(NotificationListener::new(
                Arc::clone(&self.channel),
                self.config.clone(),
            ))
        });
        listener.start()?;
        Ok(Arc::clone(listener))
    }

    /// A new edge timer on this connection's listener.
    pub fn event_timer(&self) -> Result<EventTimer> {
        Ok(EventTimer::new(self.notifier()?))
    }

    /// Current daemon tick in microseconds; wraps every ~72 minutes.
    pub fn tick(&self) -> Result<u32> {
        let response = self.channel.execute_raw(Opcode::Tick, 0, 0, 0, None)?;
        Ok(response.result as u32)
    }

    pub fn hardware_revision(&self) -> Result<u32> {
        let response = self.channel.execute_raw(Opcode::Hwver, 0, 0, 0, None)?;
        Ok(response.result as u32)
    }

    pub fn pigpio_version(&self) -> Result<u32> {
        Ok(self.channel.execute(Opcode::Pigpv, 0, 0, 0, None)? as u32)
    }

    /// Stop the listener (if any) and close the command connection.
    /// Repeated calls are no-ops.
    pub fn close(&self) {
        if let Some(listener) = lock(&self.notifier).take() {
            listener.stop();
        }
        self.channel.close();
    }
}

impl std::fmt::Debug for Pi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pi")
            .field("endpoint", &self.config.endpoint)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Drop for Pi {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
