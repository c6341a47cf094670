use std::sync::Arc;

use bytes::Bytes;

use crate::channel::{extension_len, param, CommandChannel};
use crate::error::{PigpioError, Result};
use crate::opcode::Opcode;

/// Opens serial devices attached to the daemon's host.
#[derive(Debug, Clone)]
pub struct Serial {
    channel: Arc<CommandChannel>,
}

impl Serial {
    pub fn new(channel: Arc<CommandChannel>) -> Self {
        Self { channel }
    }

    /// Open `tty` (e.g. `/dev/serial0`) at `baud`. `flags` is reserved and
    /// should be 0.
    pub fn open(&self, tty: &str, baud: u32, flags: u32) -> Result<SerialPort> {
        if tty.is_empty() {
            return Err(PigpioError::InvalidArgument("empty serial device name".into()));
        }
        let name = tty.as_bytes();
        let handle = self.channel.execute(
            Opcode::Sero,
            param("baud", baud)?,
            param("flags", flags)?,
            extension_len(name)?,
            Some(name),
        )?;
        Ok(SerialPort {
            channel: Arc::clone(&self.channel),
            handle: handle as u32,
            tty: tty.to_string(),
        })
    }
}

/// An open serial device handle.
#[derive(Debug)]
pub struct SerialPort {
    channel: Arc<CommandChannel>,
    handle: u32,
    tty: String,
}

impl SerialPort {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn tty(&self) -> &str {
        &self.tty
    }

    pub fn close(self) -> Result<()> {
        self.command(Opcode::Serc, 0)?;
        Ok(())
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.channel.execute(
            Opcode::Serw,
            self.handle as i32,
            0,
            extension_len(data)?,
            Some(data),
        )?;
        Ok(())
    }

    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.command(Opcode::Serwb, i32::from(value))?;
        Ok(())
    }

    /// Read up to `count` bytes; may return fewer, or none.
    pub fn read(&self, count: u32) -> Result<Bytes> {
        self.channel.execute_read(
            Opcode::Serr,
            self.handle as i32,
            param("count", count)?,
            0,
            None,
        )
    }

    pub fn read_byte(&self) -> Result<u8> {
        Ok(self.command(Opcode::Serrb, 0)? as u8)
    }

    /// Bytes waiting to be read.
    pub fn bytes_available(&self) -> Result<u32> {
        Ok(self.command(Opcode::Serda, 0)? as u32)
    }

    fn command(&self, opcode: Opcode, p2: i32) -> Result<i32> {
        self.channel.execute(opcode, self.handle as i32, p2, 0, None)
    }
}
