use std::sync::Arc;

use bytes::Bytes;

use crate::channel::{extension_len, param, CommandChannel};
use crate::error::Result;
use crate::opcode::Opcode;

/// Opens SPI channels.
#[derive(Debug, Clone)]
pub struct Spi {
    channel: Arc<CommandChannel>,
}

impl Spi {
    pub fn new(channel: Arc<CommandChannel>) -> Self {
        Self { channel }
    }

    /// Open SPI `channel` at `baud` bits per second with mode/flag bits
    /// `flags`.
    pub fn open(&self, channel: u32, baud: u32, flags: u32) -> Result<SpiDevice> {
        let flag_bytes = flags.to_le_bytes();
        let handle = self.channel.execute(
            Opcode::Spio,
            param("channel", channel)?,
            param("baud", baud)?,
            extension_len(&flag_bytes)?,
            Some(&flag_bytes),
        )?;
        Ok(SpiDevice {
            channel: Arc::clone(&self.channel),
            handle: handle as u32,
        })
    }
}

/// An open SPI handle.
#[derive(Debug)]
pub struct SpiDevice {
    channel: Arc<CommandChannel>,
    handle: u32,
}

impl SpiDevice {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn close(self) -> Result<()> {
        self.channel
            .execute(Opcode::Spic, self.handle as i32, 0, 0, None)?;
        Ok(())
    }

    /// Clock in `count` bytes.
    pub fn read(&self, count: u32) -> Result<Bytes> {
        self.channel.execute_read(
            Opcode::Spir,
            self.handle as i32,
            param("count", count)?,
            0,
            None,
        )
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.channel.execute(
            Opcode::Spiw,
            self.handle as i32,
            0,
            extension_len(data)?,
            Some(data),
        )?;
        Ok(())
    }

    /// Clock `data` out while clocking the same number of bytes in.
    pub fn transfer(&self, data: &[u8]) -> Result<Bytes> {
        self.channel.execute_read(
            Opcode::Spix,
            self.handle as i32,
            0,
            extension_len(data)?,
            Some(data),
        )
    }
}
