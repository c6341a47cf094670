use std::sync::Arc;

use bytes::Bytes;

use crate::channel::{extension_len, param, CommandChannel};
use crate::error::Result;
use crate::opcode::Opcode;

/// Opens I2C devices on the daemon's buses.
#[derive(Debug, Clone)]
pub struct I2c {
    channel: Arc<CommandChannel>,
}

impl I2c {
    pub fn new(channel: Arc<CommandChannel>) -> Self {
        Self { channel }
    }

    /// Open the device at `address` on `bus`. `flags` is reserved and
    /// should be 0.
    pub fn open(&self, bus: u32, address: u32, flags: u32) -> Result<I2cDevice> {
        let flags = flags.to_le_bytes();
        let handle = self.channel.execute(
            Opcode::I2co,
            param("bus", bus)?,
            param("address", address)?,
            extension_len(&flags)?,
            Some(&flags),
        )?;
        Ok(I2cDevice {
            channel: Arc::clone(&self.channel),
            handle: handle as u32,
            bus,
            address,
        })
    }
}

/// An open I2C device handle.
#[derive(Debug)]
pub struct I2cDevice {
    channel: Arc<CommandChannel>,
    handle: u32,
    bus: u32,
    address: u32,
}

impl I2cDevice {
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn close(self) -> Result<()> {
        self.command(Opcode::I2cc, 0, None)?;
        Ok(())
    }

    /// Write `data` as a single transaction.
    pub fn write_device(&self, data: &[u8]) -> Result<()> {
        self.channel.execute(
            Opcode::I2cwd,
            self.handle as i32,
            0,
            extension_len(data)?,
            Some(data),
        )?;
        Ok(())
    }

    /// Read up to `count` bytes as a single transaction.
    pub fn read_device(&self, count: u32) -> Result<Bytes> {
        self.channel.execute_read(
            Opcode::I2crd,
            self.handle as i32,
            param("count", count)?,
            0,
            None,
        )
    }

    pub fn write_byte(&self, value: u8) -> Result<()> {
        self.command(Opcode::I2cws, i32::from(value), None)?;
        Ok(())
    }

    pub fn read_byte(&self) -> Result<u8> {
        Ok(self.command(Opcode::I2crs, 0, None)? as u8)
    }

    /// Write `value` to register `register`.
    pub fn write_byte_data(&self, register: u8, value: u8) -> Result<()> {
        let value = u32::from(value).to_le_bytes();
        self.channel.execute(
            Opcode::I2cwb,
            self.handle as i32,
            i32::from(register),
            extension_len(&value)?,
            Some(&value),
        )?;
        Ok(())
    }

    /// Read register `register`.
    pub fn read_byte_data(&self, register: u8) -> Result<u8> {
        Ok(self.command(Opcode::I2crb, i32::from(register), None)? as u8)
    }

    fn command(&self, opcode: Opcode, p2: i32, extension: Option<&[u8]>) -> Result<i32> {
        self.channel
            .execute(opcode, self.handle as i32, p2, 0, extension)
    }
}
