//! Basic GPIO commands: mode, pull, level.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::channel::{param, CommandChannel};
use crate::error::{PigpioError, Result};
use crate::opcode::Opcode;

/// Logic level of a GPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl Level {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Level {
    type Err = PigpioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "low" | "off" => Ok(Level::Low),
            "1" | "high" | "on" => Ok(Level::High),
            other => Err(PigpioError::InvalidArgument(format!(
                "unknown level '{other}' (expected 0 or 1)"
            ))),
        }
    }
}

/// GPIO function select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Mode {
    Input = 0,
    Output = 1,
    Alt0 = 4,
    Alt1 = 5,
    Alt2 = 6,
    Alt3 = 7,
    Alt4 = 3,
    Alt5 = 2,
}

impl Mode {
    pub const ALL: [Mode; 8] = [
        Mode::Input,
        Mode::Output,
        Mode::Alt0,
        Mode::Alt1,
        Mode::Alt2,
        Mode::Alt3,
        Mode::Alt4,
        Mode::Alt5,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Input => "input",
            Mode::Output => "output",
            Mode::Alt0 => "alt0",
            Mode::Alt1 => "alt1",
            Mode::Alt2 => "alt2",
            Mode::Alt3 => "alt3",
            Mode::Alt4 => "alt4",
            Mode::Alt5 => "alt5",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = PigpioError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "in" => return Ok(Mode::Input),
            "out" => return Ok(Mode::Output),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == lower)
            .ok_or_else(|| PigpioError::InvalidArgument(format!("unknown mode '{s}'")))
    }
}

/// Internal pull resistor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Pull {
    Off = 0,
    Down = 1,
    Up = 2,
}

impl Pull {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Pull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pull::Off => "off",
            Pull::Down => "down",
            Pull::Up => "up",
        })
    }
}

impl FromStr for Pull {
    type Err = PigpioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Pull::Off),
            "down" => Ok(Pull::Down),
            "up" => Ok(Pull::Up),
            other => Err(PigpioError::InvalidArgument(format!(
                "unknown pull '{other}' (expected off, down or up)"
            ))),
        }
    }
}

/// GPIO commands on a shared command channel.
#[derive(Debug, Clone)]
pub struct Gpio {
    channel: Arc<CommandChannel>,
}

impl Gpio {
    pub fn new(channel: Arc<CommandChannel>) -> Self {
        Self { channel }
    }

    pub fn set_mode(&self, gpio: u32, mode: Mode) -> Result<()> {
        self.channel.execute(
            Opcode::Modes,
            param("gpio", gpio)?,
            mode.code() as i32,
            0,
            None,
        )?;
        Ok(())
    }

    pub fn get_mode(&self, gpio: u32) -> Result<Mode> {
        let code = self
            .channel
            .execute(Opcode::Modeg, param("gpio", gpio)?, 0, 0, None)?;
        Mode::from_code(code as u32).ok_or_else(|| {
            PigpioError::InvalidArgument(format!("daemon reported unknown mode {code}"))
        })
    }

    pub fn set_pull_up_down(&self, gpio: u32, pull: Pull) -> Result<()> {
        self.channel.execute(
            Opcode::Pud,
            param("gpio", gpio)?,
            pull.code() as i32,
            0,
            None,
        )?;
        Ok(())
    }

    pub fn read(&self, gpio: u32) -> Result<Level> {
        let level = self
            .channel
            .execute(Opcode::Read, param("gpio", gpio)?, 0, 0, None)?;
        Ok(Level::from(level != 0))
    }

    pub fn write(&self, gpio: u32, level: Level) -> Result<()> {
        self.channel.execute(
            Opcode::Write,
            param("gpio", gpio)?,
            level.code() as i32,
            0,
            None,
        )?;
        Ok(())
    }

    /// Levels of GPIO 0-31 as a bit mask.
    pub fn read_bank_1(&self) -> Result<u32> {
        let response = self.channel.execute_raw(Opcode::Br1, 0, 0, 0, None)?;
        Ok(response.result as u32)
    }
}
