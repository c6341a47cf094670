//! Fixed-size frames of the pigpio socket protocol.
//!
//! Every field is a little-endian integer, independent of host byte order:
//! - Command: `opcode, p1, p2, p3` (16 bytes) followed by optional
//!   extension bytes
//! - Response: `opcode, p1, p2, result` (16 bytes)
//! - Notification: `seq:u16, flags:u16, tick:u32, levels:u32` (12 bytes)
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_i16, decode_i32, decode_notification, decode_u16, decode_u32, encode_command,
    encode_i32, CommandHeader, FrameConfig, NotificationFrame, Response, COMMAND_HEADER_SIZE,
    NOTIFICATION_SIZE, RESPONSE_SIZE, RESULT_OFFSET,
};
pub use error::{FrameError, Result};
pub use reader::{NotificationReader, ResponseReader};
pub use writer::CommandWriter;
