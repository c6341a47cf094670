use bytes::{Buf, BufMut, BytesMut};

/// Command header: opcode (4) + p1 (4) + p2 (4) + p3 (4) = 16 bytes.
pub const COMMAND_HEADER_SIZE: usize = 16;

/// Response: opcode (4) + p1 (4) + p2 (4) + result (4) = 16 bytes.
pub const RESPONSE_SIZE: usize = 16;

/// Byte offset of the result field inside a response.
pub const RESULT_OFFSET: usize = 12;

/// Notification: seq (2) + flags (2) + tick (4) + levels (4) = 12 bytes.
pub const NOTIFICATION_SIZE: usize = 12;

/// Encode a signed 32-bit field.
pub fn encode_i32(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode a signed 32-bit field at `offset`.
///
/// # Panics
///
/// Panics if `bytes` holds fewer than `offset + 4` bytes.
pub fn decode_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(field::<4>(bytes, offset))
}

/// Decode an unsigned 32-bit field at `offset`.
///
/// # Panics
///
/// Panics if `bytes` holds fewer than `offset + 4` bytes.
pub fn decode_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(field::<4>(bytes, offset))
}

/// Decode a signed 16-bit field at `offset`.
///
/// # Panics
///
/// Panics if `bytes` holds fewer than `offset + 2` bytes.
pub fn decode_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes(field::<2>(bytes, offset))
}

/// Decode an unsigned 16-bit field at `offset`.
///
/// # Panics
///
/// Panics if `bytes` holds fewer than `offset + 2` bytes.
pub fn decode_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(field::<2>(bytes, offset))
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&bytes[offset..offset + N]);
    raw
}

/// The fixed part of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub opcode: u32,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
}

impl CommandHeader {
    pub fn new(opcode: u32, p1: i32, p2: i32, p3: i32) -> Self {
        Self { opcode, p1, p2, p3 }
    }
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬──────────────────┐
/// │ Opcode   │ P1       │ P2       │ P3       │ Extension        │
/// │ (4B LE)  │ (4B LE)  │ (4B LE)  │ (4B LE)  │ (verbatim bytes) │
/// └──────────┴──────────┴──────────┴──────────┴──────────────────┘
/// ```
pub fn encode_command(header: &CommandHeader, extension: &[u8], dst: &mut BytesMut) {
    dst.reserve(COMMAND_HEADER_SIZE + extension.len());
    dst.put_u32_le(header.opcode);
    dst.put_i32_le(header.p1);
    dst.put_i32_le(header.p2);
    dst.put_i32_le(header.p3);
    dst.put_slice(extension);
}

/// A decoded response frame.
///
/// Mirrors the request header with `p3` replaced by the result. A negative
/// result is a daemon error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub opcode: u32,
    pub p1: i32,
    pub p2: i32,
    pub result: i32,
}

impl Response {
    /// Decode a complete response frame.
    pub fn decode(raw: &[u8; RESPONSE_SIZE]) -> Self {
        Self {
            opcode: decode_u32(raw, 0),
            p1: decode_i32(raw, 4),
            p2: decode_i32(raw, 8),
            result: decode_i32(raw, RESULT_OFFSET),
        }
    }

    /// Encode this response as the daemon would send it.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(RESPONSE_SIZE);
        dst.put_u32_le(self.opcode);
        dst.put_i32_le(self.p1);
        dst.put_i32_le(self.p2);
        dst.put_i32_le(self.result);
    }

    /// True when the daemon reported an error code.
    pub fn is_error(&self) -> bool {
        self.result < 0
    }
}

/// One entry of the GPIO notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationFrame {
    /// Sequence number, wraps at 2^16.
    pub seq: u16,
    /// Zero for a plain level report.
    pub flags: u16,
    /// Daemon microsecond tick, wraps at 2^32.
    pub tick: u32,
    /// Bit N holds the current level of GPIO N.
    pub levels: u32,
}

impl NotificationFrame {
    /// Whether this frame is a plain level-change report.
    ///
    /// Frames with any flag set carry other report types and are not level
    /// changes.
    pub fn is_level_change(&self) -> bool {
        self.flags == 0
    }

    /// Encode this frame as the daemon would send it.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(NOTIFICATION_SIZE);
        dst.put_u16_le(self.seq);
        dst.put_u16_le(self.flags);
        dst.put_u32_le(self.tick);
        dst.put_u32_le(self.levels);
    }
}

/// Decode one notification frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly [`NOTIFICATION_SIZE`] bytes from the buffer.
pub fn decode_notification(src: &mut BytesMut) -> Option<NotificationFrame> {
    if src.len() < NOTIFICATION_SIZE {
        return None;
    }

    let frame = NotificationFrame {
        seq: decode_u16(src, 0),
        flags: decode_u16(src, 2),
        tick: decode_u32(src, 4),
        levels: decode_u32(src, 8),
    };
    src.advance(NOTIFICATION_SIZE);
    Some(frame)
}

/// I/O configuration for frame readers and writers.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}
