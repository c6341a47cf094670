use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use rpigpio_transport::DaemonStream;

use crate::codec::{encode_command, CommandHeader, FrameConfig, COMMAND_HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete command frames to any `Write` stream.
///
/// The header and the extension are assembled into one buffer and written
/// together, so a command never reaches the daemon half-sent while another
/// writer interleaves.
pub struct CommandWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> CommandWriter<T> {
    /// Create a new command writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send a command with optional extension bytes.
    pub fn send(&mut self, header: &CommandHeader, extension: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_command(header, extension, &mut self.buf);
        debug_assert!(self.buf.len() >= COMMAND_HEADER_SIZE);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl CommandWriter<DaemonStream> {
    /// Create a command writer for `DaemonStream` and apply write timeout from config.
    pub fn with_config_daemon(inner: DaemonStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

pub(crate) fn transport_to_frame_error(err: rpigpio_transport::TransportError) -> FrameError {
    match err {
        rpigpio_transport::TransportError::Io(io) => FrameError::Io(io),
        rpigpio_transport::TransportError::Resolve { source, .. }
        | rpigpio_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
