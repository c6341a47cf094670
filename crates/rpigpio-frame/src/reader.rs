use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use rpigpio_transport::DaemonStream;
use tracing::trace;

use crate::codec::{decode_notification, FrameConfig, NotificationFrame, Response, RESPONSE_SIZE};
use crate::error::{FrameError, Result};
use crate::writer::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Fill `buf` completely, retrying short and interrupted reads.
///
/// EOF before the buffer is full is [`FrameError::ConnectionClosed`].
fn read_full<T: Read>(inner: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

/// Reads fixed-size responses (and follow-up payloads) from a command stream.
pub struct ResponseReader<T> {
    inner: T,
}

impl<T: Read> ResponseReader<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read the next complete response (blocking).
    pub fn read_response(&mut self) -> Result<Response> {
        let mut raw = [0u8; RESPONSE_SIZE];
        read_full(&mut self.inner, &mut raw)?;
        Ok(Response::decode(&raw))
    }

    /// Read exactly `len` payload bytes that follow a response.
    pub fn read_payload(&mut self, len: usize) -> Result<Bytes> {
        let mut payload = vec![0u8; len];
        read_full(&mut self.inner, &mut payload)?;
        Ok(Bytes::from(payload))
    }
}

impl ResponseReader<DaemonStream> {
    /// Create a response reader for `DaemonStream` and apply read timeout from config.
    pub fn with_config_daemon(inner: DaemonStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

/// Reads notification frames from the daemon's report stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct NotificationReader<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Read> NotificationReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read until at least one frame is complete, then drain every complete
    /// frame in the buffer into `out` (blocking).
    ///
    /// Returns the number of frames appended. Returns
    /// `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_batch(&mut self, out: &mut Vec<NotificationFrame>) -> Result<usize> {
        loop {
            let before = out.len();
            while let Some(frame) = decode_notification(&mut self.buf) {
                out.push(frame);
            }
            if out.len() > before {
                return Ok(out.len() - before);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
            trace!(read, pending = self.buf.len(), "notification bytes buffered");
        }
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
