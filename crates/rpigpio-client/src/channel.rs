//! The command connection: one request/response exchange at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use rpigpio_frame::{CommandHeader, CommandWriter, FrameError, Response, ResponseReader};
use rpigpio_transport::{DaemonStream, TransportError};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{PigpioError, Result};
use crate::opcode::Opcode;

struct ChannelIo {
    writer: CommandWriter<DaemonStream>,
    reader: ResponseReader<DaemonStream>,
}

impl ChannelIo {
    fn exchange(
        &mut self,
        opcode: Opcode,
        p1: i32,
        p2: i32,
        p3: i32,
        extension: Option<&[u8]>,
    ) -> Result<Response> {
        let header = CommandHeader::new(opcode.code(), p1, p2, p3);
        self.writer.send(&header, extension.unwrap_or_default())?;
        let response = self.reader.read_response()?;
        if response.opcode != opcode.code() {
            return Err(FrameError::UnexpectedResponse {
                expected: opcode.code(),
                actual: response.opcode,
            }
            .into());
        }
        debug!(%opcode, p1, p2, p3, result = response.result, "command executed");
        Ok(response)
    }
}

/// Serialized command/response exchanges over one TCP connection.
///
/// Every call holds an exclusive lock from the first byte written until the
/// last byte of the response is read, so concurrent callers never observe
/// each other's responses.
pub struct CommandChannel {
    io: Mutex<ChannelIo>,
    control: DaemonStream,
    closed: AtomicBool,
}

impl CommandChannel {
    /// Open the command connection.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = config.endpoint.connect(config.connect_timeout)?;
        Self::with_config(stream, config)
    }

    /// Use an already connected stream with default settings.
    pub fn from_stream(stream: DaemonStream) -> Result<Self> {
        Self::with_config(stream, &ClientConfig::default())
    }

    fn with_config(stream: DaemonStream, config: &ClientConfig) -> Result<Self> {
        let frame_config = config.frame_config();
        let control = stream.try_clone()?;
        let reader_stream = stream.try_clone()?;
        let writer = CommandWriter::with_config_daemon(stream, &frame_config)?;
        let reader = ResponseReader::with_config_daemon(reader_stream, &frame_config)?;
        Ok(Self {
            io: Mutex::new(ChannelIo { writer, reader }),
            control,
            closed: AtomicBool::new(false),
        })
    }

    /// Send a command and return its non-negative result.
    ///
    /// A negative result becomes [`PigpioError::Daemon`] (or
    /// [`PigpioError::UnknownCode`] for codes outside the table).
    pub fn execute(
        &self,
        opcode: Opcode,
        p1: i32,
        p2: i32,
        p3: i32,
        extension: Option<&[u8]>,
    ) -> Result<i32> {
        let response = self.execute_raw(opcode, p1, p2, p3, extension)?;
        check(response.result)
    }

    /// Send a command and return the whole response without interpreting
    /// the result.
    ///
    /// Commands such as TICK and BR1 report unsigned values that can have
    /// the sign bit set.
    pub fn execute_raw(
        &self,
        opcode: Opcode,
        p1: i32,
        p2: i32,
        p3: i32,
        extension: Option<&[u8]>,
    ) -> Result<Response> {
        self.ensure_open()?;
        let mut io = self.lock();
        io.exchange(opcode, p1, p2, p3, extension)
    }

    /// Send a command whose response is followed by a payload.
    ///
    /// The channel stays locked until the returned [`HeldResponse`] is
    /// released or dropped. An error result releases the lock immediately.
    pub fn execute_held(
        &self,
        opcode: Opcode,
        p1: i32,
        p2: i32,
        p3: i32,
        extension: Option<&[u8]>,
    ) -> Result<HeldResponse<'_>> {
        self.ensure_open()?;
        let mut io = self.lock();
        let response = io.exchange(opcode, p1, p2, p3, extension)?;
        let value = check(response.result)?;
        Ok(HeldResponse {
            guard: io,
            value,
        })
    }

    /// Send a command whose result is a byte count and return those bytes.
    pub fn execute_read(
        &self,
        opcode: Opcode,
        p1: i32,
        p2: i32,
        p3: i32,
        extension: Option<&[u8]>,
    ) -> Result<Bytes> {
        let mut held = self.execute_held(opcode, p1, p2, p3, extension)?;
        let len = held.value() as usize;
        let payload = held.read_payload(len)?;
        held.release();
        Ok(payload)
    }

    /// Shut the connection down. Later calls fail; repeated calls are no-ops.
    ///
    /// Does not wait for the lock, so a call blocked on a stalled daemon is
    /// released with a connection error.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.control.shutdown() {
            warn!(error = %err, "failed to shut down command connection");
        }
        info!("command channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Shutdown.into());
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ChannelIo> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("peer", &self.control.peer_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert an unsigned argument into a command parameter.
pub(crate) fn param(name: &str, value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| PigpioError::InvalidArgument(format!("{name} {value} out of range")))
}

/// Value of `p3` for a command carrying `extension`.
pub(crate) fn extension_len(extension: &[u8]) -> Result<i32> {
    i32::try_from(extension.len()).map_err(|_| {
        PigpioError::InvalidArgument(format!("{} bytes is too long", extension.len()))
    })
}

fn check(result: i32) -> Result<i32> {
    if result < 0 {
        Err(PigpioError::daemon(result))
    } else {
        Ok(result)
    }
}

/// A successful response that still owns the command channel.
///
/// Used by commands whose result is a byte count followed by that many
/// payload bytes.
pub struct HeldResponse<'a> {
    guard: MutexGuard<'a, ChannelIo>,
    value: i32,
}

impl HeldResponse<'_> {
    /// The non-negative result.
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Read exactly `len` bytes that follow the response.
    pub fn read_payload(&mut self, len: usize) -> Result<Bytes> {
        Ok(self.guard.reader.read_payload(len)?)
    }

    /// Release the channel for other callers.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;

    use bytes::BytesMut;
    use rpigpio_frame::{decode_i32, decode_u32, COMMAND_HEADER_SIZE};

    use super::*;

    fn reply(stream: &mut TcpStream, opcode: u32, result: i32, payload: &[u8]) {
        let mut wire = BytesMut::new();
        Response {
            opcode,
            p1: 0,
            p2: 0,
            result,
        }
        .encode(&mut wire);
        wire.extend_from_slice(payload);
        stream.write_all(&wire).expect("reply should be written");
    }

    fn read_command(stream: &mut TcpStream) -> Option<(u32, i32, i32, i32)> {
        let mut header = [0u8; COMMAND_HEADER_SIZE];
        stream.read_exact(&mut header).ok()?;
        Some((
            decode_u32(&header, 0),
            decode_i32(&header, 4),
            decode_i32(&header, 8),
            decode_i32(&header, 12),
        ))
    }

    fn channel_with_server(
        server: impl FnOnce(TcpStream) + Send + 'static,
    ) -> (CommandChannel, thread::JoinHandle<()>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have address");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("listener should accept");
            server(stream);
        });
        let stream = TcpStream::connect(addr).expect("client should connect");
        let stream = DaemonStream::from_tcp(stream).expect("stream should wrap");
        let channel = CommandChannel::from_stream(stream).expect("channel should build");
        (channel, handle)
    }

    #[test]
    fn execute_returns_result() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, p1, _, _) = read_command(&mut stream).expect("command expected");
            assert_eq!(opcode, Opcode::Read.code());
            assert_eq!(p1, 17);
            reply(&mut stream, opcode, 1, &[]);
        });

        let level = channel
            .execute(Opcode::Read, 17, 0, 0, None)
            .expect("read should succeed");
        assert_eq!(level, 1);
        server.join().expect("thread should finish");
    }

    #[test]
    fn negative_result_maps_to_daemon_error() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, ..) = read_command(&mut stream).expect("command expected");
            reply(&mut stream, opcode, -3, &[]);
        });

        let err = channel.execute(Opcode::Read, 99, 0, 0, None).expect_err("execute should fail");
        assert!(matches!(err, PigpioError::Daemon { code: -3, .. }));
        server.join().expect("thread should finish");
    }

    #[test]
    fn unmapped_result_is_unknown_code() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, ..) = read_command(&mut stream).expect("command expected");
            reply(&mut stream, opcode, -999, &[]);
        });

        let err = channel.execute(Opcode::Modes, 4, 1, 0, None).expect_err("execute should fail");
        assert!(matches!(err, PigpioError::UnknownCode(-999)));
        server.join().expect("thread should finish");
    }

    #[test]
    fn mismatched_opcode_is_unexpected_response() {
        let (channel, server) = channel_with_server(|mut stream| {
            read_command(&mut stream).expect("command expected");
            reply(&mut stream, Opcode::Tick.code(), 0, &[]);
        });

        let err = channel.execute(Opcode::Read, 4, 0, 0, None).expect_err("execute should fail");
        assert!(matches!(
            err,
            PigpioError::Frame(FrameError::UnexpectedResponse {
                expected: 3,
                actual: 16
            })
        ));
        server.join().expect("thread should finish");
    }

    #[test]
    fn raw_result_keeps_sign_bit() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, ..) = read_command(&mut stream).expect("command expected");
            reply(&mut stream, opcode, u32::MAX as i32, &[]);
        });

        let response = channel
            .execute_raw(Opcode::Tick, 0, 0, 0, None)
            .expect("tick should succeed");
        assert_eq!(response.result as u32, u32::MAX);
        server.join().expect("thread should finish");
    }

    #[test]
    fn extension_is_sent_after_header() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, p1, _, p3) = read_command(&mut stream).expect("command expected");
            let mut ext = vec![0u8; p3 as usize];
            stream.read_exact(&mut ext).expect("extension expected");
            assert_eq!(ext, b"\x01\x02\x03");
            reply(&mut stream, opcode, p1, &[]);
        });

        let result = channel
            .execute(Opcode::I2cwd, 5, 0, 3, Some(&[1, 2, 3]))
            .expect("execute should succeed");
        assert_eq!(result, 5);
        server.join().expect("thread should finish");
    }

    #[test]
    fn held_response_reads_payload() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, ..) = read_command(&mut stream).expect("command expected");
            reply(&mut stream, opcode, 3, b"abc");
            let (opcode, ..) = read_command(&mut stream).expect("second command expected");
            reply(&mut stream, opcode, 42, &[]);
        });

        let mut held = channel
            .execute_held(Opcode::Serr, 1, 3, 0, None)
            .expect("execute held should succeed");
        let len = held.value() as usize;
        let payload = held.read_payload(len).expect("payload should be read");
        assert_eq!(payload.as_ref(), b"abc");
        held.release();

        let tick = channel
            .execute(Opcode::Tick, 0, 0, 0, None)
            .expect("channel should be released");
        assert_eq!(tick, 42);
        server.join().expect("thread should finish");
    }

    #[test]
    fn execute_read_returns_payload_and_releases() {
        let (channel, server) = channel_with_server(|mut stream| {
            let (opcode, _, count, _) = read_command(&mut stream).expect("command expected");
            reply(&mut stream, opcode, count, &vec![0x5A; count as usize]);
            let (opcode, ..) = read_command(&mut stream).expect("second command expected");
            reply(&mut stream, opcode, 0, &[]);
        });

        let payload = channel
            .execute_read(Opcode::I2crd, 0, 4, 0, None)
            .expect("read with payload should succeed");
        assert_eq!(payload.as_ref(), &[0x5A; 4]);
        let closed = channel
            .execute(Opcode::I2cc, 0, 0, 0, None)
            .expect("channel should be released");
        assert_eq!(closed, 0);
        server.join().expect("thread should finish");
    }

    #[test]
    fn argument_conversion() {
        assert_eq!(param("gpio", 53).expect("53 should fit"), 53);
        assert!(matches!(
            param("gpio", u32::MAX),
            Err(PigpioError::InvalidArgument(_))
        ));
        assert_eq!(extension_len(b"/dev/serial0").expect("extension len should succeed"), 12);
    }

    #[test]
    fn eof_is_connection_error() {
        let (channel, server) = channel_with_server(|mut stream| {
            read_command(&mut stream);
            drop(stream);
        });

        let err = channel.execute(Opcode::Tick, 0, 0, 0, None).expect_err("execute should fail");
        assert!(err.is_connection_error());
        server.join().expect("thread should finish");
    }

    #[test]
    fn concurrent_callers_get_their_own_responses() {
        let (channel, server) = channel_with_server(|mut stream| {
            // Echo p1 back as the result.
            while let Some((opcode, p1, ..)) = read_command(&mut stream) {
                reply(&mut stream, opcode, p1, &[]);
            }
        });
        let channel = Arc::new(channel);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..50 {
                        let p1 = worker * 1000 + i;
                        let result = channel
                            .execute(Opcode::Read, p1, 0, 0, None)
                            .expect("read should succeed");
                        assert_eq!(result, p1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("thread should finish");
        }

        channel.close();
        server.join().expect("thread should finish");
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_calls() {
        let (channel, server) = channel_with_server(|mut stream| {
            read_command(&mut stream);
        });

        channel.close();
        channel.close();
        assert!(channel.is_closed());
        let err = channel.execute(Opcode::Tick, 0, 0, 0, None).expect_err("execute should fail");
        assert!(matches!(
            err,
            PigpioError::Transport(TransportError::Shutdown)
        ));
        server.join().expect("thread should finish");
    }
}
