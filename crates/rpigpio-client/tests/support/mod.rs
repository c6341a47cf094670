//! In-process fake pigpio daemon for integration tests.
//!
//! Speaks the real wire protocol on an ephemeral `127.0.0.1` port. Keeps a
//! small GPIO model (levels, modes, pulls), hands out notification handles
//! for NOIB and reports level changes on them according to the NB mask.
//! Tests drive "external" edges with [`FakeDaemon::set_level`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rpigpio_client::{ClientConfig, Opcode};
use rpigpio_frame::{decode_i32, decode_u32, NotificationFrame, Response, COMMAND_HEADER_SIZE};
use rpigpio_transport::TcpEndpoint;

pub const HARDWARE_REVISION: u32 = 0x00a0_2082;
pub const PIGPIO_VERSION: i32 = 79;

const PI_BAD_GPIO: i32 = -3;
const PI_BAD_MODE: i32 = -4;
const PI_BAD_LEVEL: i32 = -5;
const PI_BAD_PUD: i32 = -6;
const PI_BAD_HANDLE: i32 = -25;
const PI_BAD_I2C_BUS: i32 = -74;
const PI_UNKNOWN_COMMAND: i32 = -88;

/// One command as received, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub opcode: u32,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub extension: Vec<u8>,
}

struct NotifyStream {
    stream: TcpStream,
    mask: u32,
    seq: u16,
}

struct DaemonState {
    started: Instant,
    tick_offset: u32,
    levels: u32,
    modes: [u32; 54],
    pulls: [u32; 54],
    notify: HashMap<u32, NotifyStream>,
    next_notify_handle: u32,
    devices: HashMap<u32, Vec<u8>>,
    next_device_handle: u32,
    injected: HashMap<u32, i32>,
    received: Vec<Received>,
}

impl DaemonState {
    fn tick(&self) -> u32 {
        (self.started.elapsed().as_micros() as u32).wrapping_add(self.tick_offset)
    }

    /// Send one level report to every stream whose mask covers `changed`.
    fn report(&mut self, changed: u32, flags: u16) {
        let tick = self.tick();
        let levels = self.levels;
        self.notify.retain(|_, notify| {
            if flags == 0 && notify.mask & changed == 0 {
                return true;
            }
            let frame = NotificationFrame {
                seq: notify.seq,
                flags,
                tick,
                levels,
            };
            notify.seq = notify.seq.wrapping_add(1);
            let mut wire = BytesMut::new();
            frame.encode(&mut wire);
            notify.stream.write_all(&wire).is_ok()
        });
    }

    fn set_level(&mut self, gpio: u32, high: bool) {
        let before = self.levels;
        if high {
            self.levels |= 1 << gpio;
        } else {
            self.levels &= !(1 << gpio);
        }
        let changed = before ^ self.levels;
        if changed != 0 {
            self.report(changed, 0);
        }
    }

    fn execute(&mut self, command: &Received) -> (i32, Vec<u8>) {
        if let Some(code) = self.injected.remove(&command.opcode) {
            return (code, Vec::new());
        }
        let Some(opcode) = Opcode::from_code(command.opcode) else {
            return (PI_UNKNOWN_COMMAND, Vec::new());
        };
        let gpio = command.p1;
        let valid_gpio = (0..54).contains(&gpio);
        let result = match opcode {
            Opcode::Modes if !valid_gpio => PI_BAD_GPIO,
            Opcode::Modes if !(0..8).contains(&command.p2) => PI_BAD_MODE,
            Opcode::Modes => {
                self.modes[gpio as usize] = command.p2 as u32;
                0
            }
            Opcode::Modeg if !valid_gpio => PI_BAD_GPIO,
            Opcode::Modeg => self.modes[gpio as usize] as i32,
            Opcode::Pud if !valid_gpio => PI_BAD_GPIO,
            Opcode::Pud if !(0..3).contains(&command.p2) => PI_BAD_PUD,
            Opcode::Pud => {
                self.pulls[gpio as usize] = command.p2 as u32;
                0
            }
            Opcode::Read if !valid_gpio => PI_BAD_GPIO,
            Opcode::Read => i32::from(gpio < 32 && self.levels & (1 << gpio) != 0),
            Opcode::Write if !valid_gpio => PI_BAD_GPIO,
            Opcode::Write if !(0..2).contains(&command.p2) => PI_BAD_LEVEL,
            Opcode::Write => {
                if gpio < 32 {
                    self.set_level(gpio as u32, command.p2 == 1);
                }
                0
            }
            Opcode::Br1 => self.levels as i32,
            Opcode::Tick => self.tick() as i32,
            Opcode::Hwver => HARDWARE_REVISION as i32,
            Opcode::Pigpv => PIGPIO_VERSION,
            Opcode::Nb => match self.notify.get_mut(&(command.p1 as u32)) {
                Some(notify) => {
                    notify.mask = command.p2 as u32;
                    0
                }
                None => PI_BAD_HANDLE,
            },
            Opcode::Nc => match self.notify.remove(&(command.p1 as u32)) {
                Some(notify) => {
                    let _ = notify.stream.shutdown(Shutdown::Both);
                    0
                }
                None => PI_BAD_HANDLE,
            },
            Opcode::I2co if !(0..2).contains(&command.p1) => PI_BAD_I2C_BUS,
            Opcode::I2co | Opcode::Sero | Opcode::Spio => self.open_device(),
            Opcode::I2cc | Opcode::Serc | Opcode::Spic => {
                match self.devices.remove(&(command.p1 as u32)) {
                    Some(_) => 0,
                    None => PI_BAD_HANDLE,
                }
            }
            Opcode::I2cwd | Opcode::Serw | Opcode::Spiw => {
                match self.devices.get_mut(&(command.p1 as u32)) {
                    Some(buffer) => {
                        buffer.extend_from_slice(&command.extension);
                        0
                    }
                    None => PI_BAD_HANDLE,
                }
            }
            Opcode::Serda => match self.devices.get(&(command.p1 as u32)) {
                Some(buffer) => buffer.len() as i32,
                None => PI_BAD_HANDLE,
            },
            Opcode::I2crd | Opcode::Serr | Opcode::Spir => {
                let Some(buffer) = self.devices.get_mut(&(command.p1 as u32)) else {
                    return (PI_BAD_HANDLE, Vec::new());
                };
                // Loopback: what was written comes back first, then a counting pattern.
                let count = command.p2.max(0) as usize;
                let mut payload: Vec<u8> = buffer.drain(..count.min(buffer.len())).collect();
                while payload.len() < count && opcode != Opcode::Serr {
                    payload.push(payload.len() as u8);
                }
                return (payload.len() as i32, payload);
            }
            Opcode::Spix => {
                if !self.devices.contains_key(&(command.p1 as u32)) {
                    return (PI_BAD_HANDLE, Vec::new());
                }
                let payload: Vec<u8> = command.extension.iter().map(|b| !b).collect();
                return (payload.len() as i32, payload);
            }
            Opcode::I2cws | Opcode::Serwb => match self.devices.get_mut(&(command.p1 as u32)) {
                Some(buffer) => {
                    buffer.push(command.p2 as u8);
                    0
                }
                None => PI_BAD_HANDLE,
            },
            Opcode::I2crs | Opcode::Serrb => match self.devices.get_mut(&(command.p1 as u32)) {
                Some(buffer) if !buffer.is_empty() => i32::from(buffer.remove(0)),
                Some(_) => 0,
                None => PI_BAD_HANDLE,
            },
            Opcode::I2cwb => match self.devices.get_mut(&(command.p1 as u32)) {
                Some(buffer) => {
                    buffer.push(command.p2 as u8);
                    buffer.push(command.extension.first().copied().unwrap_or(0));
                    0
                }
                None => PI_BAD_HANDLE,
            },
            Opcode::I2crb => match self.devices.get(&(command.p1 as u32)) {
                Some(_) => command.p2 ^ 0xff,
                None => PI_BAD_HANDLE,
            },
            _ => PI_UNKNOWN_COMMAND,
        };
        (result, Vec::new())
    }

    fn open_device(&mut self) -> i32 {
        let handle = self.next_device_handle;
        self.next_device_handle += 1;
        self.devices.insert(handle, Vec::new());
        handle as i32
    }
}

/// A fake daemon listening on an ephemeral port until dropped.
pub struct FakeDaemon {
    port: u16,
    state: Arc<Mutex<DaemonState>>,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl FakeDaemon {
    pub fn spawn() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("fake daemon should bind");
        listener
            .set_nonblocking(true)
            .expect("fake daemon should be nonblocking");
        let port = listener.local_addr().expect("fake daemon address").port();

        let state = Arc::new(Mutex::new(DaemonState {
            started: Instant::now(),
            tick_offset: 0,
            levels: 0,
            modes: [0; 54],
            pulls: [0; 54],
            notify: HashMap::new(),
            next_notify_handle: 0,
            devices: HashMap::new(),
            next_device_handle: 0,
            injected: HashMap::new(),
            received: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || accept_loop(listener, state, shutdown))
        };

        Self {
            port,
            state,
            shutdown,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> TcpEndpoint {
        TcpEndpoint::new("127.0.0.1", self.port)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint()).with_connect_timeout(Duration::from_secs(2))
    }

    /// Drive an external level change on `gpio` (0-31).
    pub fn set_level(&self, gpio: u32, high: bool) {
        self.state().set_level(gpio, high);
    }

    pub fn levels(&self) -> u32 {
        self.state().levels
    }

    pub fn mode(&self, gpio: u32) -> u32 {
        self.state().modes[gpio as usize]
    }

    pub fn pull(&self, gpio: u32) -> u32 {
        self.state().pulls[gpio as usize]
    }

    /// Shift the tick counter, e.g. to just before the 2^32 wrap.
    pub fn set_tick_offset(&self, offset: u32) {
        let mut state = self.state();
        state.started = Instant::now();
        state.tick_offset = offset;
    }

    /// Send a frame with non-zero `flags` to every notification stream.
    pub fn emit_flagged(&self, flags: u16) {
        self.state().report(u32::MAX, flags);
    }

    /// Answer the next `opcode` with `code` instead of executing it.
    pub fn inject_result(&self, opcode: Opcode, code: i32) {
        self.state().injected.insert(opcode.code(), code);
    }

    /// Close every notification stream without an NC.
    pub fn drop_notify_streams(&self) {
        for (_, notify) in self.state().notify.drain() {
            let _ = notify.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn notify_handles(&self) -> Vec<u32> {
        let mut handles: Vec<u32> = self.state().notify.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Current NB mask for `handle`.
    pub fn mask(&self, handle: u32) -> Option<u32> {
        self.state().notify.get(&handle).map(|notify| notify.mask)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state().received.clone()
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.state()
            .received
            .iter()
            .filter(|command| command.opcode == opcode.code())
            .count()
    }

    pub fn clear_received(&self) {
        self.state().received.clear();
    }

    fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().expect("fake daemon state should not be poisoned")
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        if let Ok(mut state) = self.state.lock() {
            for (_, notify) in state.notify.drain() {
                let _ = notify.stream.shutdown(Shutdown::Both);
            }
        }
    }
}

fn accept_loop(listener: TcpListener, state: Arc<Mutex<DaemonState>>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_nodelay(true);
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let _ = serve_connection(stream, state);
                });
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return,
        }
    }
}

fn read_command(stream: &mut TcpStream) -> io::Result<Option<Received>> {
    let mut header = [0u8; COMMAND_HEADER_SIZE];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let p3 = decode_i32(&header, 12);
    let opcode = decode_u32(&header, 0);
    // NB, NC and friends carry no extension; p3 is a plain argument for them.
    let carries_extension = matches!(
        Opcode::from_code(opcode),
        Some(
            Opcode::I2co
                | Opcode::I2cwd
                | Opcode::I2cwb
                | Opcode::Sero
                | Opcode::Serw
                | Opcode::Spio
                | Opcode::Spiw
                | Opcode::Spix
        )
    );
    let mut extension = vec![0u8; if carries_extension { p3.max(0) as usize } else { 0 }];
    stream.read_exact(&mut extension)?;
    Ok(Some(Received {
        opcode,
        p1: decode_i32(&header, 4),
        p2: decode_i32(&header, 8),
        p3,
        extension,
    }))
}

fn write_response(
    stream: &mut TcpStream,
    command: &Received,
    result: i32,
    payload: &[u8],
) -> io::Result<()> {
    let mut wire = BytesMut::new();
    Response {
        opcode: command.opcode,
        p1: command.p1,
        p2: command.p2,
        result,
    }
    .encode(&mut wire);
    wire.extend_from_slice(payload);
    stream.write_all(&wire)
}

fn serve_connection(mut stream: TcpStream, state: Arc<Mutex<DaemonState>>) -> io::Result<()> {
    while let Some(command) = read_command(&mut stream)? {
        let mut guard = state.lock().map_err(|_| io::Error::other("state poisoned"))?;
        guard.received.push(command.clone());

        if command.opcode == Opcode::Noib.code() {
            let handle = guard.next_notify_handle;
            guard.next_notify_handle += 1;
            write_response(&mut stream, &command, handle as i32, &[])?;
            let notify = stream.try_clone()?;
            guard.notify.insert(
                handle,
                NotifyStream {
                    stream: notify,
                    mask: 0,
                    seq: 0,
                },
            );
            drop(guard);
            // The socket now only carries reports; wait for the client to go.
            let mut sink = [0u8; 64];
            while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
            if let Ok(mut state) = state.lock() {
                state.notify.remove(&handle);
            }
            return Ok(());
        }

        let (result, payload) = guard.execute(&command);
        drop(guard);
        write_response(&mut stream, &command, result, &payload)?;
    }
    Ok(())
}
