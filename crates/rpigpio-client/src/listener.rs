//! The notification connection and its background read loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rpigpio_frame::{
    CommandHeader, CommandWriter, FrameError, NotificationFrame, NotificationReader,
    ResponseReader,
};
use rpigpio_transport::DaemonStream;
use tracing::{debug, error, info, trace, warn};

use crate::channel::CommandChannel;
use crate::config::ClientConfig;
use crate::error::{PigpioError, Result};
use crate::opcode::Opcode;
use crate::registry::{Edge, EdgeCallback, EdgeEvent, SubscriberRegistry, SubscriptionId};

const THREAD_NAME: &str = "rpigpio-notify";

/// Wakes a blocked `wait_for_edge`: `Some` for the edge, `None` when the
/// read loop has exited.
type Waiter = mpsc::SyncSender<Option<EdgeEvent>>;

/// State shared with the read loop.
struct Shared {
    registry: SubscriberRegistry,
    levels: AtomicU32,
    handle: AtomicU32,
    running: AtomicBool,
    stopping: AtomicBool,
    fault: Mutex<Option<String>>,
    waiters: Mutex<BTreeMap<SubscriptionId, Waiter>>,
}

impl Shared {
    fn apply(&self, frame: &NotificationFrame) {
        if !frame.is_level_change() {
            trace!(seq = frame.seq, flags = frame.flags, "ignoring non-level frame");
            return;
        }
        let last = self.levels.swap(frame.levels, Ordering::SeqCst);
        let changed = last ^ frame.levels;
        if changed != 0 {
            self.registry.dispatch(changed, frame.levels, frame.tick);
        }
    }

    fn fault(&self) -> Option<String> {
        lock(&self.fault).clone()
    }

    /// Release every blocked waiter after the read loop exits.
    fn wake_waiters(&self) {
        let waiters = std::mem::take(&mut *lock(&self.waiters));
        for waiter in waiters.values() {
            let _ = waiter.try_send(None);
        }
    }
}

#[derive(Default)]
struct Connection {
    control: Option<DaemonStream>,
    thread: Option<JoinHandle<()>>,
}

/// Receives GPIO level changes on a dedicated connection and hands them to
/// subscribers.
///
/// Callbacks run on the listener thread with no registry lock held, so they
/// may register or unregister. Slow callbacks delay later notifications.
pub struct NotificationListener {
    channel: Arc<CommandChannel>,
    config: ClientConfig,
    shared: Arc<Shared>,
    connection: Mutex<Connection>,
}

impl NotificationListener {
    /// A stopped listener. Commands go through `channel`, the notification
    /// connection is opened from `config` on [`start`](Self::start).
    pub fn new(channel: Arc<CommandChannel>, config: ClientConfig) -> Self {
        Self {
            channel,
            config,
            shared: Arc::new(Shared {
                registry: SubscriberRegistry::new(),
                levels: AtomicU32::new(0),
                handle: AtomicU32::new(0),
                running: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                fault: Mutex::new(None),
                waiters: Mutex::new(BTreeMap::new()),
            }),
            connection: Mutex::new(Connection::default()),
        }
    }

    /// Open the notification stream and start the read loop.
    ///
    /// Does nothing while already running. After an unexpected disconnect
    /// a new stream is opened and existing subscriptions are re-armed.
    pub fn start(&self) -> Result<()> {
        let mut connection = lock(&self.connection);
        if self.is_running() {
            return Ok(());
        }
        if let Some(stale) = connection.thread.take() {
            let _ = stale.join();
        }
        connection.control = None;

        let levels = self.channel.execute_raw(Opcode::Br1, 0, 0, 0, None)?.result as u32;

        let stream = self.config.endpoint.connect(self.config.connect_timeout)?;
        let handle = open_in_band(&stream, &self.config)?;
        let control = stream.try_clone()?;

        self.shared.levels.store(levels, Ordering::SeqCst);
        self.shared.handle.store(handle, Ordering::SeqCst);
        self.shared.stopping.store(false, Ordering::SeqCst);
        *lock(&self.shared.fault) = None;
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let reader = NotificationReader::new(stream);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || read_loop(shared, reader));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                let _ = control.shutdown();
                return Err(FrameError::Io(err).into());
            }
        };

        connection.control = Some(control);
        connection.thread = Some(worker);
        info!(handle, levels, "notification listener started");

        if !self.shared.registry.is_empty() {
            let channel = &self.channel;
            self.shared
                .registry
                .resync(|mask| push_mask(channel, handle, mask))?;
        }
        Ok(())
    }

    /// Close the notification stream and join the read loop.
    ///
    /// Idempotent. Subscriptions stay registered and are re-armed by the
    /// next [`start`](Self::start).
    pub fn stop(&self) {
        let (control, worker) = {
            let mut connection = lock(&self.connection);
            (connection.control.take(), connection.thread.take())
        };
        let Some(control) = control else {
            if let Some(worker) = worker {
                let _ = worker.join();
            }
            return;
        };

        self.shared.stopping.store(true, Ordering::SeqCst);
        let handle = self.shared.handle.load(Ordering::SeqCst);
        if let Err(err) = self
            .channel
            .execute(Opcode::Nc, handle as i32, 0, 0, None)
        {
            warn!(handle, error = %err, "failed to close notification handle");
        }
        if let Err(err) = control.shutdown() {
            warn!(error = %err, "failed to shut down notification connection");
        }

        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                debug!("stop requested from listener thread, not joining");
            } else if worker.join().is_err() {
                warn!("notification thread panicked");
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.registry.reset_pushed();
        info!(handle, "notification listener stopped");
    }

    /// Subscribe `callback` to transitions of `gpio` that match `edge`.
    pub fn register(
        &self,
        gpio: u32,
        edge: Edge,
        callback: impl Fn(EdgeEvent) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        self.ensure_running()?;
        let callback: EdgeCallback = Arc::new(callback);
        let handle = self.shared.handle.load(Ordering::SeqCst);
        let channel = &self.channel;
        self.shared
            .registry
            .register(gpio, edge, callback, |mask| push_mask(channel, handle, mask))
    }

    /// Remove a subscription. Unknown ids are ignored.
    ///
    /// Works whether or not the listener is running.
    pub fn unregister(&self, id: SubscriptionId) -> Result<()> {
        let running = self.is_running();
        let handle = self.shared.handle.load(Ordering::SeqCst);
        let channel = &self.channel;
        self.shared.registry.unregister(id, |mask| {
            if running {
                push_mask(channel, handle, mask)
            } else {
                Ok(())
            }
        })?;
        Ok(())
    }

    /// Block until `gpio` makes a transition matching `edge`.
    ///
    /// Fails with [`PigpioError::Timeout`] if nothing arrives within
    /// `timeout`. If the stream faults or the listener stops meanwhile the
    /// wait ends at once with [`PigpioError::Disconnected`] or
    /// [`PigpioError::NotStarted`]. The temporary subscription is removed in
    /// every case.
    pub fn wait_for_edge(&self, gpio: u32, edge: Edge, timeout: Duration) -> Result<EdgeEvent> {
        let (tx, rx) = mpsc::sync_channel(1);
        let waiter = tx.clone();
        let id = self.register(gpio, edge, move |event| {
            let _ = tx.try_send(Some(event));
        })?;
        lock(&self.shared.waiters).insert(id, waiter.clone());
        // The loop may have exited before the waiter was visible to it.
        if !self.is_running() {
            let _ = waiter.try_send(None);
        }

        let received = rx.recv_timeout(timeout);
        lock(&self.shared.waiters).remove(&id);
        if let Err(err) = self.unregister(id) {
            warn!(%id, error = %err, "failed to remove wait subscription");
        }

        match received {
            Ok(Some(event)) => Ok(event),
            Ok(None) => match self.shared.fault() {
                Some(reason) => Err(PigpioError::Disconnected(reason)),
                None => Err(PigpioError::NotStarted),
            },
            Err(_) => {
                if let Some(reason) = self.shared.fault() {
                    return Err(PigpioError::Disconnected(reason));
                }
                debug!(gpio, %edge, ?timeout, "wait for edge timed out");
                Err(PigpioError::Timeout(timeout))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Level bits as of the most recent notification.
    pub fn last_levels(&self) -> u32 {
        self.shared.levels.load(Ordering::SeqCst)
    }

    /// The mask the daemon is currently reporting.
    pub fn monitor_mask(&self) -> u32 {
        self.shared.registry.pushed_mask()
    }

    /// Handle of the open notification stream.
    pub fn handle(&self) -> Option<u32> {
        self.is_running()
            .then(|| self.shared.handle.load(Ordering::SeqCst))
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Reason for the last unexpected disconnect, if any.
    pub fn last_fault(&self) -> Option<String> {
        self.shared.fault()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        match self.shared.fault() {
            Some(reason) => Err(PigpioError::Disconnected(reason)),
            None => Err(PigpioError::NotStarted),
        }
    }
}

impl std::fmt::Debug for NotificationListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationListener")
            .field("running", &self.is_running())
            .field("handle", &self.handle())
            .field("monitor_mask", &self.monitor_mask())
            .finish()
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Send NOIB on the notification connection itself and read back its handle.
fn open_in_band(stream: &DaemonStream, config: &ClientConfig) -> Result<u32> {
    let frame_config = config.frame_config();
    let mut writer = CommandWriter::with_config_daemon(stream.try_clone()?, &frame_config)?;
    let mut reader = ResponseReader::with_config_daemon(stream.try_clone()?, &frame_config)?;

    let opcode = Opcode::Noib.code();
    writer.send(&CommandHeader::new(opcode, 0, 0, 0), &[])?;
    let response = reader.read_response()?;
    if response.opcode != opcode {
        return Err(FrameError::UnexpectedResponse {
            expected: opcode,
            actual: response.opcode,
        }
        .into());
    }
    if response.is_error() {
        return Err(PigpioError::daemon(response.result));
    }
    Ok(response.result as u32)
}

fn push_mask(channel: &CommandChannel, handle: u32, mask: u32) -> Result<()> {
    channel.execute(Opcode::Nb, handle as i32, mask as i32, 0, None)?;
    Ok(())
}

fn read_loop(shared: Arc<Shared>, mut reader: NotificationReader<DaemonStream>) {
    let mut batch = Vec::new();
    loop {
        batch.clear();
        if let Err(err) = reader.read_batch(&mut batch) {
            if shared.stopping.load(Ordering::SeqCst) {
                debug!(error = %err, "notification stream closed");
            } else {
                error!(error = %err, "notification stream disconnected");
                *lock(&shared.fault) = Some(err.to_string());
            }
            shared.running.store(false, Ordering::SeqCst);
            shared.wake_waiters();
            return;
        }
        for frame in &batch {
            shared.apply(frame);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
