//! Time between two GPIO edges, bounded by a guard timeout.
//!
//! A measurement arms two subscriptions (start and stop) and a guard
//! thread. Whichever of "stop edge seen" and "guard expired" takes the
//! measurement lock first completes it; the other becomes a no-op. The
//! completion callback therefore runs exactly once per [`EventTimer::enable`].
//!
//! ```text
//! NeverStarted --start edge--> OnlyStartedNeverStopped --stop edge--> Success
//!       |                               |
//!       +----------guard fires----------+--> Timeout (state kept)
//! ```

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use rpigpio_frame::FrameError;
use tracing::{debug, warn};

use crate::error::{PigpioError, Result};
use crate::listener::NotificationListener;
use crate::registry::{Edge, EdgeEvent, SubscriptionId, MAX_NOTIFY_GPIO};

/// One side of a measurement: a GPIO and the edge that counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeTrigger {
    pub gpio: u32,
    pub edge: Edge,
}

impl EdgeTrigger {
    pub fn new(gpio: u32, edge: Edge) -> Self {
        Self { gpio, edge }
    }
}

impl fmt::Display for EdgeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.gpio, self.edge)
    }
}

impl std::str::FromStr for EdgeTrigger {
    type Err = PigpioError;

    /// Parse `GPIO:EDGE`, e.g. `19:falling`.
    fn from_str(s: &str) -> Result<Self> {
        let (gpio, edge) = s.split_once(':').ok_or_else(|| {
            PigpioError::InvalidArgument(format!("expected GPIO:EDGE, got '{s}'"))
        })?;
        let gpio = gpio
            .trim()
            .parse::<u32>()
            .map_err(|_| PigpioError::InvalidArgument(format!("bad GPIO number '{gpio}'")))?;
        Ok(Self::new(gpio, edge.trim().parse()?))
    }
}

/// How far a measurement got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    NeverStarted,
    OnlyStartedNeverStopped,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Success,
    Timeout,
}

/// Terminal result of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerResult {
    pub outcome: TimerOutcome,
    pub state: TimerState,
    /// Microseconds between the start and stop edges; 0 on timeout.
    pub elapsed_us: u32,
}

impl TimerResult {
    pub fn is_success(&self) -> bool {
        self.outcome == TimerOutcome::Success
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(u64::from(self.elapsed_us))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Ignored,
    Started,
    Finished(TimerResult),
}

/// The measurement state machine, free of threads and sockets.
#[derive(Debug)]
struct TimerCore {
    state: TimerState,
    start: Option<EdgeEvent>,
    completed: bool,
}

impl TimerCore {
    fn new() -> Self {
        Self {
            state: TimerState::NeverStarted,
            start: None,
            completed: false,
        }
    }

    fn on_start(&mut self, event: EdgeEvent) -> Step {
        if self.completed || self.state != TimerState::NeverStarted {
            return Step::Ignored;
        }
        self.state = TimerState::OnlyStartedNeverStopped;
        self.start = Some(event);
        Step::Started
    }

    fn on_stop(&mut self, event: EdgeEvent) -> Step {
        if self.completed || self.state != TimerState::OnlyStartedNeverStopped {
            return Step::Ignored;
        }
        let Some(start) = self.start else {
            return Step::Ignored;
        };
        // The notification that started the timer cannot also stop it.
        if start.gpio == event.gpio && start.tick == event.tick {
            return Step::Ignored;
        }
        self.state = TimerState::Success;
        self.completed = true;
        Step::Finished(TimerResult {
            outcome: TimerOutcome::Success,
            state: TimerState::Success,
            elapsed_us: event.tick.wrapping_sub(start.tick),
        })
    }

    fn on_guard(&mut self) -> Step {
        if self.completed {
            return Step::Ignored;
        }
        self.completed = true;
        Step::Finished(TimerResult {
            outcome: TimerOutcome::Timeout,
            state: self.state,
            elapsed_us: 0,
        })
    }

    /// Mark complete without a result. Returns false if already complete.
    fn cancel(&mut self) -> bool {
        !std::mem::replace(&mut self.completed, true)
    }
}

type Completion = Box<dyn FnOnce(TimerResult) + Send>;

/// One armed measurement, shared by both subscriptions and the guard.
struct Armed {
    core: Mutex<TimerCore>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    cancel: Mutex<Option<mpsc::Sender<()>>>,
    completion: Mutex<Option<Completion>>,
    listener: Arc<NotificationListener>,
}

impl Armed {
    fn on_start(&self, event: EdgeEvent) {
        if lock(&self.core).on_start(event) == Step::Started {
            debug!(gpio = event.gpio, tick = event.tick, "timer started");
        }
    }

    fn on_stop(&self, event: EdgeEvent) {
        let step = lock(&self.core).on_stop(event);
        if let Step::Finished(result) = step {
            debug!(elapsed_us = result.elapsed_us, "timer stopped");
            self.finish(Some(result));
        }
    }

    fn on_guard(&self) {
        let step = lock(&self.core).on_guard();
        if let Step::Finished(result) = step {
            debug!(state = ?result.state, "timer guard expired");
            self.finish(Some(result));
        }
    }

    /// Tear down the guard and subscriptions, then report `result`.
    ///
    /// Only the caller that completed the core gets here.
    fn finish(&self, result: Option<TimerResult>) {
        drop(lock(&self.cancel).take());
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        for id in subscriptions {
            if let Err(err) = self.listener.unregister(id) {
                warn!(%id, error = %err, "failed to remove timer subscription");
            }
        }
        let completion = lock(&self.completion).take();
        if let (Some(completion), Some(result)) = (completion, result) {
            completion(result);
        }
    }
}

/// Measures the time between a start edge and a stop edge.
///
/// Edge ticks come from the daemon, so the result is unaffected by network
/// latency. Elapsed time is computed modulo 2^32 and is correct across one
/// tick wraparound.
pub struct EventTimer {
    listener: Arc<NotificationListener>,
    triggers: Mutex<Option<(EdgeTrigger, EdgeTrigger)>>,
    active: Mutex<Option<Arc<Armed>>>,
}

impl EventTimer {
    /// A timer on a started listener.
    pub fn new(listener: Arc<NotificationListener>) -> Self {
        Self {
            listener,
            triggers: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    /// Set the start and stop triggers for later measurements.
    pub fn configure(&self, start: EdgeTrigger, stop: EdgeTrigger) -> Result<()> {
        for trigger in [start, stop] {
            if trigger.gpio > MAX_NOTIFY_GPIO {
                return Err(PigpioError::InvalidGpio(trigger.gpio));
            }
        }
        *lock(&self.triggers) = Some((start, stop));
        Ok(())
    }

    pub fn triggers(&self) -> Option<(EdgeTrigger, EdgeTrigger)> {
        *lock(&self.triggers)
    }

    /// Arm a measurement; `completion` receives its result exactly once.
    ///
    /// Any measurement still in progress is disabled first.
    pub fn enable(
        &self,
        max_wait: Duration,
        completion: impl FnOnce(TimerResult) + Send + 'static,
    ) -> Result<()> {
        let (start, stop) = self.triggers().ok_or_else(|| {
            PigpioError::InvalidArgument("event timer has no start/stop triggers".into())
        })?;
        self.disable();

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let armed = Arc::new(Armed {
            core: Mutex::new(TimerCore::new()),
            subscriptions: Mutex::new(Vec::with_capacity(2)),
            cancel: Mutex::new(Some(cancel_tx)),
            completion: Mutex::new(Some(Box::new(completion))),
            listener: Arc::clone(&self.listener),
        });

        {
            // Held until both ids are recorded so an early stop edge cannot
            // finish before it can see them.
            let mut subscriptions = lock(&armed.subscriptions);
            let on_start = Arc::clone(&armed);
            let registered = self
                .listener
                .register(start.gpio, start.edge, move |event| on_start.on_start(event))
                .and_then(|start_id| {
                    subscriptions.push(start_id);
                    let on_stop = Arc::clone(&armed);
                    self.listener
                        .register(stop.gpio, stop.edge, move |event| on_stop.on_stop(event))
                });
            match registered {
                Ok(stop_id) => subscriptions.push(stop_id),
                Err(err) => {
                    lock(&armed.core).cancel();
                    drop(subscriptions);
                    armed.finish(None);
                    return Err(err);
                }
            }
        }

        let guard = Arc::clone(&armed);
        let spawned = thread::Builder::new()
            .name("rpigpio-timer-guard".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(max_wait) {
                    guard.on_guard();
                }
            });
        if let Err(err) = spawned {
            lock(&armed.core).cancel();
            armed.finish(None);
            return Err(FrameError::Io(err).into());
        }

        debug!(%start, %stop, ?max_wait, "timer enabled");
        // A concurrent enable may have stored its measurement since the
        // disable above; whichever is displaced here is cancelled.
        let displaced = lock(&self.active).replace(armed);
        if let Some(displaced) = displaced {
            cancel(&displaced);
        }
        Ok(())
    }

    /// Cancel the current measurement without reporting a result.
    ///
    /// Idempotent. A measurement that already completed is unaffected.
    pub fn disable(&self) {
        let taken = lock(&self.active).take();
        if let Some(armed) = taken {
            cancel(&armed);
        }
    }

    /// Measure once, blocking until the stop edge or the guard.
    ///
    /// Returns [`PigpioError::Cancelled`] if another thread disables or
    /// replaces the measurement first.
    pub fn run(&self, max_wait: Duration) -> Result<TimerResult> {
        let (tx, rx) = mpsc::channel();
        self.enable(max_wait, move |result| {
            let _ = tx.send(result);
        })?;
        rx.recv().map_err(|_| PigpioError::Cancelled)
    }

    /// State of the current (or last) measurement.
    pub fn state(&self) -> TimerState {
        match lock(&self.active).as_ref() {
            Some(armed) => lock(&armed.core).state,
            None => TimerState::NeverStarted,
        }
    }

    /// True while a measurement is armed and not yet complete.
    pub fn is_active(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|armed| !lock(&armed.core).completed)
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        self.disable();
    }
}

fn cancel(armed: &Armed) {
    if lock(&armed.core).cancel() {
        debug!("timer disabled");
        armed.finish(None);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
