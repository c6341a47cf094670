//! Edge-triggered subscriptions and the monitor mask derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{PigpioError, Result};
use crate::gpio::Level;

/// Highest GPIO carried by the notification stream.
pub const MAX_NOTIFY_GPIO: u32 = 31;

/// Which level transitions a subscription reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Edge {
    Rising = 0,
    Falling = 1,
    Either = 2,
}

impl Edge {
    /// Numeric value used by the daemon for edge parameters.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// True when a transition to `level` passes this filter.
    pub fn accepts(self, level: Level) -> bool {
        match self {
            Edge::Rising => level == Level::High,
            Edge::Falling => level == Level::Low,
            Edge::Either => true,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Either => "either",
        })
    }
}

impl FromStr for Edge {
    type Err = PigpioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rising" | "rise" | "r" => Ok(Edge::Rising),
            "falling" | "fall" | "f" => Ok(Edge::Falling),
            "either" | "both" | "e" => Ok(Edge::Either),
            other => Err(PigpioError::InvalidArgument(format!(
                "unknown edge '{other}' (expected rising, falling or either)"
            ))),
        }
    }
}

/// A level change delivered to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub gpio: u32,
    /// Level after the transition.
    pub level: Level,
    /// Daemon tick of the notification, in microseconds.
    pub tick: u32,
}

/// Opaque handle returned by `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type EdgeCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

struct Subscription {
    gpio: u32,
    edge: Edge,
    callback: EdgeCallback,
}

/// The live subscription set.
///
/// Two locks are used. The subscription lock guards only the map and is
/// never held while a callback or a daemon command runs. The mask lock is
/// held across recompute-and-push so the daemon always ends up with the
/// mask of the latest completed change.
pub struct SubscriberRegistry {
    subscriptions: Mutex<BTreeMap<SubscriptionId, Subscription>>,
    pushed_mask: Mutex<u32>,
    next_id: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(BTreeMap::new()),
            pushed_mask: Mutex::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a subscription, pushing the new mask through `push` if it grew.
    ///
    /// If `push` fails the subscription is removed again and the error is
    /// returned.
    pub fn register(
        &self,
        gpio: u32,
        edge: Edge,
        callback: EdgeCallback,
        push: impl FnOnce(u32) -> Result<()>,
    ) -> Result<SubscriptionId> {
        if gpio > MAX_NOTIFY_GPIO {
            return Err(PigpioError::InvalidGpio(gpio));
        }

        let mut pushed = lock(&self.pushed_mask);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mask = {
            let mut subs = lock(&self.subscriptions);
            subs.insert(
                id,
                Subscription {
                    gpio,
                    edge,
                    callback,
                },
            );
            mask_of(&subs)
        };

        if mask != *pushed {
            if let Err(err) = push(mask) {
                lock(&self.subscriptions).remove(&id);
                return Err(err);
            }
            *pushed = mask;
        }
        debug!(%id, gpio, %edge, mask, "subscription added");
        Ok(id)
    }

    /// Remove a subscription. Unknown ids are ignored and return `false`.
    ///
    /// The subscription is gone even if pushing the reduced mask fails.
    pub fn unregister(
        &self,
        id: SubscriptionId,
        push: impl FnOnce(u32) -> Result<()>,
    ) -> Result<bool> {
        let mut pushed = lock(&self.pushed_mask);
        let mask = {
            let mut subs = lock(&self.subscriptions);
            if subs.remove(&id).is_none() {
                return Ok(false);
            }
            mask_of(&subs)
        };

        if mask != *pushed {
            push(mask)?;
            *pushed = mask;
        }
        debug!(%id, mask, "subscription removed");
        Ok(true)
    }

    /// Push the current mask unconditionally, e.g. for a fresh daemon handle.
    pub fn resync(&self, push: impl FnOnce(u32) -> Result<()>) -> Result<u32> {
        let mut pushed = lock(&self.pushed_mask);
        let mask = self.mask();
        push(mask)?;
        *pushed = mask;
        Ok(mask)
    }

    /// Forget the mask last pushed, after the daemon handle was closed.
    pub fn reset_pushed(&self) {
        *lock(&self.pushed_mask) = 0;
    }

    /// Invoke every subscription whose GPIO is in `changed` and whose edge
    /// accepts the new level. Returns the number of callbacks run.
    pub fn dispatch(&self, changed: u32, levels: u32, tick: u32) -> usize {
        if changed == 0 {
            return 0;
        }

        let due: Vec<(SubscriptionId, EdgeEvent, EdgeCallback)> = lock(&self.subscriptions)
            .iter()
            .filter(|(_, sub)| changed & (1 << sub.gpio) != 0)
            .filter_map(|(id, sub)| {
                let level = Level::from(levels & (1 << sub.gpio) != 0);
                sub.edge.accepts(level).then(|| {
                    (
                        *id,
                        EdgeEvent {
                            gpio: sub.gpio,
                            level,
                            tick,
                        },
                        Arc::clone(&sub.callback),
                    )
                })
            })
            .collect();

        // An earlier callback in this frame may have removed a later one.
        let mut invoked = 0;
        for (id, event, callback) in &due {
            if !lock(&self.subscriptions).contains_key(id) {
                continue;
            }
            callback(*event);
            invoked += 1;
        }
        invoked
    }

    /// OR of `1 << gpio` over live subscriptions.
    pub fn mask(&self) -> u32 {
        mask_of(&lock(&self.subscriptions))
    }

    /// The mask most recently accepted by the daemon.
    pub fn pushed_mask(&self) -> u32 {
        *lock(&self.pushed_mask)
    }

    pub fn len(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mask_of(subs: &BTreeMap<SubscriptionId, Subscription>) -> u32 {
    subs.values().fold(0, |mask, sub| mask | (1 << sub.gpio))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn noop() -> EdgeCallback {
        Arc::new(|_| {})
    }

    fn recording(pushes: &Mutex<Vec<u32>>) -> impl FnOnce(u32) -> Result<()> + '_ {
        move |mask| {
            pushes.lock().expect("lock should not be poisoned").push(mask);
            Ok(())
        }
    }

    #[test]
    fn edge_filter() {
        assert!(Edge::Rising.accepts(Level::High));
        assert!(!Edge::Rising.accepts(Level::Low));
        assert!(Edge::Falling.accepts(Level::Low));
        assert!(!Edge::Falling.accepts(Level::High));
        assert!(Edge::Either.accepts(Level::Low));
        assert!(Edge::Either.accepts(Level::High));
    }

    #[test]
    fn edge_parses_and_displays() {
        assert_eq!("Rising".parse::<Edge>().expect("value should parse"), Edge::Rising);
        assert_eq!("fall".parse::<Edge>().expect("value should parse"), Edge::Falling);
        assert_eq!("both".parse::<Edge>().expect("value should parse"), Edge::Either);
        assert!("sideways".parse::<Edge>().is_err());
        assert_eq!(Edge::Either.to_string(), "either");
        assert_eq!(Edge::Falling.code(), 1);
    }

    #[test]
    fn mask_tracks_live_subscriptions() {
        let registry = SubscriberRegistry::new();
        let pushes = Mutex::new(Vec::new());

        let a = registry
            .register(4, Edge::Rising, noop(), recording(&pushes))
            .expect("subscription should register");
        let b = registry
            .register(4, Edge::Falling, noop(), recording(&pushes))
            .expect("subscription should register");
        let c = registry
            .register(17, Edge::Either, noop(), recording(&pushes))
            .expect("subscription should register");
        assert_eq!(registry.mask(), (1 << 4) | (1 << 17));
        assert_eq!(
            *pushes.lock().expect("lock should not be poisoned"),
            vec![1 << 4, (1 << 4) | (1 << 17)]
        );

        // GPIO 4 still has a subscriber, no push.
        assert!(registry.unregister(a, recording(&pushes)).expect("unregister should succeed"));
        assert_eq!(pushes.lock().expect("lock should not be poisoned").len(), 2);

        assert!(registry.unregister(b, recording(&pushes)).expect("unregister should succeed"));
        assert_eq!(registry.mask(), 1 << 17);
        assert_eq!(pushes.lock().expect("lock should not be poisoned").last(), Some(&(1 << 17)));
        assert_eq!(pushes.lock().expect("lock should not be poisoned").len(), 3);

        assert!(registry.unregister(c, recording(&pushes)).expect("unregister should succeed"));
        assert_eq!(registry.mask(), 0);
        assert_eq!(registry.pushed_mask(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_is_noop() {
        let registry = SubscriberRegistry::new();
        let pushes = Mutex::new(Vec::new());
        let id = registry
            .register(2, Edge::Rising, noop(), recording(&pushes))
            .expect("subscription should register");
        assert!(registry.unregister(id, recording(&pushes)).expect("unregister should succeed"));
        assert!(!registry.unregister(id, recording(&pushes)).expect("unregister should succeed"));
        assert_eq!(pushes.lock().expect("lock should not be poisoned").len(), 2);
    }

    #[test]
    fn failed_push_rolls_back() {
        let registry = SubscriberRegistry::new();
        let err = registry
            .register(5, Edge::Rising, noop(), |_| Err(PigpioError::daemon(-25)))
            .expect_err("register should fail");
        assert!(matches!(err, PigpioError::Daemon { code: -25, .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.mask(), 0);
        assert_eq!(registry.pushed_mask(), 0);
    }

    #[test]
    fn gpio_out_of_range() {
        let registry = SubscriberRegistry::new();
        let err = registry
            .register(32, Edge::Rising, noop(), |_| Ok(()))
            .expect_err("register should fail");
        assert!(matches!(err, PigpioError::InvalidGpio(32)));
    }

    #[test]
    fn dispatch_applies_edge_filter() {
        let registry = SubscriberRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        for (gpio, edge) in [(3, Edge::Rising), (3, Edge::Falling), (9, Edge::Either)] {
            let events = Arc::clone(&events);
            registry
                .register(
                    gpio,
                    edge,
                    Arc::new(move |event| {
                        events
                            .lock()
                            .expect("lock should not be poisoned")
                            .push((edge, event))
                    }),
                    |_| Ok(()),
                )
                .expect("subscription should register");
        }

        // GPIO 3 rises, GPIO 9 falls, GPIO 5 changes with no subscriber.
        let changed = (1 << 3) | (1 << 9) | (1 << 5);
        let levels = 1 << 3;
        assert_eq!(registry.dispatch(changed, levels, 777), 2);

        let events = events.lock().expect("lock should not be poisoned");
        assert_eq!(events.len(), 2);
        assert!(events.contains(&(
            Edge::Rising,
            EdgeEvent {
                gpio: 3,
                level: Level::High,
                tick: 777
            }
        )));
        assert!(events.contains(&(
            Edge::Either,
            EdgeEvent {
                gpio: 9,
                level: Level::Low,
                tick: 777
            }
        )));
    }

    #[test]
    fn callback_may_unregister_itself() {
        let registry = Arc::new(SubscriberRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let callback: EdgeCallback = {
            let registry = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = slot.lock().expect("lock should not be poisoned").take() {
                    registry.unregister(id, |_| Ok(())).expect("unregister should succeed");
                }
            })
        };
        let id = registry
            .register(6, Edge::Either, callback, |_| Ok(()))
            .expect("subscription should register");
        *slot.lock().expect("lock should not be poisoned") = Some(id);

        assert_eq!(registry.dispatch(1 << 6, 1 << 6, 1), 1);
        assert_eq!(registry.dispatch(1 << 6, 0, 2), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn callback_removed_earlier_in_frame_is_skipped() {
        let registry = Arc::new(SubscriberRegistry::new());
        let b_calls = Arc::new(AtomicUsize::new(0));
        let target: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let remover: EdgeCallback = {
            let registry = Arc::clone(&registry);
            let target = Arc::clone(&target);
            Arc::new(move |_| {
                let id = target.lock().expect("lock should not be poisoned").take();
                if let Some(id) = id {
                    registry
                        .unregister(id, |_| Ok(()))
                        .expect("unregister should succeed");
                }
            })
        };
        let removed: EdgeCallback = {
            let b_calls = Arc::clone(&b_calls);
            Arc::new(move |_| {
                b_calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        // Ids are ordered, so the GPIO 5 subscription dispatches first.
        registry
            .register(5, Edge::Either, remover, |_| Ok(()))
            .expect("register on gpio 5 should succeed");
        let b = registry
            .register(6, Edge::Either, removed, |_| Ok(()))
            .expect("register on gpio 6 should succeed");
        *target.lock().expect("lock should not be poisoned") = Some(b);

        assert_eq!(registry.dispatch((1 << 5) | (1 << 6), 0, 10), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.mask(), 1 << 5);
    }

    #[test]
    fn concurrent_register_keeps_mask_consistent() {
        let registry = Arc::new(SubscriberRegistry::new());
        let daemon_mask = Arc::new(Mutex::new(0u32));

        let workers: Vec<_> = (0..8u32)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                let daemon_mask = Arc::clone(&daemon_mask);
                std::thread::spawn(move || {
                    for round in 0..25u32 {
                        let gpio = (worker * 4 + round) % 32;
                        let push = |mask: u32| -> Result<()> {
                            *daemon_mask.lock().expect("lock should not be poisoned") = mask;
                            Ok(())
                        };
                        let id = registry
                            .register(gpio, Edge::Either, noop(), push)
                            .expect("subscription should register");
                        if round % 2 == 0 {
                            let push = |mask: u32| -> Result<()> {
                                *daemon_mask.lock().expect("lock should not be poisoned") = mask;
                                Ok(())
                            };
                            registry.unregister(id, push).expect("unregister should succeed");
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("thread should finish");
        }

        assert_eq!(registry.mask(), registry.pushed_mask());
        assert_eq!(*daemon_mask.lock().expect("lock should not be poisoned"), registry.mask());
    }

    #[test]
    fn resync_pushes_current_mask() {
        let registry = SubscriberRegistry::new();
        registry
            .register(1, Edge::Rising, noop(), |_| Ok(()))
            .expect("subscription should register");
        registry.reset_pushed();
        assert_eq!(registry.pushed_mask(), 0);

        let pushes = Mutex::new(Vec::new());
        assert_eq!(registry.resync(recording(&pushes)).expect("resync should succeed"), 1 << 1);
        assert_eq!(*pushes.lock().expect("lock should not be poisoned"), vec![1 << 1]);
        assert_eq!(registry.pushed_mask(), 1 << 1);
    }
}
