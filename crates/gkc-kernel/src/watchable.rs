//! The [`Watchable`] contract and its reusable implementation.
//!
//! Anything whose liveness matters for safety (the command link, the
//! supervision loop itself, …) implements [`Watchable`] and is registered
//! with the [`Watchdog`][crate::watchdog::Watchdog] before it is armed.
//!
//! Most subsystems embed a [`WatchableCore`] and call
//! [`WatchableCore::pulse`] whenever they do useful work; the watchdog then
//! polls [`Watchable::check_activity`] to learn whether any pulse arrived
//! since it last asked.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// A subsystem that can be armed, disarmed, and polled for recent activity.
///
/// All methods take `&self`: watchables are shared between their owner and
/// the watchdog thread.
pub trait Watchable: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    fn activate(&self);

    fn deactivate(&self);

    fn is_activated(&self) -> bool;

    /// Return `true` when the subsystem has shown activity since the previous
    /// call.
    fn check_activity(&self) -> bool;

    /// Accumulated inactivity (ms) after which the watchdog starts polling
    /// [`Watchable::check_activity`].
    fn update_interval_ms(&self) -> u32;

    /// Accumulated inactivity (ms) after which the trigger fires.
    fn max_inactivity_limit_ms(&self) -> u32;

    /// Escalation invoked by the watchdog when the limit is exceeded.
    fn watchdog_trigger(&self);
}

type Trigger = Arc<dyn Fn() + Send + Sync>;

/// Pulse counter, activation flag, and trigger slot shared by most
/// [`Watchable`] implementations.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use gkc_kernel::watchable::{Watchable, WatchableCore};
///
/// let fired = Arc::new(AtomicBool::new(false));
/// let core = WatchableCore::new(200, 500, "rc_link");
/// let flag = fired.clone();
/// core.attach(move || flag.store(true, Ordering::SeqCst));
///
/// assert!(!core.check_activity());
/// core.pulse();
/// assert!(core.check_activity());
/// assert!(!core.check_activity()); // consumed
///
/// core.watchdog_trigger();
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct WatchableCore {
    name: String,
    update_interval_ms: u32,
    max_inactivity_limit_ms: u32,
    activated: AtomicBool,
    pulses: AtomicU64,
    last_seen: AtomicU64,
    trigger: Mutex<Option<Trigger>>,
}

impl WatchableCore {
    /// Create an inactive core with no trigger attached.
    pub fn new(update_interval_ms: u32, max_inactivity_limit_ms: u32, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_interval_ms,
            max_inactivity_limit_ms,
            activated: AtomicBool::new(false),
            pulses: AtomicU64::new(0),
            last_seen: AtomicU64::new(0),
            trigger: Mutex::new(None),
        }
    }

    /// Record activity.
    pub fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }

    /// Attach the escalation callback, replacing any previous one.
    pub fn attach<F>(&self, trigger: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.trigger.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(trigger));
    }
}

impl Watchable for WatchableCore {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&self) {
        self.activated.store(true, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.activated.store(false, Ordering::SeqCst);
    }

    fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    fn check_activity(&self) -> bool {
        let pulses = self.pulses.load(Ordering::SeqCst);
        self.last_seen.swap(pulses, Ordering::SeqCst) != pulses
    }

    fn update_interval_ms(&self) -> u32 {
        self.update_interval_ms
    }

    fn max_inactivity_limit_ms(&self) -> u32 {
        self.max_inactivity_limit_ms
    }

    fn watchdog_trigger(&self) {
        // Clone out of the slot so the callback may re-attach.
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match trigger {
            Some(trigger) => trigger(),
            None => warn!(name = %self.name, "watchdog trigger fired with nothing attached"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn core_starts_inactive() {
        let core = WatchableCore::new(100, 300, "link");
        assert!(!core.is_activated());
        assert_eq!(core.name(), "link");
        assert_eq!(core.update_interval_ms(), 100);
        assert_eq!(core.max_inactivity_limit_ms(), 300);
    }

    #[test]
    fn activate_and_deactivate_toggle_flag() {
        let core = WatchableCore::new(100, 300, "link");
        core.activate();
        assert!(core.is_activated());
        core.deactivate();
        assert!(!core.is_activated());
    }

    #[test]
    fn several_pulses_count_as_one_observation() {
        let core = WatchableCore::new(100, 300, "link");
        core.pulse();
        core.pulse();
        core.pulse();
        assert!(core.check_activity());
        assert!(!core.check_activity());
        core.pulse();
        assert!(core.check_activity());
    }

    #[test]
    fn trigger_without_callback_is_noop() {
        let core = WatchableCore::new(100, 300, "link");
        core.watchdog_trigger();
    }

    #[test]
    fn attach_replaces_previous_trigger() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let core = WatchableCore::new(100, 300, "link");
        let f = first.clone();
        core.attach(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        core.attach(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });
        core.watchdog_trigger();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
