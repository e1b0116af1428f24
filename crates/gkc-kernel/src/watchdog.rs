//! [`Watchdog`] – liveness supervision for safety-relevant subsystems.
//!
//! Every watched subsystem is a [`Watchable`] registered with
//! [`Watchdog::add_to_watchlist`] before [`Watchdog::arm`].  A background
//! supervision loop ([`Watchdog::spawn`]) wakes every `wakeup_every_ms` and
//! runs one [`Watchdog::supervise`] cycle:
//!
//! 1. For each activated entry, add the elapsed time to its inactivity
//!    accumulator.
//! 2. Once the accumulator exceeds the entry's update interval, poll
//!    [`Watchable::check_activity`].  Activity resets the accumulator; silence
//!    adds the elapsed time a second time and, past the entry's inactivity
//!    limit, fires [`Watchable::watchdog_trigger`].
//! 3. Pulse the watchdog's own liveness counter.
//!
//! The watchdog is itself the first entry of its watchlist.  Its trigger is
//! wired to the [`ControllerReset`] primitive: a supervision loop that stops
//! pulsing cannot be trusted to drive the state machine, so the controller is
//! restarted instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gkc_types::WatchdogConfig;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::reset::ControllerReset;
use crate::watchable::{Watchable, WatchableCore};

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct WatchlistEntry {
    watchable: Arc<dyn Watchable>,
    inactivity_ms: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Supervises registered [`Watchable`]s and escalates through their triggers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gkc_kernel::reset::RecordingReset;
/// use gkc_kernel::watchable::{Watchable, WatchableCore};
/// use gkc_kernel::watchdog::Watchdog;
///
/// let reset = Arc::new(RecordingReset::new());
/// let wd = Watchdog::new(1_000, 3_000, 100, reset.clone());
///
/// let link = Arc::new(WatchableCore::new(200, 500, "rc_link"));
/// wd.add_to_watchlist(link.clone());
/// wd.arm();
///
/// link.pulse();
/// for _ in 0..10 {
///     wd.supervise(100);
///     link.pulse();
/// }
/// assert_eq!(reset.count(), 0);
/// ```
pub struct Watchdog {
    core: Arc<WatchableCore>,
    wakeup_every: Duration,
    watchlist: Mutex<Vec<WatchlistEntry>>,
}

impl Watchdog {
    /// Create a watchdog and register it as the first entry of its own
    /// watchlist.  Nothing is supervised until [`Watchdog::arm`].
    ///
    /// - `update_interval_ms` – how often the supervision loop must pulse.
    /// - `max_inactivity_limit_ms` – grace period before `reset` is invoked.
    /// - `wakeup_every_ms` – supervision loop cadence.
    pub fn new(
        update_interval_ms: u32,
        max_inactivity_limit_ms: u32,
        wakeup_every_ms: u32,
        reset: Arc<dyn ControllerReset>,
    ) -> Self {
        let core = Arc::new(WatchableCore::new(
            update_interval_ms,
            max_inactivity_limit_ms,
            "watchdog",
        ));
        core.attach(move || reset.reset("watchdog supervision loop stopped pulsing"));

        let watchdog = Self {
            core: core.clone(),
            wakeup_every: Duration::from_millis(u64::from(wakeup_every_ms)),
            watchlist: Mutex::new(Vec::new()),
        };
        watchdog.add_to_watchlist(core);
        watchdog
    }

    pub fn from_config(config: &WatchdogConfig, reset: Arc<dyn ControllerReset>) -> Self {
        Self::new(
            config.update_interval_ms,
            config.max_inactivity_limit_ms,
            config.wakeup_every_ms,
            reset,
        )
    }

    fn entries(&self) -> MutexGuard<'_, Vec<WatchlistEntry>> {
        self.watchlist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `watchable` with a zero accumulator.  Register before
    /// [`Watchdog::arm`] so the entry is supervised from the start.
    pub fn add_to_watchlist(&self, watchable: Arc<dyn Watchable>) {
        debug!(entry = watchable.name(), "added to watchlist");
        self.entries().push(WatchlistEntry {
            watchable,
            inactivity_ms: 0,
        });
    }

    /// Activate every registered entry, the watchdog included.
    pub fn arm(&self) {
        for entry in self.entries().iter() {
            entry.watchable.activate();
        }
        info!("watchdog armed");
    }

    /// Deactivate every registered entry and zero every accumulator.
    pub fn disarm(&self) {
        for entry in self.entries().iter_mut() {
            entry.watchable.deactivate();
            entry.inactivity_ms = 0;
        }
        info!("watchdog disarmed");
    }

    pub fn watchlist_len(&self) -> usize {
        self.entries().len()
    }

    /// Current accumulator of the first entry called `name`.
    pub fn inactivity_ms(&self, name: &str) -> Option<u64> {
        self.entries()
            .iter()
            .find(|entry| entry.watchable.name() == name)
            .map(|entry| entry.inactivity_ms)
    }

    /// Run one supervision cycle, `elapsed_ms` after the previous one.
    ///
    /// Triggers are fired in watchlist order after the watchlist lock has been
    /// released, so a trigger may call back into the watchdog.
    /// Entries after one whose trigger disarms the watchdog have still been
    /// counted, and may still trigger, in that same cycle.
    pub fn supervise(&self, elapsed_ms: u64) {
        let mut triggered: Vec<Arc<dyn Watchable>> = Vec::new();

        if self.core.is_activated() {
            for entry in self.entries().iter_mut() {
                let watchable = &entry.watchable;
                if !watchable.is_activated() {
                    continue;
                }

                entry.inactivity_ms += elapsed_ms;
                if entry.inactivity_ms <= u64::from(watchable.update_interval_ms()) {
                    continue;
                }

                if watchable.check_activity() {
                    entry.inactivity_ms = 0;
                    continue;
                }

                // Silence is counted twice: once for the elapsed time and once
                // for the missed check.
                entry.inactivity_ms += elapsed_ms;
                debug!(
                    entry = watchable.name(),
                    inactivity_ms = entry.inactivity_ms,
                    "no activity"
                );
                if entry.inactivity_ms > u64::from(watchable.max_inactivity_limit_ms()) {
                    triggered.push(watchable.clone());
                }
            }
        }

        for watchable in triggered {
            error!(entry = watchable.name(), "watchdog triggered");
            watchable.watchdog_trigger();
        }

        self.core.pulse();
    }

    /// Start the supervision loop on a dedicated thread.
    ///
    /// The loop runs until [`SupervisorHandle::stop`] is called; on the
    /// vehicle that never happens and the loop lives as long as the
    /// controller.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the thread cannot be spawned.
    pub fn spawn(self: Arc<Self>, clock: Arc<dyn Clock>) -> std::io::Result<SupervisorHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name("gkc-watchdog".into())
            .spawn(move || {
                let mut last_ms = clock.now_ms();
                while !stop_flag.load(Ordering::SeqCst) {
                    let now_ms = clock.now_ms();
                    self.supervise(now_ms.saturating_sub(last_ms));
                    last_ms = clock.now_ms();
                    clock.sleep(self.wakeup_every);
                }
                debug!("supervision loop exited");
            })?;
        Ok(SupervisorHandle {
            stop,
            thread: Some(thread),
        })
    }
}

impl Watchable for Watchdog {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn activate(&self) {
        self.core.activate();
    }

    fn deactivate(&self) {
        self.core.deactivate();
    }

    fn is_activated(&self) -> bool {
        self.core.is_activated()
    }

    fn check_activity(&self) -> bool {
        self.core.check_activity()
    }

    fn update_interval_ms(&self) -> u32 {
        self.core.update_interval_ms()
    }

    fn max_inactivity_limit_ms(&self) -> u32 {
        self.core.max_inactivity_limit_ms()
    }

    fn watchdog_trigger(&self) {
        self.core.watchdog_trigger();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor handle
// ────────────────────────────────────────────────────────────────────────────

/// Cancellation handle for the supervision thread returned by
/// [`Watchdog::spawn`].  Dropping the handle stops the loop as well.
pub struct SupervisorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Ask the loop to exit after its current cycle and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("supervision thread panicked");
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::reset::RecordingReset;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Watchable whose activity answer is fixed and whose trigger is counted.
    struct Scripted {
        core: WatchableCore,
        active: bool,
        triggers: AtomicUsize,
    }

    impl Scripted {
        fn new(update_ms: u32, limit_ms: u32, active: bool) -> Arc<Self> {
            Arc::new(Self {
                core: WatchableCore::new(update_ms, limit_ms, "scripted"),
                active,
                triggers: AtomicUsize::new(0),
            })
        }

        fn triggers(&self) -> usize {
            self.triggers.load(Ordering::SeqCst)
        }
    }

    impl Watchable for Scripted {
        fn name(&self) -> &str {
            self.core.name()
        }
        fn activate(&self) {
            self.core.activate();
        }
        fn deactivate(&self) {
            self.core.deactivate();
        }
        fn is_activated(&self) -> bool {
            self.core.is_activated()
        }
        fn check_activity(&self) -> bool {
            self.active
        }
        fn update_interval_ms(&self) -> u32 {
            self.core.update_interval_ms()
        }
        fn max_inactivity_limit_ms(&self) -> u32 {
            self.core.max_inactivity_limit_ms()
        }
        fn watchdog_trigger(&self) {
            self.triggers.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn watchdog() -> (Watchdog, Arc<RecordingReset>) {
        let reset = Arc::new(RecordingReset::new());
        (Watchdog::new(1_000, 3_000, 100, reset.clone()), reset)
    }

    #[test]
    fn watchdog_registers_itself_first() {
        let (wd, _) = watchdog();
        assert_eq!(wd.watchlist_len(), 1);
        assert_eq!(wd.inactivity_ms("watchdog"), Some(0));
    }

    #[test]
    fn silent_entry_triggers_on_fourth_cycle() {
        let (wd, reset) = watchdog();
        let silent = Scripted::new(200, 500, false);
        wd.add_to_watchlist(silent.clone());
        wd.arm();

        wd.supervise(100);
        wd.supervise(100);
        assert_eq!(wd.inactivity_ms("scripted"), Some(200));
        wd.supervise(100);
        // 300 exceeds the interval, the failed check adds another 100.
        assert_eq!(wd.inactivity_ms("scripted"), Some(400));
        assert_eq!(silent.triggers(), 0);

        wd.supervise(100);
        assert_eq!(wd.inactivity_ms("scripted"), Some(600));
        assert_eq!(silent.triggers(), 1);
        assert_eq!(reset.count(), 0);
    }

    #[test]
    fn silent_entry_keeps_triggering_until_it_recovers() {
        let (wd, _) = watchdog();
        let silent = Scripted::new(200, 500, false);
        wd.add_to_watchlist(silent.clone());
        wd.arm();
        for _ in 0..6 {
            wd.supervise(100);
        }
        assert_eq!(silent.triggers(), 3);
    }

    #[test]
    fn silent_entry_trigger_is_bounded_for_any_cadence() {
        for step in [1_u64, 7, 50, 99, 250, 501, 2_000] {
            let (wd, _) = watchdog();
            let silent = Scripted::new(200, 500, false);
            wd.add_to_watchlist(silent.clone());
            wd.arm();

            // Single counting alone reaches the limit after this many cycles;
            // the double count on failed checks can only make it sooner.
            let bound = 500 / step + 2;
            let mut cycles = 0;
            while silent.triggers() == 0 {
                wd.supervise(step);
                cycles += 1;
                assert!(cycles <= bound, "step {step}ms: no trigger after {cycles} cycles");
            }
        }
    }

    #[test]
    fn active_entry_never_triggers() {
        let (wd, _) = watchdog();
        let alive = Scripted::new(200, 500, true);
        wd.add_to_watchlist(alive.clone());
        wd.arm();

        // Deterministic, irregular schedule including gaps far past the limit.
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            wd.supervise(seed % 5_000);
        }
        assert_eq!(alive.triggers(), 0);
    }

    #[test]
    fn pulsed_core_resets_accumulator() {
        let (wd, _) = watchdog();
        let link = Arc::new(WatchableCore::new(200, 500, "link"));
        wd.add_to_watchlist(link.clone());
        wd.arm();

        for _ in 0..3 {
            wd.supervise(100);
        }
        assert_eq!(wd.inactivity_ms("link"), Some(400));
        link.pulse();
        wd.supervise(100);
        assert_eq!(wd.inactivity_ms("link"), Some(0));
    }

    #[test]
    fn deactivated_entry_is_skipped() {
        let (wd, _) = watchdog();
        let silent = Scripted::new(200, 500, false);
        wd.add_to_watchlist(silent.clone());
        wd.arm();
        silent.deactivate();
        for _ in 0..20 {
            wd.supervise(100);
        }
        assert_eq!(silent.triggers(), 0);
        assert_eq!(wd.inactivity_ms("scripted"), Some(0));
    }

    #[test]
    fn unarmed_watchdog_checks_nothing_but_still_pulses() {
        let (wd, _) = watchdog();
        let silent = Scripted::new(200, 500, false);
        wd.add_to_watchlist(silent.clone());
        silent.activate();

        for _ in 0..20 {
            wd.supervise(100);
        }
        assert_eq!(silent.triggers(), 0);
        assert!(wd.check_activity(), "the cycle must still record a pulse");
    }

    #[test]
    fn disarm_deactivates_and_zeroes_accumulators() {
        let (wd, _) = watchdog();
        let silent = Scripted::new(200, 500, false);
        wd.add_to_watchlist(silent.clone());
        wd.arm();
        wd.supervise(100);
        wd.supervise(100);

        wd.disarm();
        assert!(!silent.is_activated());
        assert!(!wd.is_activated());
        assert_eq!(wd.inactivity_ms("scripted"), Some(0));

        wd.arm();
        assert!(silent.is_activated());
        wd.supervise(100);
        assert_eq!(wd.inactivity_ms("scripted"), Some(100));
    }

    #[test]
    fn steady_loop_never_resets_controller() {
        let (wd, reset) = watchdog();
        wd.arm();
        for _ in 0..1_000 {
            wd.supervise(100);
        }
        assert_eq!(reset.count(), 0);
    }

    #[test]
    fn loop_stalled_before_first_pulse_resets_controller() {
        let (wd, reset) = watchdog();
        wd.arm();
        // 5 s without a single pulse: 5000 > 1000, no activity, 10000 > 3000.
        wd.supervise(5_000);
        assert_eq!(reset.count(), 1);
        assert!(reset.last_reason().unwrap().contains("watchdog"));
    }

    #[test]
    fn trigger_may_call_back_into_watchdog() {
        let reset = Arc::new(RecordingReset::new());
        let wd = Arc::new(Watchdog::new(1_000, 3_000, 100, reset));
        let link = Arc::new(WatchableCore::new(200, 500, "link"));
        let wd_ref = Arc::downgrade(&wd);
        link.attach(move || {
            if let Some(wd) = wd_ref.upgrade() {
                wd.disarm();
            }
        });
        wd.add_to_watchlist(link.clone());
        wd.arm();
        for _ in 0..4 {
            wd.supervise(100);
        }
        assert!(!link.is_activated());
    }

    #[test]
    fn entries_after_a_disarming_trigger_are_counted_that_cycle() {
        let reset = Arc::new(RecordingReset::new());
        let wd = Arc::new(Watchdog::new(1_000, 3_000, 100, reset));
        let link = Arc::new(WatchableCore::new(200, 500, "link"));
        let wd_ref = Arc::downgrade(&wd);
        link.attach(move || {
            if let Some(wd) = wd_ref.upgrade() {
                wd.disarm();
            }
        });
        let later = Scripted::new(200, 500, false);
        wd.add_to_watchlist(link.clone());
        wd.add_to_watchlist(later.clone());
        wd.arm();

        for _ in 0..4 {
            wd.supervise(100);
        }
        // Both crossed the limit in cycle 4; the disarm only lands afterwards.
        assert_eq!(later.triggers(), 1);
        assert!(!later.is_activated());
        assert_eq!(wd.inactivity_ms("scripted"), Some(0));

        wd.supervise(100);
        assert_eq!(later.triggers(), 1);
    }

    #[test]
    fn spawned_loop_follows_injected_clock() {
        let reset = Arc::new(RecordingReset::new());
        let wd = Arc::new(Watchdog::new(1_000, 3_000, 100, reset.clone()));
        let clock = Arc::new(ManualClock::new());

        let fired_at = Arc::new(Mutex::new(None));
        let link = Arc::new(WatchableCore::new(200, 500, "link"));
        let (slot, trigger_clock) = (fired_at.clone(), clock.clone());
        link.attach(move || {
            let mut slot = slot.lock().unwrap();
            if slot.is_none() {
                *slot = Some(trigger_clock.now_ms());
            }
        });
        wd.add_to_watchlist(link);
        wd.arm();

        let handle = wd.clone().spawn(clock.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while fired_at.lock().unwrap().is_none() {
            assert!(Instant::now() < deadline, "trigger never fired");
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop();

        // First cycle sees 0 ms, then 100 ms per cycle: the fifth cycle runs
        // at t = 400 ms with the accumulator at 500 + 100.
        assert_eq!(*fired_at.lock().unwrap(), Some(400));
        assert_eq!(reset.count(), 0);
    }

    #[test]
    fn stop_ends_supervision_thread() {
        let (wd, _) = watchdog();
        let wd = Arc::new(wd);
        let handle = wd.clone().spawn(Arc::new(ManualClock::new())).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !wd.check_activity() {
            assert!(Instant::now() < deadline, "supervision loop never pulsed");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_running());
        handle.stop();

        // Nothing pulses once the loop has exited.
        wd.check_activity();
        thread::sleep(Duration::from_millis(20));
        assert!(!wd.check_activity());
    }
}
