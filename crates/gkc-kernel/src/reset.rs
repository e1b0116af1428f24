//! The unconditional controller reset primitive.
//!
//! Both the watchdog's own trigger and the fatal emergency-stop path end here.
//! Production code injects [`ProcessReset`]; tests inject [`RecordingReset`]
//! so the reset is observable instead of terminal.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

/// Restart the controller.
pub trait ControllerReset: Send + Sync {
    /// Perform the reset.  Implementations used on the vehicle never return.
    fn reset(&self, reason: &str);
}

/// Aborts the process, leaving the restart to the supervisor that launched it
/// (systemd, the MCU boot ROM, …).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessReset;

impl ControllerReset for ProcessReset {
    fn reset(&self, reason: &str) {
        error!(reason, "controller reset");
        std::process::abort();
    }
}

/// Counts resets and remembers the last reason.  Returns normally.
#[derive(Debug, Default)]
pub struct RecordingReset {
    count: AtomicUsize,
    last_reason: Mutex<Option<String>>,
}

impl RecordingReset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn last_reason(&self) -> Option<String> {
        self.last_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ControllerReset for RecordingReset {
    fn reset(&self, reason: &str) {
        error!(reason, "controller reset (recorded)");
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.last_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }
}
