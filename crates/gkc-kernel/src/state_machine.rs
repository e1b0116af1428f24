//! [`GkcStateMachine`] – the vehicle lifecycle.
//!
//! ```text
//!   Uninitialized ──initialize──▶ Inactive ──activate──▶ Active
//!         ▲                          ▲  ◀──deactivate───┘
//!         └─(hook failure)           │
//!                                    └──emergency_stop (Success)── Emergency
//! ```
//!
//! Transition legality and the state update that follows each hook result are
//! fixed here.  What a transition actually *does* on the kart lives in the
//! [`LifecycleHooks`] supplied by the vehicle controller.
//!
//! | Call | Legal from | `Success` | `EmergencyStop` | other |
//! |---|---|---|---|---|
//! | `initialize` | `Uninitialized` | `Inactive` | `Emergency` | `Uninitialized` |
//! | `activate` | `Inactive` | `Active` | `Emergency` | `Inactive` |
//! | `deactivate` | `Active` | `Inactive` | `Emergency` | `Active` |
//! | `emergency_stop` | any but `Uninitialized` | `Inactive` | `Emergency` | `Emergency`, `Error` resets |
//! | `reinitialize` | `Uninitialized` | `Inactive` | `Uninitialized` | `Uninitialized` |
//!
//! Illegal calls return [`StateTransitionResult::FailureInvalidTransition`] and
//! leave the state untouched.  After every state change the readiness
//! indicator is driven to `state == Active`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gkc_types::{GkcError, GkcLifecycle, StateTransitionResult};
use tracing::{error, info, warn};

use crate::reset::ControllerReset;

// ────────────────────────────────────────────────────────────────────────────
// Collaborator traits
// ────────────────────────────────────────────────────────────────────────────

/// Vehicle-specific behaviour run inside each transition.
///
/// Each hook receives the state the machine is in while the hook runs
/// (`Initializing` for initialize/reinitialize, `Emergency` for the emergency
/// stop, the pre-transition state otherwise).
pub trait LifecycleHooks: Send {
    fn on_initialize(&mut self, state: GkcLifecycle) -> StateTransitionResult;
    fn on_activate(&mut self, state: GkcLifecycle) -> StateTransitionResult;
    fn on_deactivate(&mut self, state: GkcLifecycle) -> StateTransitionResult;
    /// Returning [`StateTransitionResult::Error`] resets the controller.
    fn on_emergency_stop(&mut self, state: GkcLifecycle) -> StateTransitionResult;
    fn on_reinitialize(&mut self, state: GkcLifecycle) -> StateTransitionResult;
}

/// Binary "ready to drive" output, e.g. a status LED.
pub trait ReadinessIndicator: Send + Sync {
    fn set_ready(&self, ready: bool);
}

/// Indicator that just remembers the last value.
#[derive(Debug, Default)]
pub struct AtomicIndicator {
    ready: AtomicBool,
}

impl AtomicIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl ReadinessIndicator for AtomicIndicator {
    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GkcStateMachine
// ────────────────────────────────────────────────────────────────────────────

/// A state machine shared between the control loop and watchdog triggers.
/// Every transition goes through the mutex.
pub type SharedStateMachine<H> = Arc<Mutex<GkcStateMachine<H>>>;

/// The vehicle lifecycle.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gkc_kernel::reset::RecordingReset;
/// use gkc_kernel::state_machine::{AtomicIndicator, GkcStateMachine, LifecycleHooks};
/// use gkc_types::{GkcLifecycle, StateTransitionResult};
///
/// struct AlwaysOk;
/// impl LifecycleHooks for AlwaysOk {
///     fn on_initialize(&mut self, _: GkcLifecycle) -> StateTransitionResult { StateTransitionResult::Success }
///     fn on_activate(&mut self, _: GkcLifecycle) -> StateTransitionResult { StateTransitionResult::Success }
///     fn on_deactivate(&mut self, _: GkcLifecycle) -> StateTransitionResult { StateTransitionResult::Success }
///     fn on_emergency_stop(&mut self, _: GkcLifecycle) -> StateTransitionResult { StateTransitionResult::Success }
///     fn on_reinitialize(&mut self, _: GkcLifecycle) -> StateTransitionResult { StateTransitionResult::Success }
/// }
///
/// let led = Arc::new(AtomicIndicator::new());
/// let mut sm = GkcStateMachine::new(AlwaysOk, led.clone(), Arc::new(RecordingReset::new()));
///
/// assert_eq!(sm.initialize(), StateTransitionResult::Success);
/// assert_eq!(sm.activate(), StateTransitionResult::Success);
/// assert_eq!(sm.state(), GkcLifecycle::Active);
/// assert!(led.is_ready());
///
/// // Activating twice is not a legal transition.
/// assert_eq!(sm.activate(), StateTransitionResult::FailureInvalidTransition);
/// ```
pub struct GkcStateMachine<H: LifecycleHooks> {
    state: GkcLifecycle,
    hooks: H,
    indicator: Arc<dyn ReadinessIndicator>,
    reset: Arc<dyn ControllerReset>,
}

impl<H: LifecycleHooks> GkcStateMachine<H> {
    /// Create a machine in [`GkcLifecycle::Uninitialized`].
    pub fn new(
        hooks: H,
        indicator: Arc<dyn ReadinessIndicator>,
        reset: Arc<dyn ControllerReset>,
    ) -> Self {
        let machine = Self {
            state: GkcLifecycle::Uninitialized,
            hooks,
            indicator,
            reset,
        };
        machine.post_transition_check();
        machine
    }

    pub fn into_shared(self) -> SharedStateMachine<H> {
        Arc::new(Mutex::new(self))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GkcLifecycle {
        self.state
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// `Uninitialized → Inactive`.
    pub fn initialize(&mut self) -> StateTransitionResult {
        if self.state != GkcLifecycle::Uninitialized {
            return self.reject("initialize");
        }
        self.state = GkcLifecycle::Initializing;
        let result = self.hooks.on_initialize(self.state);
        self.state = match result {
            StateTransitionResult::Success => GkcLifecycle::Inactive,
            StateTransitionResult::EmergencyStop => GkcLifecycle::Emergency,
            _ => GkcLifecycle::Uninitialized,
        };
        self.finish("initialize", result)
    }

    /// `Inactive → Active`.
    pub fn activate(&mut self) -> StateTransitionResult {
        if self.state != GkcLifecycle::Inactive {
            return self.reject("activate");
        }
        let result = self.hooks.on_activate(self.state);
        self.state = match result {
            StateTransitionResult::Success => GkcLifecycle::Active,
            StateTransitionResult::EmergencyStop => GkcLifecycle::Emergency,
            _ => GkcLifecycle::Inactive,
        };
        self.finish("activate", result)
    }

    /// `Active → Inactive`.
    pub fn deactivate(&mut self) -> StateTransitionResult {
        if self.state != GkcLifecycle::Active {
            return self.reject("deactivate");
        }
        let result = self.hooks.on_deactivate(self.state);
        self.state = match result {
            StateTransitionResult::Success => GkcLifecycle::Inactive,
            StateTransitionResult::EmergencyStop => GkcLifecycle::Emergency,
            _ => GkcLifecycle::Active,
        };
        self.finish("deactivate", result)
    }

    /// Enter [`GkcLifecycle::Emergency`] and run the emergency-stop hook.
    ///
    /// The state is marked `Emergency` before the hook runs, so the hook
    /// always observes it.  A `Success` result clears the emergency to
    /// `Inactive`; anything else keeps the vehicle in `Emergency`.
    ///
    /// # Errors
    ///
    /// When the hook returns [`StateTransitionResult::Error`] the controller
    /// reset primitive is invoked exactly once and
    /// [`GkcError::FatalReset`] is returned in place of a transition result.
    pub fn emergency_stop(&mut self) -> Result<StateTransitionResult, GkcError> {
        if self.state == GkcLifecycle::Uninitialized {
            return Ok(self.reject("emergency_stop"));
        }
        if self.state != GkcLifecycle::Emergency {
            warn!(from = %self.state, "entering emergency state");
            self.state = GkcLifecycle::Emergency;
            self.post_transition_check();
        }

        let result = self.hooks.on_emergency_stop(self.state);
        match result {
            StateTransitionResult::Success => self.state = GkcLifecycle::Inactive,
            StateTransitionResult::Error => {
                self.state = GkcLifecycle::Emergency;
                self.post_transition_check();
                let reason = "emergency stop hook failed";
                error!(reason, "fatal lifecycle error; resetting controller");
                self.reset.reset(reason);
                return Err(GkcError::FatalReset(reason.to_string()));
            }
            _ => self.state = GkcLifecycle::Emergency,
        }
        Ok(self.finish("emergency_stop", result))
    }

    /// `Uninitialized → Inactive` through the reinitialize hook.
    ///
    /// Shares `initialize`'s precondition: calling it from `Emergency` is an
    /// invalid transition.
    pub fn reinitialize(&mut self) -> StateTransitionResult {
        if self.state != GkcLifecycle::Uninitialized {
            return self.reject("reinitialize");
        }
        self.state = GkcLifecycle::Initializing;
        let result = self.hooks.on_reinitialize(self.state);
        self.state = match result {
            StateTransitionResult::Success => GkcLifecycle::Inactive,
            _ => GkcLifecycle::Uninitialized,
        };
        self.finish("reinitialize", result)
    }

    fn reject(&self, transition: &'static str) -> StateTransitionResult {
        warn!(transition, state = %self.state, "invalid transition");
        StateTransitionResult::FailureInvalidTransition
    }

    fn finish(&self, transition: &'static str, result: StateTransitionResult) -> StateTransitionResult {
        self.post_transition_check();
        info!(transition, ?result, state = %self.state, "transition complete");
        result
    }

    fn post_transition_check(&self) {
        self.indicator
            .set_ready(self.state == GkcLifecycle::Active);
    }
}
