//! [`VehicleHooks`] – what each lifecycle transition does on the kart.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gkc_hal::{ActuationController, CanBus};
use gkc_kernel::LifecycleHooks;
use gkc_types::{GkcError, GkcLifecycle, StateTransitionResult};
use tracing::{info, warn};

/// Actuation controller shared by the hooks, the control loop, and anything
/// else that needs to reach the motors.
pub type SharedActuation<B> = Arc<Mutex<ActuationController<B>>>;

pub fn share_actuation<B: CanBus>(controller: ActuationController<B>) -> SharedActuation<B> {
    Arc::new(Mutex::new(controller))
}

pub(crate) fn lock_actuation<B: CanBus>(
    actuation: &SharedActuation<B>,
) -> MutexGuard<'_, ActuationController<B>> {
    actuation.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reference [`LifecycleHooks`] driving the shared [`ActuationController`].
///
/// | Hook | Action | Result |
/// |---|---|---|
/// | initialize / reinitialize | zero throttle, centre steering | `Success`, `Error` on bus rejection |
/// | activate | release the emergency-stop latch | `Success` |
/// | deactivate | zero throttle | `Success`, `Error` on bus rejection |
/// | emergency stop | full relative brake, latched | `Success`, `Error` on bus rejection |
pub struct VehicleHooks<B: CanBus> {
    actuation: SharedActuation<B>,
}

impl<B: CanBus> VehicleHooks<B> {
    pub fn new(actuation: SharedActuation<B>) -> Self {
        Self { actuation }
    }

    pub fn actuation(&self) -> &SharedActuation<B> {
        &self.actuation
    }

    fn neutral(&self) -> Result<(), GkcError> {
        let mut act = lock_actuation(&self.actuation);
        act.set_throttle_cmd(0.0)?;
        act.set_steering_cmd(0.0)
    }
}

fn outcome(hook: &'static str, result: Result<(), GkcError>) -> StateTransitionResult {
    match result {
        Ok(()) => StateTransitionResult::Success,
        Err(e) => {
            warn!(hook, error = %e, "vehicle hook failed");
            StateTransitionResult::Error
        }
    }
}

impl<B: CanBus> LifecycleHooks for VehicleHooks<B> {
    fn on_initialize(&mut self, _state: GkcLifecycle) -> StateTransitionResult {
        outcome("initialize", self.neutral())
    }

    fn on_activate(&mut self, _state: GkcLifecycle) -> StateTransitionResult {
        lock_actuation(&self.actuation).release_estop();
        info!("vehicle armed for driving");
        StateTransitionResult::Success
    }

    fn on_deactivate(&mut self, _state: GkcLifecycle) -> StateTransitionResult {
        let result = lock_actuation(&self.actuation).set_throttle_cmd(0.0);
        outcome("deactivate", result)
    }

    fn on_emergency_stop(&mut self, _state: GkcLifecycle) -> StateTransitionResult {
        let result = lock_actuation(&self.actuation).estop();
        outcome("emergency_stop", result)
    }

    fn on_reinitialize(&mut self, _state: GkcLifecycle) -> StateTransitionResult {
        outcome("reinitialize", self.neutral())
    }
}
