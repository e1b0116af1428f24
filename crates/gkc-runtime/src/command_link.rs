//! [`CommandLink`] – the supervised source of driving commands.
//!
//! Whatever feeds the kart (radio receiver, autonomy stack, the CLI demo
//! pilot) calls [`CommandLink::submit`] once per command.  Every submit counts
//! as activity for the [`Watchdog`][gkc_kernel::Watchdog]; when submits stop,
//! the link's trigger stops the vehicle and forgets the last command so a
//! stale request is never replayed after recovery.

use std::sync::{Arc, Mutex, PoisonError};

use gkc_kernel::{LifecycleHooks, SharedStateMachine, Watchable, WatchableCore};
use gkc_types::WatchdogConfig;
use tracing::{debug, error, warn};

/// One driving request in physical units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveCommand {
    /// Wheel speed in m/s; bounded by the actuation controller.
    pub throttle: f32,
    /// Steering angle in radians.
    pub steering: f32,
    /// Brake position; `0.0` means no brake request.
    pub brake: f32,
}

impl DriveCommand {
    pub fn new(throttle: f32, steering: f32, brake: f32) -> Self {
        Self {
            throttle,
            steering,
            brake,
        }
    }
}

/// Latest [`DriveCommand`] plus the liveness bookkeeping the watchdog polls.
///
/// # Example
///
/// ```
/// use gkc_kernel::Watchable;
/// use gkc_runtime::command_link::{CommandLink, DriveCommand};
///
/// let link = CommandLink::new(200, 500);
/// link.submit(DriveCommand::new(2.0, 0.1, 0.0));
///
/// assert_eq!(link.latest().throttle, 2.0);
/// assert!(link.check_activity());
/// ```
pub struct CommandLink {
    core: WatchableCore,
    latest: Arc<Mutex<DriveCommand>>,
}

impl CommandLink {
    pub const NAME: &'static str = "command_link";

    pub fn new(update_interval_ms: u32, max_inactivity_limit_ms: u32) -> Self {
        Self {
            core: WatchableCore::new(update_interval_ms, max_inactivity_limit_ms, Self::NAME),
            latest: Arc::new(Mutex::new(DriveCommand::default())),
        }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(
            config.link_update_interval_ms,
            config.link_max_inactivity_limit_ms,
        )
    }

    /// Store `command` as the latest request and record activity.
    pub fn submit(&self, command: DriveCommand) {
        debug!(?command, "command received");
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = command;
        self.core.pulse();
    }

    /// The most recent command, or neutral if none arrived since the last
    /// trigger.
    pub fn latest(&self) -> DriveCommand {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the link's trigger run the state machine's emergency stop.
    pub fn wire_emergency_stop<H>(&self, state_machine: SharedStateMachine<H>)
    where
        H: LifecycleHooks + 'static,
    {
        let latest = Arc::clone(&self.latest);
        self.core.attach(move || {
            *latest.lock().unwrap_or_else(PoisonError::into_inner) = DriveCommand::default();
            error!(entry = Self::NAME, "command link silent; emergency stop");
            let mut sm = state_machine.lock().unwrap_or_else(PoisonError::into_inner);
            match sm.emergency_stop() {
                Ok(result) => debug!(?result, state = %sm.state(), "emergency stop issued"),
                Err(e) => warn!(error = %e, "emergency stop escalated"),
            }
        });
    }
}

impl Watchable for CommandLink {
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
