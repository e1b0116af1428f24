//! [`ControlLoop`] – gates actuation on the lifecycle state.
//!
//! Each cycle reads the state machine once, releases it, and only then talks
//! to the actuation controller.  The two locks are never held together, so a
//! watchdog trigger running `emergency_stop` concurrently cannot deadlock
//! with the loop; the actuation controller's emergency-stop latch makes sure
//! a throttle decided on a stale `Active` reading is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use gkc_hal::CanBus;
use gkc_kernel::{Clock, LifecycleHooks, SharedStateMachine};
use gkc_types::{GkcError, GkcLifecycle};
use tracing::{debug, info, warn};

use crate::command_link::{CommandLink, DriveCommand};
use crate::hooks::{SharedActuation, lock_actuation};

/// One control cycle's worth of wiring.
pub struct ControlLoop<H: LifecycleHooks, B: CanBus> {
    state_machine: SharedStateMachine<H>,
    actuation: SharedActuation<B>,
    link: Arc<CommandLink>,
}

impl<H: LifecycleHooks, B: CanBus> ControlLoop<H, B> {
    pub fn new(
        state_machine: SharedStateMachine<H>,
        actuation: SharedActuation<B>,
        link: Arc<CommandLink>,
    ) -> Self {
        Self {
            state_machine,
            actuation,
            link,
        }
    }

    fn state(&self) -> GkcLifecycle {
        self.state_machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Run one control cycle and return the state it acted on.
    ///
    /// - `Active`: forward the latest command.  A non-zero brake request takes
    ///   the place of the throttle for that cycle.
    /// - `Emergency`: brake.
    /// - anything else: no actuation.
    pub fn step(&self) -> Result<GkcLifecycle, GkcError> {
        let state = self.state();
        match state {
            GkcLifecycle::Active => {
                let DriveCommand {
                    throttle,
                    steering,
                    brake,
                } = self.link.latest();
                let mut act = lock_actuation(&self.actuation);
                if brake != 0.0 {
                    act.set_brake_cmd(brake)?;
                } else {
                    act.set_throttle_cmd(throttle)?;
                }
                act.set_steering_cmd(steering)?;
            }
            GkcLifecycle::Emergency => lock_actuation(&self.actuation).estop()?,
            _ => debug!(%state, "no actuation"),
        }
        Ok(state)
    }

    /// Call [`ControlLoop::step`] every `period` until `shutdown` is set or
    /// `max_cycles` cycles have run.  Bus errors are logged and the loop
    /// carries on.  Returns the number of cycles run.
    pub fn run(
        &self,
        clock: &dyn Clock,
        period: Duration,
        shutdown: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> u64 {
        info!(period_ms = period.as_millis() as u64, ?max_cycles, "control loop started");
        let mut cycles = 0;
        while !shutdown.load(Ordering::SeqCst) && max_cycles.is_none_or(|max| cycles < max) {
            if let Err(e) = self.step() {
                warn!(cycle = cycles, error = %e, "control cycle failed");
            }
            cycles += 1;
            clock.sleep(period);
        }
        info!(cycles, "control loop stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{VehicleHooks, share_actuation};
    use gkc_hal::{ActuationController, SimCanBus, VescCommand};
    use gkc_kernel::{AtomicIndicator, GkcStateMachine, ManualClock, RecordingReset};
    use gkc_types::{StateTransitionResult, VehicleConfig};

    struct Rig {
        control: ControlLoop<VehicleHooks<SimCanBus>, SimCanBus>,
        sm: SharedStateMachine<VehicleHooks<SimCanBus>>,
        link: Arc<CommandLink>,
        bus: SimCanBus,
    }

    fn rig() -> Rig {
        let bus = SimCanBus::new();
        let act = share_actuation(
            ActuationController::new(VehicleConfig::default(), bus.clone()).unwrap(),
        );
        let sm = GkcStateMachine::new(
            VehicleHooks::new(act.clone()),
            Arc::new(AtomicIndicator::new()),
            Arc::new(RecordingReset::new()),
        )
        .into_shared();
        let link = Arc::new(CommandLink::new(200, 500));
        let control = ControlLoop::new(sm.clone(), act, link.clone());
        Rig {
            control,
            sm,
            link,
            bus,
        }
    }

    fn commands(bus: &SimCanBus) -> Vec<(u8, VescCommand)> {
        bus.frames().iter().filter_map(VescCommand::decode).collect()
    }

    #[test]
    fn nothing_is_sent_unless_active() {
        let rig = rig();
        rig.link.submit(DriveCommand::new(5.0, 0.3, 0.0));
        assert_eq!(rig.control.step(), Ok(GkcLifecycle::Uninitialized));
        assert!(rig.bus.frames().is_empty());

        rig.sm.lock().unwrap().initialize();
        rig.bus.clear();
        assert_eq!(rig.control.step(), Ok(GkcLifecycle::Inactive));
        assert!(rig.bus.frames().is_empty());
    }

    #[test]
    fn active_forwards_bounded_throttle_and_steering() {
        let rig = rig();
        {
            let mut sm = rig.sm.lock().unwrap();
            sm.initialize();
            sm.activate();
        }
        rig.bus.clear();
        rig.link.submit(DriveCommand::new(50.0, 0.0, 0.0));

        assert_eq!(rig.control.step(), Ok(GkcLifecycle::Active));
        assert_eq!(
            commands(&rig.bus),
            vec![(0x01, VescCommand::Rpm(9465.0)), (0x02, VescCommand::Position(0.0))]
        );
    }

    #[test]
    fn brake_request_replaces_throttle() {
        let rig = rig();
        {
            let mut sm = rig.sm.lock().unwrap();
            sm.initialize();
            sm.activate();
        }
        rig.bus.clear();
        rig.link.submit(DriveCommand::new(3.0, 0.0, 0.5));

        rig.control.step().unwrap();
        let sent = commands(&rig.bus);
        assert_eq!(sent[0], (0x01, VescCommand::Position(0.5)));
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn estop_during_active_drops_the_cycle_throttle() {
        let rig = rig();
        {
            let mut sm = rig.sm.lock().unwrap();
            sm.initialize();
            sm.activate();
        }
        rig.link.submit(DriveCommand::new(3.0, 0.0, 0.0));
        rig.control.step().unwrap();

        assert_eq!(
            rig.sm.lock().unwrap().emergency_stop(),
            Ok(StateTransitionResult::Success)
        );
        rig.bus.clear();
        // Now Inactive: nothing is sent, and re-activation releases the latch.
        assert_eq!(rig.control.step(), Ok(GkcLifecycle::Inactive));
        assert!(rig.bus.frames().is_empty());

        rig.sm.lock().unwrap().activate();
        rig.control.step().unwrap();
        assert!(matches!(commands(&rig.bus)[0].1, VescCommand::Rpm(_)));
    }

    #[test]
    fn bus_errors_surface_from_step_but_not_from_run() {
        let rig = rig();
        {
            let mut sm = rig.sm.lock().unwrap();
            sm.initialize();
            sm.activate();
        }
        rig.bus.reject_next(1);
        assert!(matches!(
            rig.control.step(),
            Err(GkcError::BusWriteRejected { address: 0x01, .. })
        ));

        rig.bus.reject_next(1);
        let clock = ManualClock::new();
        let shutdown = AtomicBool::new(false);
        let cycles = rig
            .control
            .run(&clock, Duration::from_millis(20), &shutdown, Some(5));
        assert_eq!(cycles, 5);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn run_stops_on_shutdown_flag() {
        let rig = rig();
        let shutdown = AtomicBool::new(true);
        let cycles = rig
            .control
            .run(&ManualClock::new(), Duration::from_millis(20), &shutdown, None);
        assert_eq!(cycles, 0);
    }
}
