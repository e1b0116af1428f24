//! [`ActuationController`] – physical commands in, motor-controller frames out.
//!
//! The controller does not consult the lifecycle state machine; callers only
//! invoke it once they have confirmed the vehicle is `Active` (the emergency
//! stop being the exception, which is legal at any time).
//!
//! # Emergency stop latch
//!
//! [`ActuationController::estop`] latches.  Until
//! [`ActuationController::release_estop`] is called every throttle command is
//! dropped, so an emergency stop always wins over throttle requests issued
//! later in the same control cycle.

use gkc_types::{GkcError, VehicleConfig};
use tracing::{debug, warn};

use crate::bounds::clamp;
use crate::can::CanBus;
use crate::vesc::{VescCommand, VescTransmitter};

/// Relative brake current sent by [`ActuationController::estop`].
pub const ESTOP_BRAKE_REL: f32 = 1.0;

/// Converts throttle, steering, and brake commands to VESC frames.
///
/// # Example
///
/// ```
/// use gkc_hal::{ActuationController, SimCanBus};
/// use gkc_hal::vesc::VescCommand;
/// use gkc_types::VehicleConfig;
///
/// let bus = SimCanBus::new();
/// let mut act = ActuationController::new(VehicleConfig::default(), bus.clone()).unwrap();
///
/// // 50 m/s is clamped to the 10 m/s forward bound before conversion.
/// act.set_throttle_cmd(50.0).unwrap();
/// let (_, cmd) = VescCommand::decode(&bus.last_frame().unwrap()).unwrap();
/// assert_eq!(cmd, VescCommand::Rpm(9465.0));
/// ```
pub struct ActuationController<B: CanBus> {
    config: VehicleConfig,
    tx: VescTransmitter<B>,
    estop_latched: bool,
}

impl<B: CanBus> ActuationController<B> {
    /// Build a controller over `bus` after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GkcError::InvalidConfig`] when the configuration is rejected.
    pub fn new(config: VehicleConfig, bus: B) -> Result<Self, GkcError> {
        config.validate()?;
        let tx = VescTransmitter::new(bus, config.can_bitrate);
        Ok(Self {
            config,
            tx,
            estop_latched: false,
        })
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    /// Bound `speed_m_per_s` to `[-max_reverse_speed, max_forward_speed]`.
    /// Non-finite input bounds to a standstill.
    pub fn bound_speed(&self, speed_m_per_s: f32) -> f32 {
        if !speed_m_per_s.is_finite() {
            warn!(speed = speed_m_per_s, "non-finite throttle command; using 0");
            return 0.0;
        }
        clamp(
            speed_m_per_s,
            -self.config.max_reverse_speed,
            self.config.max_forward_speed,
        )
    }

    /// Electrical RPM of the drive motor at `speed_m_per_s` wheel speed.
    pub fn speed_to_erpm(&self, speed_m_per_s: f32) -> f32 {
        speed_m_per_s * self.config.motor_poles * self.config.gear_ratio
            / self.config.wheel_circumference
            * 60.0
    }

    /// Command the drive motor to `speed_m_per_s` (bounded).
    ///
    /// Dropped without error while the emergency-stop latch is set.
    pub fn set_throttle_cmd(&mut self, speed_m_per_s: f32) -> Result<(), GkcError> {
        if self.estop_latched {
            debug!(speed = speed_m_per_s, "throttle dropped; emergency stop latched");
            return Ok(());
        }
        let bounded = self.bound_speed(speed_m_per_s);
        let erpm = self.speed_to_erpm(bounded).trunc();
        debug!(requested = speed_m_per_s, bounded, erpm, "throttle");
        self.tx
            .send(self.config.drive_address, &VescCommand::Rpm(erpm))
    }

    /// Command the steering motor to `angle_rad`.
    ///
    /// No range limiting happens here; the steering range is enforced
    /// upstream and by the mechanical end stops.
    pub fn set_steering_cmd(&mut self, angle_rad: f32) -> Result<(), GkcError> {
        let degrees = angle_rad.to_degrees();
        debug!(angle_rad, degrees, "steering");
        self.tx
            .send(self.config.steer_address, &VescCommand::Position(degrees))
    }

    /// Forward `value` to the drive controller as a brake position.  Units are
    /// defined by the motor controller configuration.
    pub fn set_brake_cmd(&mut self, value: f32) -> Result<(), GkcError> {
        debug!(value, "brake");
        self.tx
            .send(self.config.drive_address, &VescCommand::Position(value))
    }

    /// Apply full relative braking current on the drive motor and latch the
    /// emergency stop.
    pub fn estop(&mut self) -> Result<(), GkcError> {
        self.estop_latched = true;
        warn!(address = self.config.drive_address, "emergency stop");
        self.tx.send(
            self.config.drive_address,
            &VescCommand::CurrentBrakeRel(ESTOP_BRAKE_REL),
        )
    }

    /// Clear the emergency-stop latch so throttle commands are sent again.
    pub fn release_estop(&mut self) {
        if self.estop_latched {
            debug!("emergency stop latch released");
        }
        self.estop_latched = false;
    }

    pub fn is_estop_latched(&self) -> bool {
        self.estop_latched
    }
}
