//! `gkc-types` – shared vocabulary of the go-kart controller.
//!
//! Lifecycle states, transition results, the workspace error type, and the
//! build-time vehicle and watchdog configuration live here so that the HAL,
//! the kernel, and the runtime agree on them without depending on each other.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational state of the vehicle controller.
///
/// `Initializing` only exists inside a single `initialize()` /
/// `reinitialize()` call and is never observed between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GkcLifecycle {
    Uninitialized,
    Initializing,
    Inactive,
    Active,
    Emergency,
}

impl std::fmt::Display for GkcLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GkcLifecycle::Uninitialized => "uninitialized",
            GkcLifecycle::Initializing => "initializing",
            GkcLifecycle::Inactive => "inactive",
            GkcLifecycle::Active => "active",
            GkcLifecycle::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// Outcome of a lifecycle transition attempt, and of every vehicle hook.
///
/// `Error` is only fatal when returned by the emergency-stop hook; everywhere
/// else it is treated like any other hook failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateTransitionResult {
    Success,
    EmergencyStop,
    FailureInvalidTransition,
    Error,
}

/// Errors raised anywhere in the controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GkcError {
    #[error("Bus write rejected for controller {address:#04x} opcode {opcode}")]
    BusWriteRejected { address: u8, opcode: u32 },

    #[error("Bus Fault: {0}")]
    BusFault(String),

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    /// A lifecycle transition needed by the caller did not succeed.
    #[error("Lifecycle Error: {0}")]
    Lifecycle(String),

    /// The controller reset primitive has been invoked.  On hardware this is
    /// never observed; under test it stands in for the restart.
    #[error("Controller Reset: {0}")]
    FatalReset(String),
}

/// Physical constants of the kart and its motor controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Upper throttle bound in m/s.
    pub max_forward_speed: f32,
    /// Magnitude of the lower throttle bound in m/s.
    pub max_reverse_speed: f32,
    pub motor_poles: f32,
    /// Motor turns per wheel turn.
    pub gear_ratio: f32,
    /// Wheel circumference in metres.
    pub wheel_circumference: f32,
    /// Bus address of the drive motor controller.
    pub drive_address: u8,
    /// Bus address of the steering motor controller.
    pub steer_address: u8,
    /// CAN bit rate restored after a bus reset.
    pub can_bitrate: u32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            max_forward_speed: 10.0,
            max_reverse_speed: 2.0,
            motor_poles: 5.0,
            gear_ratio: 59.0 / 22.0,
            wheel_circumference: 0.85,
            drive_address: 0x01,
            steer_address: 0x02,
            can_bitrate: 1_000_000,
        }
    }
}

impl VehicleConfig {
    /// Reject configurations that would make the throttle bound or the ERPM
    /// conversion meaningless.
    pub fn validate(&self) -> Result<(), GkcError> {
        let positive = [
            ("max_forward_speed", self.max_forward_speed),
            ("max_reverse_speed", self.max_reverse_speed),
            ("motor_poles", self.motor_poles),
            ("gear_ratio", self.gear_ratio),
            ("wheel_circumference", self.wheel_circumference),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(GkcError::InvalidConfig(format!(
                    "{field} must be a positive number, got {value}"
                )));
            }
        }
        if self.drive_address == self.steer_address {
            return Err(GkcError::InvalidConfig(format!(
                "drive and steer controllers share address {:#04x}",
                self.drive_address
            )));
        }
        if self.can_bitrate == 0 {
            return Err(GkcError::InvalidConfig("can_bitrate must be non-zero".into()));
        }
        Ok(())
    }
}

/// Timing of the watchdog and of the supervised command link, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the supervision loop must show activity.
    pub update_interval_ms: u32,
    /// Grace period before the watchdog's own trigger resets the controller.
    pub max_inactivity_limit_ms: u32,
    /// Supervision loop cadence.
    pub wakeup_every_ms: u32,
    pub link_update_interval_ms: u32,
    pub link_max_inactivity_limit_ms: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            max_inactivity_limit_ms: 3000,
            wakeup_every_ms: 100,
            link_update_interval_ms: 200,
            link_max_inactivity_limit_ms: 500,
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<(), GkcError> {
        if self.wakeup_every_ms == 0 {
            return Err(GkcError::InvalidConfig("wakeup_every_ms must be non-zero".into()));
        }
        if self.max_inactivity_limit_ms < self.update_interval_ms {
            return Err(GkcError::InvalidConfig(format!(
                "max_inactivity_limit_ms ({}) is shorter than update_interval_ms ({})",
                self.max_inactivity_limit_ms, self.update_interval_ms
            )));
        }
        if self.link_max_inactivity_limit_ms < self.link_update_interval_ms {
            return Err(GkcError::InvalidConfig(format!(
                "link_max_inactivity_limit_ms ({}) is shorter than link_update_interval_ms ({})",
                self.link_max_inactivity_limit_ms, self.link_update_interval_ms
            )));
        }
        Ok(())
    }
}
