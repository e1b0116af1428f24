//! `gkc-kernel` – Safety supervision
//!
//! The go-kart controller's only safety net.  It does not drive; it decides
//! whether driving is allowed and notices when something stops responding.
//!
//! # Modules
//!
//! - [`state_machine`] – [`GkcStateMachine`][state_machine::GkcStateMachine]:
//!   the lifecycle (`Uninitialized → Inactive ⇄ Active`, `Emergency`) with its
//!   transition legality and result algebra.  Vehicle-specific behaviour is
//!   plugged in through [`LifecycleHooks`][state_machine::LifecycleHooks].
//! - [`watchable`] – the [`Watchable`][watchable::Watchable] contract for any
//!   subsystem whose liveness matters, plus the reusable
//!   [`WatchableCore`][watchable::WatchableCore].
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: accumulates inactivity
//!   per watched subsystem on a background thread and fires their triggers;
//!   resets the controller if the supervision loop itself goes quiet.
//! - [`clock`] – [`Clock`][clock::Clock]: injected time source so watchdog
//!   timing can be tested without wall-clock sleeps.
//! - [`reset`] – [`ControllerReset`][reset::ControllerReset]: the
//!   unconditional controller reset primitive.

pub mod clock;
pub mod reset;
pub mod state_machine;
pub mod watchable;
pub mod watchdog;

pub use clock::{Clock, ManualClock, SystemClock};
pub use reset::{ControllerReset, ProcessReset, RecordingReset};
pub use state_machine::{
    AtomicIndicator, GkcStateMachine, LifecycleHooks, ReadinessIndicator, SharedStateMachine,
};
pub use watchable::{Watchable, WatchableCore};
pub use watchdog::{SupervisorHandle, Watchdog};
