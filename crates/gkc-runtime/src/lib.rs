//! `gkc-runtime` – the controller's main loop and its wiring.
//!
//! # Modules
//!
//! - [`hooks`] – [`VehicleHooks`][hooks::VehicleHooks]: the kart's
//!   [`LifecycleHooks`][gkc_kernel::LifecycleHooks], driving the shared
//!   [`ActuationController`][gkc_hal::ActuationController].
//! - [`command_link`] – [`CommandLink`][command_link::CommandLink]: holds the
//!   latest [`DriveCommand`][command_link::DriveCommand] and is supervised by
//!   the watchdog; going silent triggers the emergency stop.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: forwards
//!   commands only while the vehicle is `Active`.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber (compact or JSON).

pub mod command_link;
pub mod control_loop;
pub mod hooks;
pub mod telemetry;

pub use command_link::{CommandLink, DriveCommand};
pub use control_loop::ControlLoop;
pub use hooks::{SharedActuation, VehicleHooks, share_actuation};
pub use telemetry::init_tracing;
