//! `gkc-hal` – actuation path from physical commands to CAN frames.
//!
//! # Modules
//!
//! - [`bounds`] – [`clamp`][bounds::clamp]: the boundedness utility applied
//!   before any command is encoded.
//! - [`can`] – [`CanFrame`][can::CanFrame] and the [`CanBus`][can::CanBus]
//!   transport trait implemented by bus drivers.
//! - [`vesc`] – [`VescCommand`][vesc::VescCommand]: the motor controller's wire
//!   protocol (extended IDs, big-endian fixed-point payloads) and the
//!   [`VescTransmitter`][vesc::VescTransmitter] that owns the bus handle.
//! - [`actuation`] – [`ActuationController`][actuation::ActuationController]:
//!   throttle, steering, brake, and emergency-stop commands in physical units.
//! - [`sim`] – [`SimCanBus`][sim::SimCanBus]: an in-process bus that records
//!   frames, for tests and for running the stack without hardware.

pub mod actuation;
pub mod bounds;
pub mod can;
pub mod sim;
pub mod vesc;

pub use actuation::ActuationController;
pub use bounds::clamp;
pub use can::{CanBus, CanFrame};
pub use sim::SimCanBus;
pub use vesc::{PacketId, VescCommand, VescTransmitter};
