//! VESC motor-controller wire protocol.
//!
//! Every command travels as an extended CAN frame whose identifier carries the
//! target controller address in the low byte and the command opcode above it:
//!
//! ```text
//! id = address | (opcode << 8)
//! ```
//!
//! Payloads are big-endian signed fixed-point numbers.  Each command has its
//! own scale factor; the fractional part left after scaling is truncated
//! toward zero and values beyond the integer range saturate.
//!
//! | Command | Opcode | Payload |
//! |---|---|---|
//! | duty | 0 | i32, ×100 000 |
//! | current | 1 | i32, ×1 000 (+ i16 off-delay ×1 000) |
//! | current brake | 2 | i32, ×1 000 |
//! | rpm | 3 | i32, ×1 |
//! | position | 4 | i32, ×1 000 000 |
//! | relative current | 10 | i32, ×100 000 (+ i16 off-delay ×1 000) |
//! | relative brake current | 11 | i32, ×100 000 |
//! | handbrake | 12 | i32, ×1 000 |
//! | relative handbrake | 13 | i32, ×100 000 |

use gkc_types::GkcError;
use tracing::{debug, warn};

use crate::can::{CanBus, CanFrame, MAX_PAYLOAD};

const DUTY_SCALE: f64 = 100_000.0;
const CURRENT_SCALE: f64 = 1_000.0;
const RPM_SCALE: f64 = 1.0;
const POSITION_SCALE: f64 = 1_000_000.0;
const RELATIVE_SCALE: f64 = 100_000.0;
const OFF_DELAY_SCALE: f64 = 1_000.0;

/// Command opcodes understood by the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketId {
    SetDuty = 0,
    SetCurrent = 1,
    SetCurrentBrake = 2,
    SetRpm = 3,
    SetPos = 4,
    SetCurrentRel = 10,
    SetCurrentBrakeRel = 11,
    SetCurrentHandbrake = 12,
    SetCurrentHandbrakeRel = 13,
}

impl PacketId {
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        let packet = match opcode {
            0 => PacketId::SetDuty,
            1 => PacketId::SetCurrent,
            2 => PacketId::SetCurrentBrake,
            3 => PacketId::SetRpm,
            4 => PacketId::SetPos,
            10 => PacketId::SetCurrentRel,
            11 => PacketId::SetCurrentBrakeRel,
            12 => PacketId::SetCurrentHandbrake,
            13 => PacketId::SetCurrentHandbrakeRel,
            _ => return None,
        };
        Some(packet)
    }

    pub fn opcode(self) -> u32 {
        self as u32
    }
}

/// Extended identifier addressing `packet` to the controller at `address`.
pub fn extended_id(address: u8, packet: PacketId) -> u32 {
    u32::from(address) | (packet.opcode() << 8)
}

/// A single motor-controller command in controller units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VescCommand {
    /// Duty cycle, -1.0 ..= 1.0.
    Duty(f32),
    /// Motor current in amperes.
    Current(f32),
    /// Motor current, keeping the current controller alive for `off_delay`
    /// seconds after it drops below the minimum current.
    CurrentOffDelay { current: f32, off_delay: f32 },
    /// Braking current in amperes.
    CurrentBrake(f32),
    /// Electrical RPM.
    Rpm(f32),
    /// Position in degrees.
    Position(f32),
    /// Current relative to the configured limit, -1.0 ..= 1.0.
    CurrentRel(f32),
    CurrentRelOffDelay { current_rel: f32, off_delay: f32 },
    /// Braking current relative to the configured limit, 0.0 ..= 1.0.
    CurrentBrakeRel(f32),
    Handbrake(f32),
    HandbrakeRel(f32),
}

impl VescCommand {
    pub fn packet_id(&self) -> PacketId {
        match self {
            VescCommand::Duty(_) => PacketId::SetDuty,
            VescCommand::Current(_) | VescCommand::CurrentOffDelay { .. } => PacketId::SetCurrent,
            VescCommand::CurrentBrake(_) => PacketId::SetCurrentBrake,
            VescCommand::Rpm(_) => PacketId::SetRpm,
            VescCommand::Position(_) => PacketId::SetPos,
            VescCommand::CurrentRel(_) | VescCommand::CurrentRelOffDelay { .. } => {
                PacketId::SetCurrentRel
            }
            VescCommand::CurrentBrakeRel(_) => PacketId::SetCurrentBrakeRel,
            VescCommand::Handbrake(_) => PacketId::SetCurrentHandbrake,
            VescCommand::HandbrakeRel(_) => PacketId::SetCurrentHandbrakeRel,
        }
    }

    /// Pack the command into a frame addressed to `address`.
    ///
    /// ```
    /// use gkc_hal::vesc::VescCommand;
    ///
    /// let frame = VescCommand::CurrentBrakeRel(1.0).encode(0x01);
    /// assert_eq!(frame.id(), 0x0B01);
    /// assert_eq!(frame.payload(), &100_000_i32.to_be_bytes());
    /// ```
    pub fn encode(&self, address: u8) -> CanFrame {
        let mut buf = PayloadBuffer::default();
        match *self {
            VescCommand::Duty(duty) => buf.append_scaled_i32(duty, DUTY_SCALE),
            VescCommand::Current(current) => buf.append_scaled_i32(current, CURRENT_SCALE),
            VescCommand::CurrentOffDelay { current, off_delay } => {
                buf.append_scaled_i32(current, CURRENT_SCALE);
                buf.append_scaled_i16(off_delay, OFF_DELAY_SCALE);
            }
            VescCommand::CurrentBrake(current) => buf.append_scaled_i32(current, CURRENT_SCALE),
            VescCommand::Rpm(rpm) => buf.append_scaled_i32(rpm, RPM_SCALE),
            VescCommand::Position(pos) => buf.append_scaled_i32(pos, POSITION_SCALE),
            VescCommand::CurrentRel(rel) => buf.append_scaled_i32(rel, RELATIVE_SCALE),
            VescCommand::CurrentRelOffDelay {
                current_rel,
                off_delay,
            } => {
                buf.append_scaled_i32(current_rel, RELATIVE_SCALE);
                buf.append_scaled_i16(off_delay, OFF_DELAY_SCALE);
            }
            VescCommand::CurrentBrakeRel(rel) => buf.append_scaled_i32(rel, RELATIVE_SCALE),
            VescCommand::Handbrake(current) => buf.append_scaled_i32(current, CURRENT_SCALE),
            VescCommand::HandbrakeRel(rel) => buf.append_scaled_i32(rel, RELATIVE_SCALE),
        }
        buf.into_frame(extended_id(address, self.packet_id()))
    }

    /// Recover the target address and command from a frame produced by
    /// [`VescCommand::encode`].  Returns `None` for unknown opcodes or payload
    /// lengths that do not match the opcode.
    pub fn decode(frame: &CanFrame) -> Option<(u8, VescCommand)> {
        let address = (frame.id() & 0xFF) as u8;
        let packet = PacketId::from_opcode((frame.id() >> 8) & 0xFF)?;
        let payload = frame.payload();
        let value = |scale: f64| -> Option<f32> {
            let raw = i32::from_be_bytes(payload.get(..4)?.try_into().ok()?);
            Some((f64::from(raw) / scale) as f32)
        };
        let off_delay = || -> Option<f32> {
            let raw = i16::from_be_bytes(payload.get(4..6)?.try_into().ok()?);
            Some((f64::from(raw) / OFF_DELAY_SCALE) as f32)
        };
        let command = match (packet, payload.len()) {
            (PacketId::SetDuty, 4) => VescCommand::Duty(value(DUTY_SCALE)?),
            (PacketId::SetCurrent, 4) => VescCommand::Current(value(CURRENT_SCALE)?),
            (PacketId::SetCurrent, 6) => VescCommand::CurrentOffDelay {
                current: value(CURRENT_SCALE)?,
                off_delay: off_delay()?,
            },
            (PacketId::SetCurrentBrake, 4) => VescCommand::CurrentBrake(value(CURRENT_SCALE)?),
            (PacketId::SetRpm, 4) => VescCommand::Rpm(value(RPM_SCALE)?),
            (PacketId::SetPos, 4) => VescCommand::Position(value(POSITION_SCALE)?),
            (PacketId::SetCurrentRel, 4) => VescCommand::CurrentRel(value(RELATIVE_SCALE)?),
            (PacketId::SetCurrentRel, 6) => VescCommand::CurrentRelOffDelay {
                current_rel: value(RELATIVE_SCALE)?,
                off_delay: off_delay()?,
            },
            (PacketId::SetCurrentBrakeRel, 4) => {
                VescCommand::CurrentBrakeRel(value(RELATIVE_SCALE)?)
            }
            (PacketId::SetCurrentHandbrake, 4) => VescCommand::Handbrake(value(CURRENT_SCALE)?),
            (PacketId::SetCurrentHandbrakeRel, 4) => {
                VescCommand::HandbrakeRel(value(RELATIVE_SCALE)?)
            }
            _ => return None,
        };
        Some((address, command))
    }
}

#[derive(Default)]
struct PayloadBuffer {
    bytes: [u8; MAX_PAYLOAD],
    index: usize,
}

impl PayloadBuffer {
    fn append_i16(&mut self, number: i16) {
        self.bytes[self.index..self.index + 2].copy_from_slice(&number.to_be_bytes());
        self.index += 2;
    }

    fn append_i32(&mut self, number: i32) {
        self.bytes[self.index..self.index + 4].copy_from_slice(&number.to_be_bytes());
        self.index += 4;
    }

    fn append_scaled_i16(&mut self, number: f32, scale: f64) {
        self.append_i16((f64::from(number) * scale) as i16);
    }

    fn append_scaled_i32(&mut self, number: f32, scale: f64) {
        self.append_i32((f64::from(number) * scale) as i32);
    }

    // Ids are built from a u8 address and an opcode below 0x100, and no
    // command writes more than six bytes.
    fn into_frame(self, id: u32) -> CanFrame {
        CanFrame::from_raw(id, self.bytes, self.index as u8)
    }
}

/// Owns the bus handle used to reach the motor controllers.
pub struct VescTransmitter<B: CanBus> {
    bus: B,
    bitrate: u32,
}

impl<B: CanBus> VescTransmitter<B> {
    /// Wrap `bus`, remembering `bitrate` so it can be restored after a reset.
    pub fn new(bus: B, bitrate: u32) -> Self {
        Self { bus, bitrate }
    }

    /// Encode `command` for the controller at `address` and transmit it.
    ///
    /// A rejected write resets the bus and restores its bit rate once; the
    /// frame itself is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GkcError::BusWriteRejected`] for the dropped frame, or the
    /// bus error raised while restoring the bit rate.
    pub fn send(&mut self, address: u8, command: &VescCommand) -> Result<(), GkcError> {
        let frame = command.encode(address);
        match self.bus.write(&frame) {
            Ok(()) => {
                debug!(id = frame.id(), ?command, "frame sent");
                Ok(())
            }
            Err(e) => {
                warn!(id = frame.id(), error = %e, bitrate = self.bitrate, "bus write rejected; resetting bus");
                self.bus.reset();
                self.bus.set_bitrate(self.bitrate)?;
                Err(GkcError::BusWriteRejected {
                    address,
                    opcode: command.packet_id().opcode(),
                })
            }
        }
    }
}
