//! CAN frame type and the bus transport trait.
//!
//! Bus drivers implement [`CanBus`] and are handed to a
//! [`VescTransmitter`][crate::vesc::VescTransmitter].  Nothing above the HAL
//! talks to a bus directly, so the hardware driver and the simulated bus are
//! interchangeable.

use gkc_types::GkcError;

/// Largest payload a classic CAN frame can carry.
pub const MAX_PAYLOAD: usize = 8;

/// Mask of the 29 bits available to an extended identifier.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// An extended-ID data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    data: [u8; MAX_PAYLOAD],
    len: u8,
}

impl CanFrame {
    /// Build an extended data frame.
    ///
    /// # Errors
    ///
    /// Returns [`GkcError::BusFault`] when `id` does not fit in 29 bits or the
    /// payload is longer than [`MAX_PAYLOAD`] bytes.
    pub fn extended(id: u32, payload: &[u8]) -> Result<Self, GkcError> {
        if id & !EXTENDED_ID_MASK != 0 {
            return Err(GkcError::BusFault(format!(
                "identifier {id:#x} exceeds 29 bits"
            )));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(GkcError::BusFault(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD}",
                payload.len()
            )));
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            data,
            len: payload.len() as u8,
        })
    }

    pub(crate) fn from_raw(id: u32, data: [u8; MAX_PAYLOAD], len: u8) -> Self {
        Self { id, data, len }
    }

    /// The 29-bit extended identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The meaningful bytes of the payload.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A CAN controller able to send extended frames.
pub trait CanBus: Send {
    /// Queue `frame` for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`GkcError::BusFault`] when the controller rejects the write.
    fn write(&mut self, frame: &CanFrame) -> Result<(), GkcError>;

    /// Reset the controller peripheral.  Clears its error state and its bit
    /// rate configuration.
    fn reset(&mut self);

    /// Configure the bit rate in bit/s.
    fn set_bitrate(&mut self, bitrate: u32) -> Result<(), GkcError>;
}
