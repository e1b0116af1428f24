//! In-process CAN bus for CI/CD testing without physical hardware.
//!
//! [`SimCanBus`] records the most recent accepted frames (a bounded history
//! plus a running count) and can be told to reject the next few writes, which
//! is how the bus-reset recovery path is exercised.
//! Clones share the same underlying state: hand one clone to the
//! [`VescTransmitter`][crate::vesc::VescTransmitter] and keep another to
//! inspect what was sent.
//!
//! # Example
//!
//! ```rust
//! use gkc_hal::sim::SimCanBus;
//! use gkc_hal::vesc::{VescCommand, VescTransmitter};
//!
//! let bus = SimCanBus::new();
//! let mut tx = VescTransmitter::new(bus.clone(), 1_000_000);
//! tx.send(0x01, &VescCommand::Duty(0.1)).expect("sim bus accepts writes");
//!
//! assert_eq!(bus.frames().len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gkc_types::GkcError;
use tracing::debug;

use crate::can::{CanBus, CanFrame};

/// Frames kept by [`SimCanBus::new`].
pub const DEFAULT_HISTORY: usize = 1024;

#[derive(Default)]
struct SimBusState {
    frames: VecDeque<CanFrame>,
    history: usize,
    sent: u64,
    reject_remaining: usize,
    resets: usize,
    bitrate: Option<u32>,
}

/// A simulated CAN controller.  Accepts every write unless a rejection has
/// been scheduled with [`SimCanBus::reject_next`].
#[derive(Clone)]
pub struct SimCanBus {
    state: Arc<Mutex<SimBusState>>,
}

impl Default for SimCanBus {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl SimCanBus {
    /// A bus keeping the last [`DEFAULT_HISTORY`] frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus keeping at most the last `history` accepted frames.
    pub fn with_history(history: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimBusState {
                history,
                ..SimBusState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the next `count` writes.
    pub fn reject_next(&self, count: usize) {
        self.lock().reject_remaining = count;
    }

    /// The retained frames, oldest first.
    pub fn frames(&self) -> Vec<CanFrame> {
        self.lock().frames.iter().copied().collect()
    }

    pub fn last_frame(&self) -> Option<CanFrame> {
        self.lock().frames.back().copied()
    }

    /// Number of frames accepted since creation, including those no longer
    /// retained.
    pub fn sent_count(&self) -> u64 {
        self.lock().sent
    }

    /// Forget retained frames.  The sent count and the reset and bit-rate
    /// bookkeeping are kept.
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    pub fn reset_count(&self) -> usize {
        self.lock().resets
    }

    /// Currently configured bit rate; `None` after a reset until reconfigured.
    pub fn bitrate(&self) -> Option<u32> {
        self.lock().bitrate
    }
}

impl CanBus for SimCanBus {
    fn write(&mut self, frame: &CanFrame) -> Result<(), GkcError> {
        let mut state = self.lock();
        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            return Err(GkcError::BusFault("simulated write rejection".into()));
        }
        state.sent += 1;
        if state.history == 0 {
            return Ok(());
        }
        if state.frames.len() == state.history {
            state.frames.pop_front();
        }
        state.frames.push_back(*frame);
        Ok(())
    }

    fn reset(&mut self) {
        let mut state = self.lock();
        state.resets += 1;
        state.bitrate = None;
        debug!(resets = state.resets, "sim bus reset");
    }

    fn set_bitrate(&mut self, bitrate: u32) -> Result<(), GkcError> {
        self.lock().bitrate = Some(bitrate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_recorded_frames() {
        let bus = SimCanBus::new();
        let mut writer = bus.clone();
        let frame = CanFrame::extended(0x0301, &[0, 0, 0, 1]).unwrap();
        writer.write(&frame).unwrap();
        assert_eq!(bus.frames(), vec![frame]);
        assert_eq!(bus.last_frame(), Some(frame));
    }

    #[test]
    fn scheduled_rejections_are_consumed() {
        let mut bus = SimCanBus::new();
        bus.reject_next(2);
        let frame = CanFrame::extended(0x1, &[]).unwrap();
        assert!(bus.write(&frame).is_err());
        assert!(bus.write(&frame).is_err());
        assert!(bus.write(&frame).is_ok());
        assert_eq!(bus.frames().len(), 1);
    }

    #[test]
    fn reset_clears_bitrate_until_reconfigured() {
        let mut bus = SimCanBus::new();
        bus.set_bitrate(250_000).unwrap();
        bus.reset();
        assert_eq!(bus.bitrate(), None);
        assert_eq!(bus.reset_count(), 1);
        bus.set_bitrate(250_000).unwrap();
        assert_eq!(bus.bitrate(), Some(250_000));
    }

    #[test]
    fn history_is_capped_while_sent_count_keeps_growing() {
        let mut bus = SimCanBus::with_history(3);
        for i in 0..10u8 {
            bus.write(&CanFrame::extended(0x0301, &[i]).unwrap()).unwrap();
        }
        assert_eq!(bus.sent_count(), 10);
        let kept: Vec<u8> = bus.frames().iter().map(|f| f.payload()[0]).collect();
        assert_eq!(kept, vec![7, 8, 9]);
        assert_eq!(bus.last_frame().unwrap().payload(), &[9]);
    }

    #[test]
    fn rejected_writes_are_not_counted() {
        let mut bus = SimCanBus::new();
        bus.reject_next(1);
        let frame = CanFrame::extended(0x1, &[]).unwrap();
        assert!(bus.write(&frame).is_err());
        bus.write(&frame).unwrap();
        assert_eq!(bus.sent_count(), 1);
    }

    #[test]
    fn zero_history_only_counts() {
        let mut bus = SimCanBus::with_history(0);
        bus.write(&CanFrame::extended(0x1, &[]).unwrap()).unwrap();
        assert!(bus.frames().is_empty());
        assert_eq!(bus.sent_count(), 1);
    }

    #[test]
    fn clear_keeps_reset_bookkeeping() {
        let mut bus = SimCanBus::new();
        bus.write(&CanFrame::extended(0x1, &[]).unwrap()).unwrap();
        bus.reset();
        bus.clear();
        assert!(bus.frames().is_empty());
        assert_eq!(bus.sent_count(), 1);
        assert_eq!(bus.reset_count(), 1);
    }
}
