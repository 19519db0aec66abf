//! Priority bands ("lanes").
//!
//! A lane is a single bit; a set of pending work is the union of its lanes.
//! Lower bits are higher priority, so the highest-priority lane of a set is
//! its lowest set bit.

use std::fmt;

use crate::error::ReconcileError;
use crate::platform::SchedulerPriority;

bitflags::bitflags! {
    /// Set of priority bands.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Flushed in a microtask right after the triggering call returns.
        const SYNC = 0b0000_0001;
        /// Continuous user input (drag, scroll).
        const INPUT_CONTINUOUS = 0b0000_0010;
        /// Regular updates scheduled as macrotasks.
        const DEFAULT = 0b0000_0100;
        /// Non-urgent transitions.
        const TRANSITION = 0b0000_1000;
        /// Work that only runs when nothing else is pending.
        const IDLE = 0b0001_0000;
    }
}

/// A single band. Kept as an alias so signatures say which one they expect.
pub type Lane = Lanes;

/// The empty set.
pub const NO_LANES: Lanes = Lanes::empty();

/// Lanes that must never be time sliced.
const BLOCKING_LANES: Lanes = Lanes::SYNC.union(Lanes::INPUT_CONTINUOUS);

impl Lanes {
    /// Resolves raw bits into a single known band.
    pub fn lane_from_bits(bits: u32) -> Result<Lane, ReconcileError> {
        match Lanes::from_bits(bits) {
            Some(lane) if lane.is_single_lane() => Ok(lane),
            _ => Err(ReconcileError::UnknownLane { bits }),
        }
    }

    pub fn is_single_lane(self) -> bool {
        self.bits().count_ones() == 1
    }

    /// Lowest set bit, or the empty set.
    pub fn highest_priority_lane(self) -> Lane {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    pub fn includes_blocking_lane(self) -> bool {
        self.intersects(BLOCKING_LANES)
    }

    /// Maps a band to the scheduler's coarser priority levels.
    pub fn to_scheduler_priority(self) -> SchedulerPriority {
        let lane = self.highest_priority_lane();
        if lane == Lanes::SYNC {
            SchedulerPriority::Immediate
        } else if lane == Lanes::INPUT_CONTINUOUS {
            SchedulerPriority::UserBlocking
        } else if lane == Lanes::DEFAULT {
            SchedulerPriority::Normal
        } else if lane == Lanes::TRANSITION {
            SchedulerPriority::Low
        } else {
            SchedulerPriority::Idle
        }
    }
}

/// Picks the lanes the next render works on: the highest-priority pending band.
pub fn next_lanes(pending: Lanes) -> Lanes {
    pending.highest_priority_lane()
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NoLanes");
        }
        bitflags::parser::to_writer(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_is_lowest_bit() {
        let pending = Lanes::DEFAULT | Lanes::IDLE | Lanes::INPUT_CONTINUOUS;
        assert_eq!(pending.highest_priority_lane(), Lanes::INPUT_CONTINUOUS);
        assert_eq!(NO_LANES.highest_priority_lane(), NO_LANES);
    }

    #[test]
    fn unknown_lane_bits_are_rejected() {
        assert_eq!(Lanes::lane_from_bits(0b100), Ok(Lanes::DEFAULT));
        assert_eq!(
            Lanes::lane_from_bits(0b110),
            Err(ReconcileError::UnknownLane { bits: 0b110 })
        );
        assert_eq!(
            Lanes::lane_from_bits(1 << 20),
            Err(ReconcileError::UnknownLane { bits: 1 << 20 })
        );
        assert_eq!(
            Lanes::lane_from_bits(0),
            Err(ReconcileError::UnknownLane { bits: 0 })
        );
    }

    #[test]
    fn sync_and_input_lanes_block_time_slicing() {
        assert!(Lanes::SYNC.includes_blocking_lane());
        assert!((Lanes::DEFAULT | Lanes::INPUT_CONTINUOUS).includes_blocking_lane());
        assert!(!Lanes::DEFAULT.includes_blocking_lane());
        assert_eq!(
            Lanes::TRANSITION.to_scheduler_priority(),
            SchedulerPriority::Low
        );
    }
}
