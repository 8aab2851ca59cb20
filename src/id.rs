//! Identity types for the runtime.
//!
//! Slot and task ids are newtypes over `u32` that serve as direct array
//! indices into their owning table or queue, providing O(1) lookup.
//! Bag ids are process-unique and never reused.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into `BufferSlotTable` slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    pub const INVALID: SlotIndex = SlotIndex(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "SlotIndex(INVALID)")
        } else {
            write!(f, "SlotIndex({})", self.0)
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index of a token inside its `TaskQueue`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskIndex(pub u32);

impl TaskIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TaskIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskIndex({})", self.0)
    }
}

/// Process-unique attachment bag id, assigned in acquisition order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BagId(pub u64);

impl fmt::Debug for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BagId({})", self.0)
    }
}

impl fmt::Display for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
