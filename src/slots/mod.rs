//! Shared buffer slots.
//!
//! A [`BufferSlotTable`] owns the bookkeeping for a bounded pool of large
//! frame buffers. Payloads move between decode, hardware and display by slot
//! index, never by copy.
//!
//! ```text
//! get_unused ──► CODEC_USE ──► HAL_OUTPUT ──► DISPLAY + Display queue
//!      ▲                                              │
//!      └──────────── all holds clear, no queue ◄──────┘
//! ```

pub mod flags;
pub mod frame_info;
pub mod table;

pub use flags::{HoldFlags, QueueSet, SlotQueue};
pub use frame_info::{align_up, FrameInfo, HOR_ALIGN, VER_ALIGN};
pub use table::{BufferSlotTable, SlotSnapshot, SlotTableSnapshot};

use crate::id::SlotIndex;
use thiserror::Error;

/// Errors returned by slot table operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {index} out of range (capacity {capacity})")]
    InvalidIndex { index: SlotIndex, capacity: usize },

    #[error("No free buffer slot")]
    NoFreeSlot,

    #[error("Invalid slot table capacity {0}")]
    InvalidCapacity(usize),

    #[error("Slot {index} is already in the {queue:?} queue")]
    AlreadyQueued { index: SlotIndex, queue: SlotQueue },

    #[error("{0} slots beyond the new capacity are still in use")]
    SlotsInUse(usize),
}
