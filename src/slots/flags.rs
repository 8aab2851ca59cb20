//! Hold flags and named queues of a buffer slot.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Independent holds on one slot. A slot is reusable only when every
    /// bit is clear and it sits in no queue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HoldFlags: u8 {
        /// Claimed by the codec for the picture being decoded.
        const CODEC_USE = 1 << 0;
        /// Kept by the codec as a reference picture.
        const CODEC_REFERENCE = 1 << 1;
        /// Read by the hardware stage.
        const HAL_INPUT = 1 << 2;
        /// Written by the hardware stage.
        const HAL_OUTPUT = 1 << 3;
        /// Handed to, or queued for, the display consumer.
        const DISPLAY = 1 << 4;
    }
}

/// Named FIFO queues a slot can sit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotQueue {
    Output,
    Display,
    Deinterlace,
    ColorConvert,
}

impl SlotQueue {
    pub const ALL: [SlotQueue; 4] = [
        SlotQueue::Output,
        SlotQueue::Display,
        SlotQueue::Deinterlace,
        SlotQueue::ColorConvert,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub(crate) fn bit(self) -> QueueSet {
        QueueSet::from_bits_retain(1 << self.index())
    }
}

bitflags! {
    /// Membership of one slot across the named queues.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueSet: u8 {
        const OUTPUT = 1 << 0;
        const DISPLAY = 1 << 1;
        const DEINTERLACE = 1 << 2;
        const COLOR_CONVERT = 1 << 3;
    }
}

impl QueueSet {
    pub fn queues(self) -> impl Iterator<Item = SlotQueue> {
        SlotQueue::ALL
            .into_iter()
            .filter(move |queue| self.contains(queue.bit()))
    }
}
