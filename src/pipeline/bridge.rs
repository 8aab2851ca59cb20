//! Thread boundary between the decode stages and the display consumer.
//!
//! Decoded pictures reach the consumer through the slot table's `Display`
//! queue; the stages only send a wake-up alongside. A [`DisplayFrame`] guard
//! owns the consumer's `DISPLAY` hold and drops it when the frame is done.

use crate::id::SlotIndex;
use crate::media::{FrameDescriptor, MediaBuffer};
use crate::slots::{BufferSlotTable, HoldFlags};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by the stage threads.
#[derive(Debug, Default)]
pub(crate) struct StageCounters {
    pub packets_received: AtomicU64,
    pub tasks_submitted: AtomicU64,
    pub parse_errors: AtomicU64,
    pub backpressure_waits: AtomicU64,
    pub info_changes: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_errored: AtomicU64,
    pub frames_displayed: AtomicU64,
}

impl StageCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            info_changes: self.info_changes.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_errored: self.frames_errored.load(Ordering::Relaxed),
            frames_displayed: self.frames_displayed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time pipeline statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Packets accepted from the caller
    pub packets_received: u64,
    /// Tasks handed from the parser to the hardware stage
    pub tasks_submitted: u64,
    /// Packets the parser rejected
    pub parse_errors: u64,
    /// Parse retries caused by slot exhaustion
    pub backpressure_waits: u64,
    /// Stream geometry changes acknowledged
    pub info_changes: u64,
    /// Pictures the hardware stage finished, errored or not
    pub frames_decoded: u64,
    /// Pictures finished with a hardware failure status
    pub frames_errored: u64,
    /// Pictures handed to the consumer
    pub frames_displayed: u64,
}

/// A decoded picture lent to the display consumer.
///
/// Dropping the guard clears the slot's `DISPLAY` hold, which returns the
/// buffer to the pool once no other holder remains.
pub struct DisplayFrame {
    slots: Arc<BufferSlotTable>,
    slot: SlotIndex,
    frame: FrameDescriptor,
    buffer: Option<MediaBuffer>,
}

impl DisplayFrame {
    pub(crate) fn new(slots: Arc<BufferSlotTable>, slot: SlotIndex) -> Option<Self> {
        let frame = match slots.payload(slot) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::error!(slot = %slot, "display slot has no payload");
                Self::release(&slots, slot);
                return None;
            }
            Err(e) => {
                tracing::error!(slot = %slot, "display slot lookup failed: {}", e);
                return None;
            }
        };
        let buffer = slots.buffer(slot).ok().flatten();
        Some(Self {
            slots,
            slot,
            frame,
            buffer,
        })
    }

    fn release(slots: &BufferSlotTable, slot: SlotIndex) {
        if let Err(e) = slots.clear_flag(slot, HoldFlags::DISPLAY) {
            tracing::warn!(slot = %slot, "failed to release display hold: {}", e);
        }
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.frame
    }

    pub fn buffer(&self) -> Option<MediaBuffer> {
        self.buffer
    }

    pub fn pts(&self) -> i64 {
        self.frame.pts
    }

    pub fn is_eos(&self) -> bool {
        self.frame.eos
    }

    pub fn is_errored(&self) -> bool {
        self.frame.is_errored()
    }
}

impl Drop for DisplayFrame {
    fn drop(&mut self) {
        Self::release(&self.slots, self.slot);
    }
}

impl std::fmt::Debug for DisplayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayFrame")
            .field("slot", &self.slot)
            .field("pts", &self.frame.pts)
            .field("eos", &self.frame.eos)
            .field("errinfo", &self.frame.errinfo)
            .finish()
    }
}
