//! Buffer slot table.
//!
//! Tracks a fixed set of large media buffers shared by the codec, the
//! hardware stage and the display consumer. Each slot carries an independent
//! hold bitmask plus membership in named FIFO queues; the slot becomes
//! reusable only when both are empty.
//!
//! The table is bookkeeping, not a lock over buffer contents: who may touch
//! a payload is agreed through the hold flags. A single internal mutex keeps
//! the bookkeeping itself consistent across threads.

use super::flags::{HoldFlags, QueueSet, SlotQueue};
use super::frame_info::FrameInfo;
use super::SlotError;
use crate::id::SlotIndex;
use crate::media::{FrameDescriptor, MediaBuffer};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on one sleep inside `wait_unused`.
const RELEASE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Default)]
struct BufferSlot {
    flags: HoldFlags,
    queues: QueueSet,
    payload: Option<FrameDescriptor>,
    buffer: Option<MediaBuffer>,
    eos: bool,
}

impl BufferSlot {
    #[inline]
    fn is_unused(&self) -> bool {
        self.flags.is_empty() && self.queues.is_empty()
    }

    fn release_payload(&mut self) {
        self.payload = None;
        self.buffer = None;
        self.eos = false;
    }
}

#[derive(Default)]
struct SlotTableInner {
    slots: Vec<BufferSlot>,
    queues: [VecDeque<SlotIndex>; SlotQueue::COUNT],
    info: Option<FrameInfo>,
    pending_info: Option<FrameInfo>,
    changed: bool,
}

impl SlotTableInner {
    fn slot(&self, index: SlotIndex) -> Result<&BufferSlot, SlotError> {
        self.slots.get(index.index()).ok_or(SlotError::InvalidIndex {
            index,
            capacity: self.slots.len(),
        })
    }

    fn slot_mut(&mut self, index: SlotIndex) -> Result<&mut BufferSlot, SlotError> {
        let capacity = self.slots.len();
        self.slots
            .get_mut(index.index())
            .ok_or(SlotError::InvalidIndex { index, capacity })
    }
}

/// Per-slot entry of a [`SlotTableSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub index: u32,
    pub flags: u8,
    pub queues: Vec<SlotQueue>,
    pub has_payload: bool,
    pub has_buffer: bool,
    pub eos: bool,
}

/// Serializable view of the whole table, used for debug dumps.
#[derive(Debug, Clone, Serialize)]
pub struct SlotTableSnapshot {
    pub capacity: usize,
    pub used: usize,
    pub changed: bool,
    pub info: Option<FrameInfo>,
    pub queue_lengths: Vec<(SlotQueue, usize)>,
    pub slots: Vec<SlotSnapshot>,
}

/// Fixed-capacity table of buffer slots with multi-holder bookkeeping.
pub struct BufferSlotTable {
    inner: Mutex<SlotTableInner>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl Default for BufferSlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSlotTable {
    /// Create an empty table. Call [`setup`](Self::setup) before use.
    pub fn new() -> Self {
        let (release_tx, release_rx) = bounded(1);
        Self {
            inner: Mutex::new(SlotTableInner::default()),
            release_tx,
            release_rx,
        }
    }

    /// Create a table already set up with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, SlotError> {
        let table = Self::new();
        table.setup(capacity)?;
        Ok(table)
    }

    fn lock(&self) -> MutexGuard<'_, SlotTableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_release(&self) {
        // A pending wake-up already covers this release.
        let _ = self.release_tx.try_send(());
    }

    /// Fix the slot count. Calling again with the same count is a no-op.
    /// Growing keeps existing slots; shrinking requires the dropped slots to
    /// be unused.
    pub fn setup(&self, capacity: usize) -> Result<(), SlotError> {
        if capacity == 0 {
            return Err(SlotError::InvalidCapacity(capacity));
        }

        let mut inner = self.lock();
        let current = inner.slots.len();

        if capacity == current {
            tracing::trace!("slot table setup unchanged at {} slots", capacity);
            return Ok(());
        }

        if capacity < current {
            let busy = inner.slots[capacity..]
                .iter()
                .filter(|slot| !slot.is_unused())
                .count();
            if busy > 0 {
                return Err(SlotError::SlotsInUse(busy));
            }
        }

        inner.slots.resize_with(capacity, BufferSlot::default);
        tracing::debug!("slot table resized {} -> {} slots", current, capacity);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Claim a slot with no holds and no queue membership.
    ///
    /// The returned slot carries `CODEC_USE`. Exhaustion is reported as
    /// [`SlotError::NoFreeSlot`] and is backpressure, not a failure.
    pub fn get_unused(&self) -> Result<SlotIndex, SlotError> {
        let mut inner = self.lock();
        if inner.slots.is_empty() {
            return Err(SlotError::InvalidCapacity(0));
        }

        let position = inner
            .slots
            .iter()
            .position(BufferSlot::is_unused)
            .ok_or(SlotError::NoFreeSlot)?;

        let slot = &mut inner.slots[position];
        slot.release_payload();
        slot.flags = HoldFlags::CODEC_USE;

        let index = SlotIndex(position as u32);
        tracing::trace!(slot = %index, "slot claimed");
        Ok(index)
    }

    /// [`get_unused`](Self::get_unused), waiting up to `timeout` for a slot to
    /// be released.
    pub fn wait_unused(&self, timeout: Duration) -> Result<SlotIndex, SlotError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get_unused() {
                Err(SlotError::NoFreeSlot) => {}
                other => return other,
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.get_unused();
            }
            // One wake-up is shared by all waiters, so re-check periodically.
            let _ = self.release_rx.recv_timeout(remaining.min(RELEASE_POLL));
        }
    }

    /// Block until some slot is released or `timeout` elapses.
    ///
    /// For callers that retry their own claim logic on `NoFreeSlot`. The
    /// wake-up is shared with [`wait_unused`](Self::wait_unused), so a `false`
    /// return only means no release was observed, and callers must re-check.
    pub fn wait_release(&self, timeout: Duration) -> bool {
        self.release_rx.recv_timeout(timeout).is_ok()
    }

    pub fn set_flag(&self, index: SlotIndex, flag: HoldFlags) -> Result<(), SlotError> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(index)?;
        slot.flags.insert(flag);
        tracing::trace!(slot = %index, flags = ?slot.flags, "set {:?}", flag);
        Ok(())
    }

    /// Drop a hold. The last hold (with no queue membership) releases the
    /// slot's payload and buffer.
    pub fn clear_flag(&self, index: SlotIndex, flag: HoldFlags) -> Result<(), SlotError> {
        let released = {
            let mut inner = self.lock();
            let slot = inner.slot_mut(index)?;
            if !slot.flags.intersects(flag) {
                tracing::warn!(slot = %index, flags = ?slot.flags, "clearing unset {:?}", flag);
            }
            let was_unused = slot.is_unused();
            slot.flags.remove(flag);
            tracing::trace!(slot = %index, flags = ?slot.flags, "clear {:?}", flag);
            if !was_unused && slot.is_unused() {
                slot.release_payload();
                true
            } else {
                false
            }
        };

        if released {
            self.notify_release();
        }
        Ok(())
    }

    pub fn flags(&self, index: SlotIndex) -> Result<HoldFlags, SlotError> {
        Ok(self.lock().slot(index)?.flags)
    }

    pub fn queues(&self, index: SlotIndex) -> Result<QueueSet, SlotError> {
        Ok(self.lock().slot(index)?.queues)
    }

    pub fn is_unused(&self, index: SlotIndex) -> Result<bool, SlotError> {
        Ok(self.lock().slot(index)?.is_unused())
    }

    /// Attach frame metadata. The descriptor's `slot` is set to `index`.
    pub fn set_payload(&self, index: SlotIndex, mut payload: FrameDescriptor) -> Result<(), SlotError> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(index)?;
        payload.slot = index;
        payload.eos |= slot.eos;
        slot.payload = Some(payload);
        Ok(())
    }

    pub fn payload(&self, index: SlotIndex) -> Result<Option<FrameDescriptor>, SlotError> {
        Ok(self.lock().slot(index)?.payload)
    }

    /// Modify the payload in place. Returns `false` when the slot has none.
    pub fn update_payload(
        &self,
        index: SlotIndex,
        f: impl FnOnce(&mut FrameDescriptor),
    ) -> Result<bool, SlotError> {
        let mut inner = self.lock();
        match inner.slot_mut(index)?.payload.as_mut() {
            Some(payload) => {
                f(payload);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_buffer(&self, index: SlotIndex, buffer: MediaBuffer) -> Result<(), SlotError> {
        self.lock().slot_mut(index)?.buffer = Some(buffer);
        Ok(())
    }

    pub fn buffer(&self, index: SlotIndex) -> Result<Option<MediaBuffer>, SlotError> {
        Ok(self.lock().slot(index)?.buffer)
    }

    /// Mark the slot as the last picture of the stream.
    pub fn set_eos(&self, index: SlotIndex) -> Result<(), SlotError> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(index)?;
        slot.eos = true;
        if let Some(payload) = slot.payload.as_mut() {
            payload.eos = true;
        }
        Ok(())
    }

    /// Force a slot back to unused: holds cleared, removed from every queue,
    /// payload dropped.
    pub fn reset(&self, index: SlotIndex) -> Result<(), SlotError> {
        {
            let mut inner = self.lock();
            let queues = inner.slot(index)?.queues;
            for queue in queues.queues() {
                inner.queues[queue.index()].retain(|&queued| queued != index);
            }
            let slot = inner.slot_mut(index)?;
            slot.flags = HoldFlags::empty();
            slot.queues = QueueSet::empty();
            slot.release_payload();
        }
        tracing::debug!(slot = %index, "slot reset");
        self.notify_release();
        Ok(())
    }

    /// Append to a named FIFO. Holds are left untouched.
    pub fn enqueue(&self, index: SlotIndex, queue: SlotQueue) -> Result<(), SlotError> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(index)?;
        if slot.queues.contains(queue.bit()) {
            return Err(SlotError::AlreadyQueued { index, queue });
        }
        slot.queues.insert(queue.bit());
        inner.queues[queue.index()].push_back(index);
        tracing::trace!(slot = %index, "enqueued to {:?}", queue);
        Ok(())
    }

    /// Pop the oldest slot from a named FIFO.
    pub fn dequeue(&self, queue: SlotQueue) -> Option<SlotIndex> {
        let (index, released) = {
            let mut inner = self.lock();
            let index = inner.queues[queue.index()].pop_front()?;
            let slot = &mut inner.slots[index.index()];
            slot.queues.remove(queue.bit());
            let released = slot.is_unused();
            if released {
                slot.release_payload();
            }
            (index, released)
        };

        tracing::trace!(slot = %index, "dequeued from {:?}", queue);
        if released {
            self.notify_release();
        }
        Some(index)
    }

    pub fn queue_len(&self, queue: SlotQueue) -> usize {
        self.lock().queues[queue.index()].len()
    }

    pub fn used_count(&self) -> usize {
        self.lock().slots.iter().filter(|slot| !slot.is_unused()).count()
    }

    pub fn unused_count(&self) -> usize {
        self.lock().slots.iter().filter(|slot| slot.is_unused()).count()
    }

    /// Announce new stream geometry. A layout different from the active one
    /// marks the table changed until [`ready`](Self::ready) is called.
    pub fn set_frame_info(&self, info: FrameInfo) {
        let mut inner = self.lock();
        if inner.info == Some(info) && !inner.changed {
            return;
        }
        tracing::info!(
            "slot table info change: {}x{} {:?} stride {}x{} size {}",
            info.width,
            info.height,
            info.format,
            info.hor_stride,
            info.ver_stride,
            info.buffer_size
        );
        inner.pending_info = Some(info);
        inner.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.lock().changed
    }

    /// Acknowledge a pending info change and make it active.
    pub fn ready(&self) -> Option<FrameInfo> {
        let mut inner = self.lock();
        if inner.changed {
            inner.info = inner.pending_info.take();
            inner.changed = false;
            tracing::debug!("slot table info change acknowledged");
        }
        inner.info
    }

    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.lock().info
    }

    /// Buffer size implied by the active frame info, zero before negotiation.
    pub fn buffer_size(&self) -> usize {
        self.lock().info.map(|info| info.buffer_size).unwrap_or(0)
    }

    pub fn snapshot(&self) -> SlotTableSnapshot {
        let inner = self.lock();
        SlotTableSnapshot {
            capacity: inner.slots.len(),
            used: inner.slots.iter().filter(|slot| !slot.is_unused()).count(),
            changed: inner.changed,
            info: inner.info,
            queue_lengths: SlotQueue::ALL
                .iter()
                .map(|&queue| (queue, inner.queues[queue.index()].len()))
                .collect(),
            slots: inner
                .slots
                .iter()
                .enumerate()
                .map(|(i, slot)| SlotSnapshot {
                    index: i as u32,
                    flags: slot.flags.bits(),
                    queues: slot.queues.queues().collect(),
                    has_payload: slot.payload.is_some(),
                    has_buffer: slot.buffer.is_some(),
                    eos: slot.eos,
                })
                .collect(),
        }
    }

    /// Log the table state as JSON at debug level.
    pub fn dump(&self, reason: &str) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => tracing::debug!("slot table dump ({}): {}", reason, json),
            Err(e) => tracing::warn!("slot table dump failed: {}", e),
        }
    }
}

impl std::fmt::Debug for BufferSlotTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("BufferSlotTable")
            .field("capacity", &inner.slots.len())
            .field("changed", &inner.changed)
            .finish()
    }
}
