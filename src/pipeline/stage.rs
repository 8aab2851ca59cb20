//! Collaborator seams of the decode pipeline.
//!
//! The runtime does not parse bitstreams or program hardware itself. A
//! [`Parser`] turns packets into tasks (output slot, references, metadata in
//! the bag) and a [`HalBackend`] drives the hardware for each task. Both run
//! on their own stage thread and only ever see one task at a time.

use crate::attachment::AttachmentBag;
use crate::media::{CodecType, Packet};
use crate::pipeline::error::PipelineResult;
use crate::slots::BufferSlotTable;
use std::time::Duration;

/// Bitstream parser feeding the hardware stage.
pub trait Parser: Send {
    /// Human-readable name of this parser.
    fn name(&self) -> &'static str;

    /// Prepare one task from `packet`.
    ///
    /// A successful parse claims an output slot (`get_unused`, payload,
    /// `HAL_OUTPUT`) and records it in the bag as `OutputSlot`, together with
    /// `ReferenceSlots` and `EndOfStream`. Returning a backpressure error
    /// (no free slot) makes the stage retry the same packet.
    fn parse(
        &mut self,
        packet: &Packet,
        slots: &BufferSlotTable,
        bag: &AttachmentBag,
    ) -> PipelineResult<()>;

    /// Drop every reference the parser still holds in `slots`.
    fn reset(&mut self, _slots: &BufferSlotTable) {}
}

/// Hardware backend for one codec family.
///
/// `generate` translates the task into register state, `start` kicks the
/// hardware and `wait` blocks until it finishes, writing `HardwareStatus`,
/// `ErrorFlags` and `BitstreamLength` into the bag. A missing status after
/// `wait` is treated as a timeout.
#[cfg_attr(test, mockall::automock)]
pub trait HalBackend: Send {
    fn name(&self) -> &'static str;

    fn codec(&self) -> CodecType;

    fn generate(&mut self, bag: &AttachmentBag) -> PipelineResult<()>;

    fn start(&mut self, bag: &AttachmentBag) -> PipelineResult<()>;

    fn wait(&mut self, bag: &AttachmentBag, timeout: Duration) -> PipelineResult<()>;

    /// Abandon any in-flight work.
    fn reset(&mut self) {}
}
