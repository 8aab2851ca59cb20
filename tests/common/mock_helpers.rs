//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vpu_runtime::attachment::{AttachmentBag, AttachmentKey};
use vpu_runtime::config::FrameConfig;
use vpu_runtime::media::{CodecType, FrameDescriptor, HalStatus, Packet};
use vpu_runtime::pipeline::{HalBackend, Parser, PipelineError, PipelineResult};
use vpu_runtime::slots::{BufferSlotTable, FrameInfo, HoldFlags};

/// HAL backend that only finishes a task when the test releases it.
pub struct GatedHal {
    gate: Receiver<()>,
    pub started: Arc<AtomicUsize>,
}

impl GatedHal {
    /// Returns the backend and the sender that lets one task finish per `()`.
    pub fn new() -> (Self, Sender<()>, Arc<AtomicUsize>) {
        let (tx, rx) = bounded(64);
        let started = Arc::new(AtomicUsize::new(0));
        (
            Self {
                gate: rx,
                started: started.clone(),
            },
            tx,
            started,
        )
    }
}

impl HalBackend for GatedHal {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn codec(&self) -> CodecType {
        CodecType::H264
    }

    fn generate(&mut self, _bag: &AttachmentBag) -> PipelineResult<()> {
        Ok(())
    }

    fn start(&mut self, _bag: &AttachmentBag) -> PipelineResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&mut self, bag: &AttachmentBag, timeout: Duration) -> PipelineResult<()> {
        let status = match self.gate.recv_timeout(timeout) {
            Ok(()) => HalStatus::DONE,
            Err(_) => HalStatus::TIMEOUT,
        };
        bag.set(AttachmentKey::HardwareStatus, status)?;
        Ok(())
    }
}

/// Parser that rejects every packet whose pts is in `bad`.
pub struct RejectingParser<P: Parser> {
    inner: P,
    bad: Vec<i64>,
}

impl<P: Parser> RejectingParser<P> {
    pub fn new(inner: P, bad: Vec<i64>) -> Self {
        Self { inner, bad }
    }
}

impl<P: Parser> Parser for RejectingParser<P> {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn parse(
        &mut self,
        packet: &Packet,
        slots: &BufferSlotTable,
        bag: &AttachmentBag,
    ) -> PipelineResult<()> {
        if self.bad.contains(&packet.pts) {
            return Err(PipelineError::Parser(format!("corrupt packet {}", packet.pts)));
        }
        self.inner.parse(packet, slots, bag)
    }

    fn reset(&mut self, slots: &BufferSlotTable) {
        self.inner.reset(slots)
    }
}

/// Parser that never waits for a slot: a full table comes straight back as
/// `NoFreeSlot`.
pub struct NonBlockingParser {
    info: FrameInfo,
}

impl NonBlockingParser {
    pub fn new(frame: FrameConfig) -> Self {
        Self {
            info: frame.frame_info(),
        }
    }
}

impl Parser for NonBlockingParser {
    fn name(&self) -> &'static str {
        "non-blocking"
    }

    fn parse(
        &mut self,
        packet: &Packet,
        slots: &BufferSlotTable,
        bag: &AttachmentBag,
    ) -> PipelineResult<()> {
        let slot = slots.get_unused()?;
        bag.set(AttachmentKey::OutputSlot, slot)?;

        let frame = FrameDescriptor::new(self.info.width, self.info.height, self.info.format)
            .with_pts(packet.pts);
        slots.set_payload(slot, frame)?;
        slots.set_flag(slot, HoldFlags::HAL_OUTPUT)?;
        bag.set(AttachmentKey::InputPacket, packet.clone())?;
        bag.set(AttachmentKey::EndOfStream, i32::from(packet.eos))?;
        Ok(())
    }
}
