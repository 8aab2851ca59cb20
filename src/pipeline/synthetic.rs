//! Synthetic collaborators.
//!
//! `SyntheticParser` treats every packet as one coded picture that references
//! the previous one. `SyntheticHal` pretends to decode, optionally sleeping and
//! failing on a fixed cadence. Together they exercise the full slot and task
//! hand-off without real hardware.

use crate::attachment::{AttachmentBag, AttachmentKey};
use crate::config::{FrameConfig, HalConfig};
use crate::id::SlotIndex;
use crate::media::{CodecType, FrameDescriptor, HalStatus, MediaBuffer, Packet, RefList};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::stage::{HalBackend, Parser};
use crate::slots::{BufferSlotTable, FrameInfo, HoldFlags};
use std::time::{Duration, Instant};

/// How long a parse waits for a slot before reporting backpressure.
const SLOT_WAIT: Duration = Duration::from_millis(20);

/// Error flag bit set alongside a failed synthetic decode.
pub const SYNTHETIC_ERROR_FLAG: i32 = 0x1;

pub struct SyntheticParser {
    info: FrameInfo,
    announced: bool,
    last_ref: Option<SlotIndex>,
    next_handle: u64,
}

impl SyntheticParser {
    pub fn new(frame: FrameConfig) -> Self {
        Self {
            info: frame.frame_info(),
            announced: false,
            last_ref: None,
            next_handle: 1,
        }
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.info
    }
}

impl Parser for SyntheticParser {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn parse(
        &mut self,
        packet: &Packet,
        slots: &BufferSlotTable,
        bag: &AttachmentBag,
    ) -> PipelineResult<()> {
        if !self.announced {
            slots.set_frame_info(self.info);
            self.announced = true;
        }

        let slot = slots.wait_unused(SLOT_WAIT)?;
        // Recorded first so a failure below still lets the stage release the slot.
        if let Err(e) = bag.set(AttachmentKey::OutputSlot, slot) {
            if let Err(clear) = slots.clear_flag(slot, HoldFlags::CODEC_USE) {
                tracing::warn!("failed to return unrecorded slot {}: {}", slot, clear);
            }
            return Err(e.into());
        }
        let discard = packet.eos && packet.is_empty();

        let mut frame = FrameDescriptor::new(self.info.width, self.info.height, self.info.format)
            .with_pts(packet.pts);
        frame.hor_stride = self.info.hor_stride;
        frame.ver_stride = self.info.ver_stride;
        frame.discard = discard;
        slots.set_payload(slot, frame)?;
        slots.set_buffer(slot, MediaBuffer::new(self.next_handle, self.info.buffer_size))?;
        self.next_handle += 1;
        slots.set_flag(slot, HoldFlags::HAL_OUTPUT)?;
        if packet.eos {
            slots.set_eos(slot)?;
        }

        let mut refs = RefList::new();
        if let Some(prev) = self.last_ref.filter(|_| !discard) {
            refs.push(prev);
        }
        bag.set(AttachmentKey::ReferenceSlots, refs)?;
        for &reference in refs.as_slice() {
            slots.set_flag(reference, HoldFlags::HAL_INPUT)?;
        }

        // The new picture replaces the previous one as the only reference.
        if !discard {
            slots.set_flag(slot, HoldFlags::CODEC_REFERENCE)?;
            if let Some(prev) = self.last_ref.replace(slot) {
                slots.clear_flag(prev, HoldFlags::CODEC_REFERENCE)?;
            }
        }
        if packet.eos {
            self.reset(slots);
        }

        bag.set(AttachmentKey::InputPacket, packet.clone())?;
        bag.set(AttachmentKey::Pts, packet.pts)?;
        bag.set(AttachmentKey::EndOfStream, i32::from(packet.eos))?;

        tracing::trace!(slot = %slot, pts = packet.pts, refs = refs.len(), "parsed packet");
        Ok(())
    }

    fn reset(&mut self, slots: &BufferSlotTable) {
        if let Some(prev) = self.last_ref.take() {
            if let Err(e) = slots.clear_flag(prev, HoldFlags::CODEC_REFERENCE) {
                tracing::warn!("failed to drop reference {}: {}", prev, e);
            }
        }
    }
}

pub struct SyntheticHal {
    codec: CodecType,
    config: HalConfig,
    tasks: u64,
    started: Option<Instant>,
    pending_len: i64,
}

impl SyntheticHal {
    pub fn new(codec: CodecType, config: HalConfig) -> Self {
        Self {
            codec,
            config,
            tasks: 0,
            started: None,
            pending_len: 0,
        }
    }

    fn should_fail(&self) -> bool {
        self.config.fail_every != 0 && self.tasks % u64::from(self.config.fail_every) == 0
    }
}

impl HalBackend for SyntheticHal {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn codec(&self) -> CodecType {
        self.codec
    }

    fn generate(&mut self, bag: &AttachmentBag) -> PipelineResult<()> {
        let packet = bag
            .take::<Packet>(AttachmentKey::InputPacket)?
            .ok_or_else(|| PipelineError::Hal("task has no input packet".to_string()))?;
        self.pending_len = packet.len() as i64;
        self.tasks += 1;
        Ok(())
    }

    fn start(&mut self, _bag: &AttachmentBag) -> PipelineResult<()> {
        if self.started.is_some() {
            return Err(PipelineError::Hal("hardware already running".to_string()));
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    fn wait(&mut self, bag: &AttachmentBag, timeout: Duration) -> PipelineResult<()> {
        let started = self
            .started
            .take()
            .ok_or_else(|| PipelineError::Hal("wait without start".to_string()))?;

        let latency = Duration::from_micros(self.config.latency_us);
        let status = if latency > timeout {
            std::thread::sleep(timeout);
            HalStatus::TIMEOUT
        } else {
            let remaining = latency.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
            if self.should_fail() {
                HalStatus::DONE | HalStatus::ERROR
            } else {
                HalStatus::DONE
            }
        };

        if status.is_failure() {
            bag.set(AttachmentKey::ErrorFlags, SYNTHETIC_ERROR_FLAG)?;
        }
        bag.set(AttachmentKey::BitstreamLength, self.pending_len)?;
        bag.set(AttachmentKey::HardwareStatus, status)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.started = None;
        self.pending_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentRegistry;

    fn setup() -> (std::sync::Arc<AttachmentRegistry>, BufferSlotTable) {
        (AttachmentRegistry::new(), BufferSlotTable::with_capacity(4).unwrap())
    }

    #[test]
    fn test_parse_claims_output_slot() {
        let (registry, slots) = setup();
        let bag = registry.acquire(Some("test"), None).unwrap();
        let mut parser = SyntheticParser::new(FrameConfig::default());

        parser.parse(&Packet::new(vec![1, 2, 3], 10), &slots, &bag).unwrap();

        assert!(slots.is_changed());
        let slot = bag.get::<SlotIndex>(AttachmentKey::OutputSlot).unwrap();
        let flags = slots.flags(slot).unwrap();
        assert!(flags.contains(HoldFlags::CODEC_USE | HoldFlags::HAL_OUTPUT | HoldFlags::CODEC_REFERENCE));
        assert_eq!(slots.payload(slot).unwrap().unwrap().pts, 10);
        assert!(bag.get::<RefList>(AttachmentKey::ReferenceSlots).unwrap().is_empty());
        assert_eq!(bag.get::<i32>(AttachmentKey::EndOfStream).unwrap(), 0);
    }

    #[test]
    fn test_second_picture_references_first() {
        let (registry, slots) = setup();
        let bag = registry.acquire(None, None).unwrap();
        let mut parser = SyntheticParser::new(FrameConfig::default());

        parser.parse(&Packet::new(vec![1], 0), &slots, &bag).unwrap();
        let first = bag.get::<SlotIndex>(AttachmentKey::OutputSlot).unwrap();
        bag.clear().unwrap();

        parser.parse(&Packet::new(vec![2], 1), &slots, &bag).unwrap();
        let refs = bag.get::<RefList>(AttachmentKey::ReferenceSlots).unwrap();
        assert_eq!(refs.as_slice(), &[first]);

        let flags = slots.flags(first).unwrap();
        assert!(flags.contains(HoldFlags::HAL_INPUT));
        assert!(!flags.contains(HoldFlags::CODEC_REFERENCE));
    }

    #[test]
    fn test_eos_drops_references() {
        let (registry, slots) = setup();
        let bag = registry.acquire(None, None).unwrap();
        let mut parser = SyntheticParser::new(FrameConfig::default());

        parser.parse(&Packet::eos(), &slots, &bag).unwrap();
        let slot = bag.get::<SlotIndex>(AttachmentKey::OutputSlot).unwrap();
        let payload = slots.payload(slot).unwrap().unwrap();
        assert!(payload.eos);
        assert!(payload.discard);
        assert!(!slots.flags(slot).unwrap().contains(HoldFlags::CODEC_REFERENCE));
        assert_eq!(bag.get::<i32>(AttachmentKey::EndOfStream).unwrap(), 1);
    }

    #[test]
    fn test_parse_reports_backpressure() {
        let registry = AttachmentRegistry::new();
        let slots = BufferSlotTable::with_capacity(1).unwrap();
        let bag = registry.acquire(None, None).unwrap();
        let mut parser = SyntheticParser::new(FrameConfig::default());

        parser.parse(&Packet::new(vec![1], 0), &slots, &bag).unwrap();
        let err = parser.parse(&Packet::new(vec![2], 1), &slots, &bag).unwrap_err();
        assert!(err.is_backpressure());
    }

    #[test]
    fn test_failed_parse_leaves_no_slot_held() {
        let (registry, slots) = setup();
        let bag = registry.acquire(None, None).unwrap();
        bag.release();
        let mut parser = SyntheticParser::new(FrameConfig::default());

        let err = parser.parse(&Packet::new(vec![1], 0), &slots, &bag).unwrap_err();
        assert!(!err.is_backpressure());
        assert_eq!(slots.used_count(), 0);
    }

    #[test]
    fn test_hal_reports_done() {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(None, None).unwrap();
        let mut hal = SyntheticHal::new(CodecType::H264, HalConfig::default());

        bag.set(AttachmentKey::InputPacket, Packet::new(vec![0; 64], 0)).unwrap();
        hal.generate(&bag).unwrap();
        hal.start(&bag).unwrap();
        hal.wait(&bag, Duration::from_millis(100)).unwrap();

        assert_eq!(
            bag.get::<HalStatus>(AttachmentKey::HardwareStatus).unwrap(),
            HalStatus::DONE
        );
        assert_eq!(bag.get::<i64>(AttachmentKey::BitstreamLength).unwrap(), 64);
        assert!(bag.take::<i32>(AttachmentKey::ErrorFlags).unwrap().is_none());
    }

    #[test]
    fn test_hal_fails_on_cadence() {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(None, None).unwrap();
        let config = HalConfig {
            fail_every: 2,
            ..Default::default()
        };
        let mut hal = SyntheticHal::new(CodecType::Vp9, config);

        let mut statuses = Vec::new();
        for pts in 0..4 {
            bag.set(AttachmentKey::InputPacket, Packet::new(vec![1], pts)).unwrap();
            hal.generate(&bag).unwrap();
            hal.start(&bag).unwrap();
            hal.wait(&bag, Duration::from_millis(100)).unwrap();
            statuses.push(bag.get::<HalStatus>(AttachmentKey::HardwareStatus).unwrap());
            bag.clear().unwrap();
        }

        let failures: Vec<bool> = statuses.iter().map(|s| s.is_failure()).collect();
        assert_eq!(failures, vec![false, true, false, true]);
    }

    #[test]
    fn test_hal_wait_without_start() {
        let registry = AttachmentRegistry::new();
        let bag = registry.acquire(None, None).unwrap();
        let mut hal = SyntheticHal::new(CodecType::Av1, HalConfig::default());
        assert!(hal.wait(&bag, Duration::from_millis(1)).is_err());
    }
}
