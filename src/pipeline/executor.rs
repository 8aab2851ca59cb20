//! Decode pipeline executor: the parser and hardware stage threads.
//!
//! ```text
//!  send_packet ──► [parser thread] ──TaskQueue──► [hal thread] ──► Display queue ──► next_frame
//!                        ▲                              │
//!                        └──────── recycled tokens ─────┘
//! ```
//!
//! Each stage blocks on its task port. Shutdown stores `running = false`
//! and closes the task queue, which wakes both stages wherever they wait.

use crate::attachment::{AttachmentBag, AttachmentKey, AttachmentRegistry};
use crate::config::{DebugConfig, RuntimeConfig};
use crate::error::Result;
use crate::id::SlotIndex;
use crate::media::{HalStatus, Packet, RefList};
use crate::pipeline::bridge::{DisplayFrame, PipelineStats, StageCounters};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::hal_registry::HalRegistry;
use crate::pipeline::stage::{HalBackend, Parser};
use crate::pipeline::synthetic::SyntheticParser;
use crate::slots::{BufferSlotTable, HoldFlags, SlotQueue};
use crate::task::{PollTimeout, PortDirection, TaskError, TaskPort, TaskQueue, TaskToken};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Channel capacity for packets (caller → parser).
const PACKET_CHANNEL_CAPACITY: usize = 16;

/// How often an idle parser re-checks the running flag.
const IDLE_POLL: Duration = Duration::from_millis(50);

// ── Parser stage ──

struct ParserStage {
    parser: Box<dyn Parser>,
    slots: Arc<BufferSlotTable>,
    queue: Arc<TaskQueue>,
    input: TaskPort,
    packet_rx: Receiver<Packet>,
    running: Arc<AtomicBool>,
    counters: Arc<StageCounters>,
    debug: DebugConfig,
}

impl ParserStage {
    fn run(mut self) {
        tracing::info!("Parser stage '{}' started", self.parser.name());

        while self.running.load(Ordering::Relaxed) {
            let packet = match self.packet_rx.recv_timeout(IDLE_POLL) {
                Ok(packet) => packet,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let token = match self.input.dequeue_timeout(PollTimeout::Block) {
                Ok(token) => token,
                Err(TaskError::Closed) => break,
                Err(e) => {
                    tracing::error!("Parser stage failed to get a task: {}", e);
                    continue;
                }
            };

            self.submit(&packet, token);
        }

        self.parser.reset(&self.slots);
        tracing::info!("Parser stage exiting");
    }

    /// Parse `packet` into `token` and hand it to the hardware stage.
    fn submit(&mut self, packet: &Packet, token: TaskToken) {
        loop {
            match self.parser.parse(packet, &self.slots, token.bag()) {
                Ok(()) => break,
                Err(e) if e.is_backpressure() => {
                    StageCounters::bump(&self.counters.backpressure_waits);
                    if !self.running.load(Ordering::Relaxed) {
                        self.recycle(token);
                        return;
                    }
                    tracing::trace!("parser waiting for a free slot");
                    // Parsers may fail fast on a full table; the stage does the waiting.
                    self.slots.wait_release(IDLE_POLL);
                }
                Err(e) => {
                    StageCounters::bump(&self.counters.parse_errors);
                    tracing::warn!(pts = packet.pts, "Failed to parse packet: {}", e);
                    self.recycle(token);
                    return;
                }
            }
        }

        if self.slots.is_changed() {
            if let Some(info) = self.slots.ready() {
                StageCounters::bump(&self.counters.info_changes);
                tracing::info!("Stream geometry now {}x{} {:?}", info.width, info.height, info.format);
            }
            if self.debug.dump_slots {
                self.slots.dump("info change");
            }
        }

        if self.debug.dump_tasks {
            tracing::debug!(task = ?token.index(), pts = packet.pts, "submitting task");
        }

        match self.input.enqueue(token) {
            Ok(()) => StageCounters::bump(&self.counters.tasks_submitted),
            Err(e) => tracing::error!("Failed to submit task: {}", e),
        }
    }

    fn recycle(&self, token: TaskToken) {
        release_task_slots(&self.slots, token.bag());
        if let Err(e) = self.queue.recycle(token) {
            tracing::error!("Failed to recycle task: {}", e);
        }
    }
}

// ── Hardware stage ──

pub(crate) struct HalStage {
    hal: Box<dyn HalBackend>,
    slots: Arc<BufferSlotTable>,
    queue: Arc<TaskQueue>,
    output: TaskPort,
    display_tx: Sender<()>,
    running: Arc<AtomicBool>,
    counters: Arc<StageCounters>,
    debug: DebugConfig,
    wait_timeout: Duration,
}

impl HalStage {
    fn run(mut self) {
        tracing::info!(
            "HAL stage '{}' started for {}",
            self.hal.name(),
            self.hal.codec().name()
        );

        while self.running.load(Ordering::Relaxed) {
            let token = match self.output.dequeue_timeout(PollTimeout::Block) {
                Ok(token) => token,
                Err(TaskError::Closed) => break,
                Err(e) => {
                    tracing::error!("HAL stage failed to get a task: {}", e);
                    continue;
                }
            };

            if self.debug.dump_tasks {
                tracing::debug!(task = ?token.index(), "hardware task");
            }
            self.process(token.bag());

            if let Err(e) = self.queue.recycle(token) {
                tracing::error!("Failed to recycle task: {}", e);
            }
        }

        self.hal.reset();
        tracing::info!("HAL stage exiting");
    }

    /// Run one task through the hardware and publish its output slot.
    pub(crate) fn process(&mut self, bag: &AttachmentBag) {
        let slot = match bag.take::<SlotIndex>(AttachmentKey::OutputSlot) {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                tracing::warn!(bag = %bag.id(), "task without output slot skipped");
                return;
            }
            Err(e) => {
                tracing::error!(bag = %bag.id(), "failed to read output slot: {}", e);
                return;
            }
        };
        let refs = bag
            .take::<RefList>(AttachmentKey::ReferenceSlots)
            .ok()
            .flatten()
            .unwrap_or_default();
        let eos = matches!(bag.take::<i32>(AttachmentKey::EndOfStream), Ok(Some(v)) if v != 0);

        let status = match self.run_hardware(bag) {
            Ok(()) => bag
                .take::<HalStatus>(AttachmentKey::HardwareStatus)
                .ok()
                .flatten()
                .unwrap_or(HalStatus::TIMEOUT),
            Err(e) => {
                tracing::warn!(slot = %slot, "Hardware task failed: {}", e);
                self.hal.reset();
                HalStatus::ERROR
            }
        };

        for &reference in refs.as_slice() {
            if let Err(e) = self.slots.clear_flag(reference, HoldFlags::HAL_INPUT) {
                tracing::error!(slot = %reference, "failed to release reference: {}", e);
            }
        }

        StageCounters::bump(&self.counters.frames_decoded);
        if status.is_failure() {
            StageCounters::bump(&self.counters.frames_errored);
            tracing::warn!(slot = %slot, "hardware status {:?}", status);
            if let Err(e) = self.slots.update_payload(slot, |frame| frame.errinfo |= status.bits()) {
                tracing::error!(slot = %slot, "failed to mark frame errored: {}", e);
            }
        }

        if let Err(e) = self.publish(slot, eos) {
            tracing::error!(slot = %slot, "failed to publish frame: {}", e);
            if let Err(e) = self.slots.reset(slot) {
                tracing::error!(slot = %slot, "failed to reset unpublished slot: {}", e);
            }
        }
    }

    fn run_hardware(&mut self, bag: &AttachmentBag) -> PipelineResult<()> {
        self.hal.generate(bag)?;
        self.hal.start(bag)?;
        self.hal.wait(bag, self.wait_timeout)
    }

    /// Move the slot from the hardware to the display consumer.
    fn publish(&self, slot: SlotIndex, eos: bool) -> PipelineResult<()> {
        if eos {
            self.slots.set_eos(slot)?;
        }
        // DISPLAY goes on before the decode holds come off so the slot is
        // never transiently unused.
        self.slots.set_flag(slot, HoldFlags::DISPLAY)?;
        self.slots.enqueue(slot, SlotQueue::Display)?;
        self.slots.clear_flag(slot, HoldFlags::HAL_OUTPUT | HoldFlags::CODEC_USE)?;

        match self.display_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(PipelineError::ChannelSend),
        }
    }
}

/// Drop the decode holds a parsed but unfinished task placed on its slots.
fn release_task_slots(slots: &BufferSlotTable, bag: &AttachmentBag) {
    if let Ok(Some(refs)) = bag.take::<RefList>(AttachmentKey::ReferenceSlots) {
        for &reference in refs.as_slice() {
            let _ = slots.clear_flag(reference, HoldFlags::HAL_INPUT);
        }
    }
    if let Ok(Some(slot)) = bag.take::<SlotIndex>(AttachmentKey::OutputSlot) {
        let _ = slots.clear_flag(slot, HoldFlags::HAL_OUTPUT | HoldFlags::CODEC_USE);
    }
}

// ── Pipeline ──

/// Running decode pipeline: one parser thread and one hardware thread.
pub struct DecodePipeline {
    config: RuntimeConfig,
    // Dropped before the registry so task bags are released, not leaked.
    queue: Arc<TaskQueue>,
    registry: Arc<AttachmentRegistry>,
    slots: Arc<BufferSlotTable>,
    packet_tx: Option<Sender<Packet>>,
    display_rx: Receiver<()>,
    running: Arc<AtomicBool>,
    counters: Arc<StageCounters>,
    handles: Vec<JoinHandle<()>>,
}

impl DecodePipeline {
    /// Start a pipeline with the synthetic parser and HAL backends.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        PipelineBuilder::new(config).build()
    }

    /// Queue a packet for parsing, blocking while the packet channel is full.
    pub fn send_packet(&self, packet: Packet) -> PipelineResult<()> {
        let tx = self.packet_tx.as_ref().ok_or(PipelineError::NotActive)?;
        if !self.is_running() {
            return Err(PipelineError::NotActive);
        }
        tx.send(packet).map_err(|_| PipelineError::ChannelSend)?;
        StageCounters::bump(&self.counters.packets_received);
        Ok(())
    }

    /// Queue a packet without blocking. Returns the packet when the channel
    /// is full.
    pub fn try_send_packet(&self, packet: Packet) -> PipelineResult<Option<Packet>> {
        let tx = self.packet_tx.as_ref().ok_or(PipelineError::NotActive)?;
        match tx.try_send(packet) {
            Ok(()) => {
                StageCounters::bump(&self.counters.packets_received);
                Ok(None)
            }
            Err(TrySendError::Full(packet)) => Ok(Some(packet)),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::NotActive),
        }
    }

    /// Wait up to `timeout` for the next decoded picture, in decode order.
    pub fn next_frame(&self, timeout: Duration) -> Option<DisplayFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(slot) = self.slots.dequeue(SlotQueue::Display) {
                // A slot without a payload is released by `DisplayFrame::new`.
                if let Some(frame) = DisplayFrame::new(self.slots.clone(), slot) {
                    StageCounters::bump(&self.counters.frames_displayed);
                    return Some(frame);
                }
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let _ = self.display_rx.recv_timeout(remaining.min(IDLE_POLL));
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn slots(&self) -> &Arc<BufferSlotTable> {
        &self.slots
    }

    pub fn registry(&self) -> &Arc<AttachmentRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop both stages, return every task to idle and release the slots
    /// nobody will consume.
    pub fn shutdown(mut self) -> PipelineStats {
        self.stop();
        self.counters.snapshot()
    }

    fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        tracing::info!("Decode pipeline shutting down");

        self.running.store(false, Ordering::Relaxed);
        self.packet_tx = None;
        self.queue.close();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Pipeline stage thread panicked");
            }
        }

        // Tokens parsed but never run still hold decode flags on their slots.
        for direction in [PortDirection::Input, PortDirection::Output] {
            for token in self.queue.drain(direction) {
                release_task_slots(&self.slots, token.bag());
                if let Err(e) = self.queue.recycle(token) {
                    tracing::error!("Failed to recycle task at shutdown: {}", e);
                }
            }
        }

        while let Some(slot) = self.slots.dequeue(SlotQueue::Display) {
            let _ = self.slots.clear_flag(slot, HoldFlags::DISPLAY);
        }

        if self.config.debug.dump_slots {
            self.slots.dump("shutdown");
        }
        if self.config.debug.dump_attachments {
            self.registry.dump("shutdown");
        }

        let stats = self.counters.snapshot();
        tracing::info!(
            "Decode pipeline stopped: {} packets, {} frames ({} errored), {} displayed",
            stats.packets_received,
            stats.frames_decoded,
            stats.frames_errored,
            stats.frames_displayed
        );
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DecodePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePipeline")
            .field("codec", &self.config.codec)
            .field("running", &self.is_running())
            .field("queue", &self.queue)
            .field("slots", &self.slots)
            .finish()
    }
}

/// Assembles a [`DecodePipeline`] from a config and optional collaborators.
pub struct PipelineBuilder {
    config: RuntimeConfig,
    registry: Option<Arc<AttachmentRegistry>>,
    hal_registry: Option<HalRegistry>,
    parser: Option<Box<dyn Parser>>,
    hal: Option<Box<dyn HalBackend>>,
}

impl PipelineBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: None,
            hal_registry: None,
            parser: None,
            hal: None,
        }
    }

    /// Share an attachment registry instead of creating one.
    pub fn registry(mut self, registry: Arc<AttachmentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Look up the HAL backend in `hal_registry` by the configured codec.
    pub fn hal_registry(mut self, hal_registry: HalRegistry) -> Self {
        self.hal_registry = Some(hal_registry);
        self
    }

    pub fn parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Use `hal` directly, bypassing the registry lookup.
    pub fn hal(mut self, hal: Box<dyn HalBackend>) -> Self {
        self.hal = Some(hal);
        self
    }

    /// Validate the config, allocate the queue and slots, and spawn both
    /// stage threads.
    pub fn build(self) -> Result<DecodePipeline> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(AttachmentRegistry::new);
        let slots = Arc::new(BufferSlotTable::with_capacity(config.slot_capacity)?);
        slots.set_frame_info(config.frame.frame_info());
        slots.ready();
        let queue = Arc::new(TaskQueue::new(config.task_queue_depth, &registry)?);

        let hal = match self.hal {
            Some(hal) => hal,
            None => self
                .hal_registry
                .unwrap_or_else(HalRegistry::with_synthetic)
                .create(config.codec, &config.hal)?,
        };
        let parser = self
            .parser
            .unwrap_or_else(|| Box::new(SyntheticParser::new(config.frame)));

        let (packet_tx, packet_rx) = bounded(PACKET_CHANNEL_CAPACITY);
        let (display_tx, display_rx) = bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(StageCounters::default());

        let parser_stage = ParserStage {
            parser,
            slots: slots.clone(),
            queue: queue.clone(),
            input: queue.input_port(),
            packet_rx,
            running: running.clone(),
            counters: counters.clone(),
            debug: config.debug,
        };
        let hal_stage = HalStage {
            hal,
            slots: slots.clone(),
            queue: queue.clone(),
            output: queue.output_port(),
            display_tx,
            running: running.clone(),
            counters: counters.clone(),
            debug: config.debug,
            wait_timeout: Duration::from_millis(config.hal.timeout_ms),
        };

        let mut pipeline = DecodePipeline {
            config,
            queue,
            registry,
            slots,
            packet_tx: Some(packet_tx),
            display_rx,
            running,
            counters,
            handles: Vec::with_capacity(2),
        };

        let parser_handle = std::thread::Builder::new()
            .name("vpu-parser".to_string())
            .spawn(move || parser_stage.run())
            .map_err(PipelineError::from)?;
        pipeline.handles.push(parser_handle);

        let hal_handle = std::thread::Builder::new()
            .name("vpu-hal".to_string())
            .spawn(move || hal_stage.run())
            .map_err(PipelineError::from)?;
        pipeline.handles.push(hal_handle);

        tracing::info!(
            "Decode pipeline started: {} with {} tasks and {} slots",
            pipeline.config.codec.name(),
            pipeline.config.task_queue_depth,
            pipeline.config.slot_capacity
        );
        Ok(pipeline)
    }
}
