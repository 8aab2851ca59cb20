//! VPU runtime demo
//!
//! Decodes a synthetic stream through the parser and hardware stages and
//! logs what comes out. Pass a `.toml` or `.json` config path to override the
//! defaults; a second argument sets the number of packets.

use anyhow::Context;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use vpu_runtime::{
    config::RuntimeConfig,
    logging,
    media::Packet,
    pipeline::{DecodePipeline, HalRegistry, PipelineBuilder},
};

const DEFAULT_PACKETS: usize = 120;
const FRAME_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => RuntimeConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => RuntimeConfig::default(),
    };
    let packets = match args.next() {
        Some(n) => n.parse::<usize>().context("packet count must be a number")?,
        None => DEFAULT_PACKETS,
    };

    // Initialize logging
    let _log_guard = logging::init(&config.log)?;

    tracing::info!("Starting VPU runtime demo");
    config.validate().context("invalid configuration")?;

    let pipeline = PipelineBuilder::new(config)
        .hal_registry(HalRegistry::with_synthetic())
        .build()
        .context("starting decode pipeline")?;

    let start = Instant::now();
    let consumer = decode(&pipeline, packets)?;
    let elapsed = start.elapsed();

    let registry = pipeline.registry().clone();
    let stats = pipeline.shutdown();
    let leaks = registry.teardown();

    tracing::info!(
        "Displayed {} frames ({} errored) in {:.1?}, {:.1} fps",
        consumer.frames,
        consumer.errored,
        elapsed,
        consumer.frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    tracing::info!("{}", serde_json::to_string(&stats)?);
    if !leaks.is_clean() {
        tracing::warn!("{} attachment bags leaked", leaks.leaked.len());
    }

    Ok(())
}

#[derive(Default)]
struct ConsumerSummary {
    frames: u64,
    errored: u64,
}

/// Feed `packets` packets plus an end-of-stream marker and display every
/// frame until the marker comes back out.
fn decode(pipeline: &DecodePipeline, packets: usize) -> anyhow::Result<ConsumerSummary> {
    let mut summary = ConsumerSummary::default();
    let mut pending: VecDeque<Packet> = (0..packets as i64)
        .map(|pts| Packet::new(vec![(pts & 0xff) as u8; 4096], pts))
        .chain(std::iter::once(Packet::eos()))
        .collect();

    loop {
        while let Some(packet) = pending.pop_front() {
            if let Some(packet) = pipeline.try_send_packet(packet)? {
                // Channel full: drain some frames first.
                pending.push_front(packet);
                break;
            }
        }

        let Some(frame) = pipeline.next_frame(FRAME_TIMEOUT) else {
            anyhow::bail!("timed out waiting for frame after {}", summary.frames);
        };
        summary.frames += 1;
        if frame.is_errored() {
            summary.errored += 1;
            tracing::debug!(pts = frame.pts(), "frame decoded with errors");
        }
        if frame.is_eos() {
            tracing::info!("End of stream reached");
            return Ok(summary);
        }
    }
}
