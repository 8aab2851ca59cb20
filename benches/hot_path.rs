//! Benchmarks for the per-frame hot path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use vpu_runtime::attachment::{AttachmentKey, AttachmentRegistry};
use vpu_runtime::config::RuntimeConfig;
use vpu_runtime::media::{FrameDescriptor, FrameFormat, Packet};
use vpu_runtime::pipeline::DecodePipeline;
use vpu_runtime::slots::{BufferSlotTable, HoldFlags, SlotQueue};
use vpu_runtime::task::TaskQueue;

fn bench_attachment_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("attachment");
    let registry = AttachmentRegistry::new();
    let bag = registry.acquire(Some("bench"), None).unwrap();
    let frame = FrameDescriptor::new(1920, 1080, FrameFormat::Yuv420Sp);

    group.throughput(Throughput::Elements(1));
    group.bench_function("set_get_s64", |b| {
        let mut pts = 0i64;
        b.iter(|| {
            bag.set(AttachmentKey::Pts, black_box(pts)).unwrap();
            black_box(bag.get::<i64>(AttachmentKey::Pts).unwrap());
            pts = pts.wrapping_add(1);
        });
    });
    group.bench_function("set_get_frame", |b| {
        b.iter(|| {
            bag.set(AttachmentKey::OutputFrame, black_box(frame)).unwrap();
            black_box(bag.get::<FrameDescriptor>(AttachmentKey::OutputFrame).unwrap());
        });
    });
    group.bench_function("clear", |b| {
        b.iter(|| {
            bag.set(AttachmentKey::EndOfStream, 0i32).unwrap();
            bag.clear().unwrap();
        });
    });

    group.finish();
    bag.release();
}

fn bench_slot_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_cycle");

    for capacity in [4usize, 16, 64].iter() {
        let table = BufferSlotTable::with_capacity(*capacity).unwrap();
        // Keep all but one slot busy so get_unused has to scan.
        for _ in 1..*capacity {
            table.get_unused().unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("claim_display_release", capacity), &table, |b, table| {
            b.iter(|| {
                let slot = table.get_unused().unwrap();
                table.set_flag(slot, HoldFlags::DISPLAY).unwrap();
                table.enqueue(slot, SlotQueue::Display).unwrap();
                table.clear_flag(slot, HoldFlags::CODEC_USE).unwrap();
                let shown = table.dequeue(SlotQueue::Display).unwrap();
                table.clear_flag(black_box(shown), HoldFlags::DISPLAY).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_task_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_queue");
    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(2, &registry).unwrap();
    let input = queue.input_port();
    let output = queue.output_port();

    group.throughput(Throughput::Elements(1));
    group.bench_function("round_trip", |b| {
        b.iter(|| {
            let token = input.dequeue().unwrap();
            input.enqueue(token).unwrap();
            let token = output.dequeue().unwrap();
            output.enqueue(black_box(token)).unwrap();
        });
    });

    group.finish();
}

fn bench_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_pipeline");
    group.sample_size(10);

    const FRAMES: i64 = 64;
    group.throughput(Throughput::Elements(FRAMES as u64));
    group.bench_function("synthetic_64_frames", |b| {
        let pipeline = DecodePipeline::new(RuntimeConfig::default()).unwrap();
        let mut pts = 0i64;
        b.iter(|| {
            for _ in 0..FRAMES {
                pipeline.send_packet(Packet::new(vec![0u8; 256], pts)).unwrap();
                pts += 1;
                let frame = pipeline.next_frame(Duration::from_secs(1)).unwrap();
                black_box(frame.pts());
            }
        });
        pipeline.shutdown();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_attachment_set_get,
    bench_slot_cycle,
    bench_task_round_trip,
    bench_pipeline_throughput,
);
criterion_main!(benches);
