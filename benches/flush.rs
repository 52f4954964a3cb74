//! Outbound flush benchmark suite.
//!
//! Benchmarks the hot path of a flush at different batch sizes: queue
//! drain, frame assembly, and JSON serialization.
//!
//! Run with: cargo bench --bench flush
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use boardlink::protocol::{BatchFrame, CommandDescriptor};
use boardlink::session::OutboundQueue;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 16, 256, 4096];

fn descriptors(count: usize) -> Vec<CommandDescriptor> {
    (0..count)
        .map(|i| CommandDescriptor::new((i % 1000) as u16, 2, vec![(i % 2) as i64]))
        .collect()
}

// ============================================================================
// Benchmark: Queue Drain
// ============================================================================

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");

    for &size in BATCH_SIZES {
        group.bench_with_input(BenchmarkId::new("snapshot", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut queue = OutboundQueue::new();
                    queue.enqueue(descriptors(size));
                    queue
                },
                |mut queue| black_box(queue.begin_flush()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Frame Serialization
// ============================================================================

fn bench_frame_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_serialize");

    for &size in BATCH_SIZES {
        let frame = BatchFrame::new(descriptors(size));

        group.bench_with_input(BenchmarkId::new("json", size), &frame, |b, frame| {
            b.iter(|| serde_json::to_string(black_box(frame)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_queue_drain, bench_frame_serialize);
criterion_main!(benches);
