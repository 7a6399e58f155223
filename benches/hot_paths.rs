//! Hot path benchmarks for profiling-driven optimization.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Every logged record passes through `LineBuffer::accept`, and every flush
//! through `drain` + `join_lines` and one in-memory append.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rolling_shipper::shipper::buffer::join_lines;
use rolling_shipper::shipper::{
    BufferConfig, FlushConfig, InMemoryAppendStore, LineBuffer, ShipperConfig, ShipperCore,
    SimulatedClock, Timestamp,
};

fn line(len: usize) -> String {
    (0..len).map(|i| ((i % 26) as u8 + b'a') as char).collect()
}

/// Benchmark LineBuffer::accept - the per-record hot path
fn bench_accept(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_accept");
    group.throughput(Throughput::Elements(1));

    for len in [64, 256, 1024] {
        let record = line(len);
        group.bench_function(format!("line_len_{}", len), |b| {
            let mut buffer = LineBuffer::new(
                &FlushConfig::default(),
                &BufferConfig::default(),
                Timestamp::ZERO,
            );
            b.iter(|| {
                buffer.accept(black_box(record.clone()));
                if buffer.pending_count() >= 10_000 {
                    buffer.drain(usize::MAX);
                }
            })
        });
    }

    group.finish();
}

/// Benchmark drain + join for one flush batch
fn bench_drain_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_join");

    for count in [100, 1000] {
        let record = line(128);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("lines_{}", count), |b| {
            b.iter_batched(
                || {
                    let mut buffer = LineBuffer::new(
                        &FlushConfig::default(),
                        &BufferConfig::default(),
                        Timestamp::ZERO,
                    );
                    for _ in 0..count {
                        buffer.accept(record.clone());
                    }
                    buffer
                },
                |mut buffer| {
                    let batch = buffer.drain(4 * 1024 * 1024);
                    black_box(join_lines(&batch))
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// Benchmark a full event + flush cycle against the in-memory store
fn bench_core_flush(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut config = ShipperConfig::test();
    config.flush.max_lines = 100;
    config.max_segment_size = 4 * 1024 * 1024;
    config.retention_limit = 2;

    let mut group = c.benchmark_group("core_flush");
    group.throughput(Throughput::Elements(100));
    group.bench_function("100_lines", |b| {
        let mut core = runtime
            .block_on(ShipperCore::open(
                &config,
                InMemoryAppendStore::new(),
                SimulatedClock::new(0),
            ))
            .unwrap();
        let record = line(128);
        b.iter(|| {
            runtime.block_on(async {
                for _ in 0..100 {
                    core.on_event(record.clone()).await.unwrap();
                }
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_accept, bench_drain_join, bench_core_flush);
criterion_main!(benches);
