#![allow(clippy::all)]
//! Benchmarks for the metrics aggregator and connection tracker.
//!
//! Tests: counter updates, snapshots, contended updates, connection
//! bookkeeping.

use criterion::{criterion_group, criterion_main, Criterion};
use l4_relay::relay::{ConnectionTracker, Direction, MetricsAggregator};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;

// ---------------------------------------------------------------------------
// Counter updates
// ---------------------------------------------------------------------------

fn bench_counters(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics/counters");
    let metrics = MetricsAggregator::new();

    group.bench_function("add_bytes", |b| {
        b.iter(|| metrics.add_bytes(black_box(4096)));
    });

    group.bench_function("connection_open_close", |b| {
        b.iter(|| {
            metrics.increment_connection();
            metrics.decrement_active();
        });
    });

    group.bench_function("snapshot", |b| {
        b.iter(|| black_box(metrics.snapshot()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Contention
// ---------------------------------------------------------------------------

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics/contended");

    for threads in [2usize, 8] {
        group.bench_function(format!("add_bytes_{threads}_threads"), |b| {
            let metrics = Arc::new(MetricsAggregator::new());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let metrics = Arc::clone(&metrics);
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                metrics.add_bytes(1);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Connection tracking
// ---------------------------------------------------------------------------

fn bench_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics/tracker");
    let tracker = ConnectionTracker::new();

    group.bench_function("track_and_remove", |b| {
        let mut idx = 0u64;
        b.iter(|| {
            idx += 1;
            let client = SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, ((idx % 254) + 1) as u8)),
                (10000 + (idx % 50000)) as u16,
            );
            let id = tracker.track_connection(client);
            black_box(tracker.remove_connection(id));
        });
    });

    group.bench_function("record_bytes", |b| {
        let client = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)), 12345);
        let id = tracker.track_connection(client);
        b.iter(|| tracker.record_bytes(id, Direction::ClientToTarget, black_box(4096)));
    });

    group.finish();
}

criterion_group!(benches, bench_counters, bench_contended, bench_tracker);
criterion_main!(benches);
