//! Benchmarks for the pool manager.
//!
//! Benchmarks cover:
//! - Wire protocol encode/decode
//! - End-to-end job round trips through threaded units
//! - Queue relay when jobs outnumber units

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_worker_pool::builders::PoolManagerBuilder;
use prometheus_worker_pool::config::ManagerConfig;
use prometheus_worker_pool::core::{
    Envelope, JobContext, JobRegistry, JobRequest, PoolManager, UnitMessage,
};
use serde_json::{json, Value};
use tokio::runtime::Runtime;

// ============================================================================
// Helpers
// ============================================================================

fn bench_registry() -> Arc<JobRegistry> {
    let registry = Arc::new(JobRegistry::new());
    registry.register_job("add", |params: Value, ctx: JobContext| {
        let a = params["a"].as_i64().unwrap_or_default();
        let b = params["b"].as_i64().unwrap_or_default();
        ctx.report_progress(1, 1);
        ctx.complete(json!(a + b));
    });
    registry
}

fn bench_manager(runtime: &Runtime, pool_size: usize) -> PoolManager {
    let _guard = runtime.enter();
    PoolManagerBuilder::new(ManagerConfig::new().with_pool_size(pool_size))
        .build_threaded(bench_registry())
        .unwrap()
}

// ============================================================================
// Protocol Benchmarks
// ============================================================================

fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");

    group.bench_function("encode_request", |b| {
        b.iter(|| {
            let envelope = JobRequest::new("add", Some(json!({"a": 1, "b": 2}))).encode();
            black_box(envelope.to_json().unwrap())
        });
    });

    let raw = UnitMessage::Complete { payload: json!({"sum": 3}) }
        .encode()
        .to_json()
        .unwrap();
    group.bench_function("decode_complete", |b| {
        b.iter(|| {
            let envelope = Envelope::from_json(black_box(&raw)).unwrap();
            black_box(UnitMessage::decode(envelope).unwrap())
        });
    });

    group.finish();
}

// ============================================================================
// Manager Benchmarks
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let manager = bench_manager(&runtime, 1);

    c.bench_function("job_round_trip", |b| {
        b.to_async(&runtime).iter(|| async {
            let job = manager.submit_job("add", Some(json!({"a": 2, "b": 3}))).unwrap();
            black_box(job.await.unwrap())
        });
    });
}

fn bench_queued_batch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("queued_batch");
    let batch = 64_u64;
    group.throughput(Throughput::Elements(batch));

    for pool_size in [1, 2, 4, 8] {
        let manager = bench_manager(&runtime, pool_size);
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), &pool_size, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let jobs: Vec<_> = (0..batch)
                    .map(|i| manager.submit_job("add", Some(json!({"a": i, "b": 1}))).unwrap())
                    .collect();
                for job in jobs {
                    black_box(job.await.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(protocol_benches, bench_protocol);
criterion_group!(manager_benches, bench_round_trip, bench_queued_batch);
criterion_main!(protocol_benches, manager_benches);
