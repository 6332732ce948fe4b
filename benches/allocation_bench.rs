//! Benchmarks for the planning pipeline and the executor loop.
//!
//! Benchmarks cover:
//! - Proportional-fair distribution under scarce capacity
//! - Thread calculation with and without a degraded-mode cap
//! - Batch composition and repeat scaling
//! - Executor passes against a virtual clock

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tokio::runtime::Runtime;

use prometheus_batch_scheduler::config::EngineConfig;
use prometheus_batch_scheduler::core::{
    compose_batches, distribute, scale_repeat_counts, Host, OperationDurations, Target, TargetState,
    ThreadCalculator,
};
use prometheus_batch_scheduler::builders::build_executor;
use prometheus_batch_scheduler::infra::RecordingDispatcher;
use prometheus_batch_scheduler::runtime::ManualClock;

// ============================================================================
// Fixtures
// ============================================================================

fn random_targets(rng: &mut StdRng, count: usize) -> Vec<Target> {
    (0..count)
        .map(|i| {
            let state = match rng.random_range(0..3) {
                0 => TargetState::NeedsSuppression,
                1 => TargetState::NeedsReplenishment,
                _ => TargetState::ReadyToExtract,
            };
            let resource_max = rng.random_range(100_000.0..10_000_000.0);
            Target {
                id: format!("target-{i}"),
                security_current: rng.random_range(5.0..40.0),
                security_min: 5.0,
                resource_current: resource_max * rng.random_range(0.05..1.0),
                resource_max,
                durations: OperationDurations {
                    suppress: 40_000,
                    replenish: 32_000,
                    extract: 10_000,
                },
                min_duration: 10_000,
                max_duration: 40_000,
                priority_value: rng.random_range(0.1..10.0),
                state,
                threads_needed: rng.random_range(1..2_000),
                threads_assigned: 0,
            }
        })
        .collect()
}

// ============================================================================
// Planning
// ============================================================================

fn bench_distribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("distribute");
    let mut rng = StdRng::seed_from_u64(7);

    for size in [10_usize, 100, 1_000] {
        let targets = random_targets(&mut rng, size);
        let capacity: u64 = targets.iter().map(|t| u64::from(t.threads_needed)).sum::<u64>() / 3;
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &targets, |b, targets| {
            b.iter(|| {
                let mut targets = targets.clone();
                black_box(distribute(&mut targets, capacity))
            });
        });
    }
    group.finish();
}

fn bench_calculate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate");
    let calc = ThreadCalculator::from_config(&EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(11);
    let targets = random_targets(&mut rng, 256);

    group.bench_function("uncapped", |b| {
        b.iter(|| {
            for t in &targets {
                black_box(calc.calculate(t, None));
            }
        });
    });
    group.bench_function("capped", |b| {
        b.iter(|| {
            for t in &targets {
                black_box(calc.calculate(t, Some(t.threads_needed / 2)));
            }
        });
    });
    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose");
    let calc = ThreadCalculator::from_config(&EngineConfig::default());
    let mut rng = StdRng::seed_from_u64(13);

    for size in [10_usize, 100, 500] {
        let targets: Vec<Target> = random_targets(&mut rng, size)
            .into_iter()
            .map(|mut t| {
                t.threads_assigned = t.threads_needed;
                t
            })
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("compose_and_scale", size), &targets, |b, targets| {
            b.iter(|| {
                let batches = compose_batches(&calc, targets, 200);
                black_box(scale_repeat_counts(batches, 1_000_000, 200))
            });
        });
    }
    group.finish();
}

// ============================================================================
// Execution
// ============================================================================

fn bench_executor_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor");
    let config = EngineConfig {
        interval_ms: 200,
        ..EngineConfig::default()
    };
    let calc = ThreadCalculator::from_config(&config);
    let mut rng = StdRng::seed_from_u64(17);
    let targets: Vec<Target> = random_targets(&mut rng, 50)
        .into_iter()
        .map(|mut t| {
            t.threads_assigned = t.threads_needed;
            t
        })
        .collect();
    let batches = compose_batches(&calc, &targets, config.interval_ms);

    group.bench_function("virtual_clock_50_targets", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| {
            let batches = batches.clone();
            let config = config.clone();
            async move {
                let hosts = vec![Host::new("h1", 50_000), Host::new("h2", 50_000)];
                let mut executor =
                    build_executor(&config, ManualClock::new(0), RecordingDispatcher::new(), hosts).unwrap();
                black_box(executor.run(batches).await)
            }
        });
    });
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(planning_benches, bench_distribute, bench_calculate, bench_compose);

criterion_group!(execution_benches, bench_executor_run);

criterion_main!(planning_benches, execution_benches);
