//! Propagation benchmarks: chains, fan-out, and task store mutations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::reactive::{Cell, Computation, Effect, Runtime};
use trellis_core::store::{NewTask, StoreEnvironment, TaskStatus, TaskStore};
use trellis_core::StoreConfig;

/// One cell feeding a chain of `n` computations read by a single effect.
fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let runtime = Runtime::new();
            let root = Cell::new(&runtime, 0u64);

            let mut tail = Computation::new(&runtime, {
                let root = root.clone();
                move |cx| root.get(cx)
            });
            for _ in 1..n {
                let previous = tail.clone();
                tail = Computation::new(&runtime, move |cx| previous.get(cx) + 1);
            }
            let _effect = Effect::new(&runtime, {
                let tail = tail.clone();
                move |cx| {
                    black_box(tail.get(cx));
                }
            });

            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                root.set(value);
            });
        });
    }

    group.finish();
}

/// One cell read by `n` effects, all written in one batch.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let runtime = Runtime::new();
            let source = Cell::new(&runtime, 0u64);
            let _effects: Vec<Effect> = (0..n)
                .map(|_| {
                    let source = source.clone();
                    Effect::new(&runtime, move |cx| {
                        black_box(source.get(cx));
                    })
                })
                .collect();

            let mut value = 0u64;
            b.iter(|| {
                runtime.batch(|| {
                    value += 1;
                    source.set(value);
                    source.set(value + 1);
                });
            });
        });
    }

    group.finish();
}

/// Status changes on a store with `n` tasks, statistics read after each.
fn bench_task_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_store");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let runtime = Runtime::new();
            let config = StoreConfig {
                persist: false,
                ..StoreConfig::default()
            };
            let store = TaskStore::new(&runtime, StoreEnvironment::in_memory().with_config(config));
            let ids: Vec<_> = (0..n).map(|i| store.add(NewTask::new(format!("task {i}"))).id).collect();
            let cx = runtime.untracked();

            let mut turn = 0usize;
            b.iter(|| {
                let id = &ids[turn % ids.len()];
                let status = if turn % 2 == 0 { TaskStatus::InProgress } else { TaskStatus::Pending };
                store.change_status(id, status);
                black_box(store.statistics(&cx));
                turn += 1;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_task_store);
criterion_main!(benches);
