// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

#![allow(
    missing_docs,
    clippy::unwrap_used,
    reason = "benchmarks don't require documentation and should fail fast on errors"
)]

use criterion::{Criterion, criterion_group, criterion_main};
use ravel::{Error, Request, WorkerPool, WorkerPoolConfig};

fn fan_out_fan_in(pool: &WorkerPool, count: u32) -> u32 {
    let children: Vec<_> = (0..count)
        .map(|n| Request::new_in(pool, move || Ok::<u32, Error>(n)))
        .collect();
    for child in &children {
        child.submit().unwrap();
    }
    children.iter().map(|child| *child.wait(None).unwrap()).sum()
}

fn entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for worker_count in [1, 2, 4, 8] {
        let pool = WorkerPool::new(WorkerPoolConfig::builder(worker_count).build());
        group.bench_function(format!("{worker_count}_workers"), |b| {
            b.iter(|| fan_out_fan_in(&pool, 200));
        });
    }

    // Debug mode runs every request synchronously on the caller's stack,
    // with none of the dedicated-thread/gate machinery involved at all.
    let debug_pool = WorkerPool::new(WorkerPoolConfig::debug());
    group.bench_function("debug_mode", |b| {
        b.iter(|| fan_out_fan_in(&debug_pool, 200));
    });

    group.finish();
}

criterion_group!(benches, entry);
criterion_main!(benches);
