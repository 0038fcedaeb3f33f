use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use stealpool::{Config, Executor};

fn submit_and_drain(c: &mut Criterion, label: &str, worker_count: usize, tasks: usize) {
    c.bench_function(label, |b| {
        b.iter(|| {
            let executor = Executor::new(Config::default_for(worker_count)).unwrap();
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..tasks {
                let counter = counter.clone();
                executor.submit(move || {
                    black_box(counter.fetch_add(1, Ordering::Relaxed));
                });
            }
            drop(executor);
            assert_eq!(counter.load(Ordering::Relaxed), tasks);
        });
    });
}

fn single_worker_10k(c: &mut Criterion) {
    submit_and_drain(c, "single_worker_10k", 1, 10_000);
}

fn four_workers_10k(c: &mut Criterion) {
    submit_and_drain(c, "four_workers_10k", 4, 10_000);
}

fn four_workers_100k(c: &mut Criterion) {
    submit_and_drain(c, "four_workers_100k", 4, 100_000);
}

criterion_group!(
    throughput,
    single_worker_10k,
    four_workers_10k,
    four_workers_100k,
);
criterion_main!(throughput);
