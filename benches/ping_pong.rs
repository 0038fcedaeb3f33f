use std::sync::mpsc;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use stealpool::{Config, Executor};

/// Bounces a token through a chain of re-submitting tasks `hops` times,
/// then signals completion over a channel. Each task re-submits its
/// successor, exercising the warm-slot fast path and its
/// producer-consumer cache locality.
fn bounce(executor: &'static Executor, remaining: usize, tx: Arc<mpsc::Sender<()>>) {
    if remaining == 0 {
        let _ = tx.send(());
        return;
    }
    executor.submit(move || {
        bounce(executor, remaining - 1, tx);
    });
}

fn ping_pong(executor: &'static Executor, hops: usize) {
    let (tx, rx) = mpsc::channel::<()>();
    bounce(executor, hops, Arc::new(tx));
    rx.recv().unwrap();
}

fn ping_pong_10k_single_worker(c: &mut Criterion) {
    let executor: &'static Executor =
        Box::leak(Box::new(Executor::new(Config::default_for(1)).unwrap()));
    c.bench_function("ping_pong_10k_single_worker", |b| {
        b.iter(|| ping_pong(executor, 10_000));
    });
}

fn ping_pong_10k_four_workers(c: &mut Criterion) {
    let executor: &'static Executor =
        Box::leak(Box::new(Executor::new(Config::default_for(4)).unwrap()));
    c.bench_function("ping_pong_10k_four_workers", |b| {
        b.iter(|| ping_pong(executor, 10_000));
    });
}

criterion_group!(ping_pong_bench, ping_pong_10k_single_worker, ping_pong_10k_four_workers);
criterion_main!(ping_pong_bench);
