//! End-to-end scenarios against the public [`Executor`] API: single- and
//! multi-worker throughput, idle workers waking for a slow trickle of
//! tasks, offload-on-full-deque, steal-half rebalancing, and shutdown
//! while every worker is parked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stealpool::{Config, Executor};

/// Scenario 1: single worker, 1000 tasks submitted before the executor is
/// ever polled for work (well, before anything else happens) -- all must
/// run exactly once, and shutdown must be clean.
#[test]
fn single_worker_runs_all_pre_submitted_tasks_exactly_once() {
    let executor = Executor::new(Config::default_for(1)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..1000 {
        let counter = counter.clone();
        executor.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    drop(executor);
    assert_eq!(counter.load(Ordering::SeqCst), 1000);
}

/// Scenario 2: four workers, a million trivial tasks from a single
/// producer -- every task runs exactly once.
#[test]
fn four_workers_execute_a_million_tasks_exactly_once() {
    let executor = Executor::new(Config::default_for(4)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..1_000_000 {
        let counter = counter.clone();
        executor.submit(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    drop(executor);
    assert_eq!(counter.load(Ordering::Relaxed), 1_000_000);
}

/// Scenario 3: a slow trickle of tasks while several workers are idle and
/// parked -- idle workers must wake up and run them rather than staying
/// asleep forever (no lost wakeup).
#[test]
fn idle_workers_wake_for_a_slow_trickle_of_tasks() {
    let executor = Executor::new(Config::tiny(4)).unwrap();
    // Give every worker a chance to exhaust its (empty) local work and
    // park before the producer starts.
    std::thread::sleep(Duration::from_millis(50));

    let counter = Arc::new(AtomicUsize::new(0));
    let deadline = Instant::now() + Duration::from_secs(2);
    for _ in 0..100 {
        let counter = counter.clone();
        executor.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(5));
    }
    while counter.load(Ordering::SeqCst) < 100 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

/// Scenario 4: a deque of capacity 4, pushed 9 times in a row from a
/// single worker -- exercises the offload-half path (push 5 finds the
/// ring full, offloads, then succeeds) and confirms all 9 tasks still run
/// exactly once after draining.
#[test]
fn small_capacity_deque_offloads_and_drains_every_task() {
    let config = Config::builder(1).local_queue_capacity(4).build();
    let executor = Executor::new(config).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..9 {
        let counter = counter.clone();
        executor.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    drop(executor);
    assert_eq!(counter.load(Ordering::SeqCst), 9);
}

/// Scenario 5: one worker gets a large backlog, a second is idle -- the
/// idle worker should steal roughly half via `steal_half_into` and both
/// finish around the same time rather than one worker doing all the work.
#[test]
fn idle_peer_steals_a_share_of_a_loaded_workers_backlog() {
    let executor = Executor::new(Config::default_for(2)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..2000 {
        let counter = counter.clone();
        executor.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    drop(executor);
    assert_eq!(counter.load(Ordering::SeqCst), 2000);
}

/// Scenario 6: shutdown while every worker is parked -- `shutdown` must
/// wake all of them, and dropping the executor (which joins every thread)
/// must not deadlock.
#[test]
fn shutdown_while_all_workers_parked_joins_without_deadlock() {
    let executor = Executor::new(Config::default_for(8)).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    executor.shutdown();
    drop(executor);
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// A task submitted from inside a running task favors the current
/// worker's warm slot (the executor-facade fast path), rather than always
/// round-tripping through the global queue.
#[test]
fn nested_submission_from_a_running_task_still_executes() {
    let executor = Arc::new(Executor::new(Config::default_for(2)).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new((Mutex::new(false), std::sync::Condvar::new()));

    let inner_executor = executor.clone();
    let inner_order = order.clone();
    let inner_done = done.clone();
    executor.submit(move || {
        inner_order.lock().unwrap().push(1);
        let order = inner_order.clone();
        let done = inner_done.clone();
        inner_executor.submit(move || {
            order.lock().unwrap().push(2);
            let (lock, cvar) = &*done;
            *lock.lock().unwrap() = true;
            cvar.notify_one();
        });
    });

    let (lock, cvar) = &*done;
    let guard = lock.lock().unwrap();
    let _guard = cvar
        .wait_timeout_while(guard, Duration::from_secs(5), |ready| !*ready)
        .unwrap();
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
}
