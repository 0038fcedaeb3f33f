//! The per-thread run-loop: task selection priority is a periodic global
//! poll (fairness), the LIFO warm slot (bounded by a streak cap), the local
//! deque, a global-queue drain with local refill, then randomized steal
//! rounds against peers, then parking.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::{Coordinator, SearchDirective};
use crate::deque::{self, Full, Loot};
use crate::global::GlobalQueue;
use crate::task::{List, TaskRef};

thread_local! {
    static CURRENT: Cell<Option<*const Worker>> = const { Cell::new(None) };
}

/// State touched only by the worker thread that owns it: the warm slot,
/// the LIFO streak counter, and the tick counter are plain fields (not
/// atomics) because nothing else ever reaches them -- the deque itself is
/// the only piece of per-worker state other threads touch, and it has its
/// own synchronization.
struct Core {
    local: deque::Worker,
    warm_slot: Cell<Option<TaskRef>>,
    lifo_streak: Cell<u32>,
    tick: Cell<u32>,
}

impl Core {
    /// Places `task` in the warm slot, demoting whatever was there to the
    /// local deque (offloading to the global queue if the deque is full).
    fn schedule(&self, task: TaskRef, shared: &Shared) {
        if let Some(bumped) = self.warm_slot.replace(Some(task)) {
            push_or_offload(&self.local, shared, bumped);
        }
    }

    fn next_local(&self, max_lifo_streak: u32) -> Option<TaskRef> {
        if self.lifo_streak.get() < max_lifo_streak {
            if let Some(task) = self.warm_slot.take() {
                self.lifo_streak.set(self.lifo_streak.get() + 1);
                return Some(task);
            }
        }
        self.lifo_streak.set(0);
        self.local.pop()
    }
}

fn push_or_offload(local: &deque::Worker, shared: &Shared, task: TaskRef) {
    if let Err(Full(task)) = local.push(task) {
        shared.record_offload();
        let mut batch = List::new();
        local.offload_half(&mut |t| batch.push_back(t));
        shared.global.push_batch(&mut batch);
        if let Err(Full(task)) = local.push(task) {
            // Halving didn't make room (every other thief also emptied the
            // deque concurrently, or it started empty); fall back directly.
            shared.global.push(task);
        }
    }
}

struct Shared {
    id: usize,
    stealers: Vec<deque::Stealer>,
    global: Arc<GlobalQueue>,
    coordinator: Arc<Coordinator>,
    config: Config,
    counters: Arc<crate::counters::Counters>,
    /// Counts workers that have not yet finished their shutdown drain.
    /// Decremented by the last thing a worker thread does before exiting;
    /// the worker that brings it to zero wakes
    /// [`crate::executor::Executor::drain_stragglers`]'s rendezvous wait.
    active_workers: Arc<AtomicUsize>,
}

impl Shared {
    #[inline]
    fn record_offload(&self) {
        #[cfg(feature = "counters")]
        crate::counters::Counters::inc(&self.counters.offloads);
    }

    #[inline]
    fn record_task_run(&self) {
        #[cfg(feature = "counters")]
        crate::counters::Counters::inc(&self.counters.tasks_run);
    }

    #[inline]
    fn record_fairness_hit(&self) {
        #[cfg(feature = "counters")]
        crate::counters::Counters::inc(&self.counters.fairness_hits);
    }

    #[inline]
    fn record_park(&self) {
        #[cfg(feature = "counters")]
        crate::counters::Counters::inc(&self.counters.parks);
    }

    #[inline]
    fn record_steal(&self, loot: &Loot) {
        #[cfg(feature = "counters")]
        match loot {
            Loot::Task(_) => crate::counters::Counters::inc(&self.counters.steals_succeeded),
            Loot::Empty => crate::counters::Counters::inc(&self.counters.steals_empty),
            Loot::Retry => crate::counters::Counters::inc(&self.counters.steals_retried),
        }
        #[cfg(not(feature = "counters"))]
        let _ = loot;
    }
}

/// An owned worker, ready to be moved onto its dedicated OS thread and run.
pub struct Worker {
    core: Core,
    shared: Shared,
    rng: fastrand::Rng,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        local: deque::Worker,
        stealers: Vec<deque::Stealer>,
        global: Arc<GlobalQueue>,
        coordinator: Arc<Coordinator>,
        config: Config,
        counters: Arc<crate::counters::Counters>,
        active_workers: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            core: Core {
                local,
                warm_slot: Cell::new(None),
                lifo_streak: Cell::new(0),
                tick: Cell::new(0),
            },
            shared: Shared {
                id,
                stealers,
                global,
                coordinator,
                config,
                counters,
                active_workers,
            },
            rng: fastrand::Rng::new(),
        }
    }

    /// Runs the worker's loop until shutdown is requested and no work
    /// remains to hand off. Consumes `self`: a worker thread runs exactly
    /// one `Worker` for its lifetime.
    pub fn run(mut self) {
        let span = tracing::info_span!("worker", id = self.shared.id);
        let _enter = span.enter();
        CURRENT.with(|c| c.set(Some(&self as *const Worker)));
        tracing::debug!("worker starting");

        loop {
            match self.next_task() {
                Some(task) => {
                    self.shared.record_task_run();
                    let _span = tracing::trace_span!("run_task").entered();
                    task.run();
                }
                None => {
                    if self.shared.coordinator.is_shutdown_requested() {
                        break;
                    }
                }
            }
        }

        CURRENT.with(|c| c.set(None));
        self.drain_on_shutdown();

        // The worker that brings this to zero just finished draining its
        // own leftovers to the global queue; wake the shutdown rendezvous
        // in case it's already parked waiting on an empty queue with
        // nothing left to notify it (see `GlobalQueue::notify_shutdown_waiters`).
        if self.shared.active_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.global.notify_shutdown_waiters();
        }
        tracing::debug!("worker exiting");
    }

    fn next_task(&mut self) -> Option<TaskRef> {
        let tick = self.core.tick.get();
        self.core.tick.set(tick.wrapping_add(1));

        if self.shared.config.fairness_period > 0
            && tick % self.shared.config.fairness_period == 0
        {
            if let Some(task) = self.shared.global.try_pop() {
                tracing::trace!("fairness poll hit global queue");
                self.shared.record_fairness_hit();
                return Some(task);
            }
        }

        if let Some(task) = self.core.next_local(self.shared.config.max_lifo_streak) {
            return Some(task);
        }

        if let Some(task) = self.next_remote_and_refill() {
            return Some(task);
        }

        self.search_for_work()
    }

    fn next_remote_and_refill(&self) -> Option<TaskRef> {
        let task = self.shared.global.try_pop()?;
        let refill = self.core.local.capacity() / 2;
        let local = &self.core.local;
        self.shared
            .global
            .try_pop_batch(refill, &mut |t| push_or_offload(local, &self.shared, t));
        Some(task)
    }

    fn search_for_work(&mut self) -> Option<TaskRef> {
        loop {
            match self.shared.coordinator.acquire_search_permit() {
                SearchDirective::Terminate => return None,
                SearchDirective::Wait => {
                    tracing::trace!("parking");
                    self.shared.record_park();
                    self.shared.coordinator.park_worker();
                    return None;
                }
                SearchDirective::Retry => {
                    crate::loom::thread::yield_now();
                    continue;
                }
                SearchDirective::Search(permit) => {
                    let found = self.steal_rounds();
                    drop(permit);
                    return found;
                }
            }
        }
    }

    /// Four rounds of a randomized-start linear scan over peer stealers,
    /// yielding between rounds to give victims a chance to produce work.
    ///
    /// Each attempt uses [`deque::Stealer::steal_half_into`] rather than a
    /// single-task steal, so a successful steal also refills the thief's
    /// own local deque with the other half of the victim's backlog --
    /// amortizing the cost of the CAS race over many tasks instead of
    /// paying it once per task moved.
    fn steal_rounds(&mut self) -> Option<TaskRef> {
        const ROUNDS: u32 = 4;
        const RETRY_BUDGET: u32 = 8;
        let n = self.shared.stealers.len();
        if n == 0 {
            return None;
        }
        let local = &self.core.local;
        let shared = &self.shared;
        for _ in 0..ROUNDS {
            let start = self.rng.usize(..n);
            let mut retries_left = RETRY_BUDGET;
            let mut offset = 0;
            while offset < n {
                let idx = (start + offset) % n;
                if shared.stealers[idx].is_empty() {
                    offset += 1;
                    continue;
                }
                let loot = shared.stealers[idx].steal_half_into(&mut |t| push_or_offload(local, shared, t));
                shared.record_steal(&loot);
                match loot {
                    Loot::Task(task) => {
                        tracing::trace!(victim = idx, "stole a task");
                        return Some(task);
                    }
                    Loot::Empty => offset += 1,
                    Loot::Retry => {
                        if retries_left == 0 {
                            offset += 1;
                        } else {
                            retries_left -= 1;
                        }
                    }
                }
            }
            crate::loom::thread::yield_now();
        }
        None
    }

    /// Moves the warm slot and every locally-queued task to the global
    /// queue so no work is silently dropped when the worker thread exits.
    fn drain_on_shutdown(&mut self) {
        let mut batch = List::new();
        if let Some(task) = self.core.warm_slot.take() {
            batch.push_back(task);
        }
        while let Some(task) = self.core.local.pop() {
            batch.push_back(task);
        }
        if !batch.is_empty() {
            tracing::debug!("draining remaining local tasks to global queue");
            self.shared.global.push_batch(&mut batch);
        }
    }
}

/// Schedules `task` on the currently-running worker's warm slot if this
/// call is happening on a worker thread; otherwise hands the task back so
/// the caller (the executor facade) can fall back to the global queue.
///
/// This is how a task spawned from inside another task's `run()` ends up
/// favoring its own worker's fast path instead of always crossing to the
/// global queue.
pub(crate) fn try_schedule_local(task: TaskRef) -> Option<TaskRef> {
    CURRENT.with(|c| match c.get() {
        Some(ptr) => {
            // Safety: `ptr` is only ever set to `&self` for the duration of
            // that `Worker::run` call, on the thread running it, and
            // cleared before `run` returns -- so while `Some`, the pointee
            // is alive and this is the thread that owns it.
            let worker = unsafe { &*ptr };
            worker.core.schedule(task, &worker.shared);
            None
        }
        None => Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deque as dq;

    fn make_worker(id: usize, config: Config, peers: Vec<dq::Stealer>) -> (Worker, dq::Stealer) {
        let (local, stealer) = dq::new(config.local_queue_capacity);
        let global = Arc::new(GlobalQueue::new());
        let coordinator = Arc::new(Coordinator::new(1));
        (
            Worker::new(
                id,
                local,
                peers,
                global,
                coordinator,
                config,
                Arc::new(crate::counters::Counters::new()),
                Arc::new(AtomicUsize::new(1)),
            ),
            stealer,
        )
    }

    #[test]
    fn warm_slot_bumps_previous_occupant_to_local_deque() {
        let config = Config::tiny(1);
        let (worker, _stealer) = make_worker(0, config, vec![]);
        worker.core.schedule(TaskRef::new(|| {}), &worker.shared);
        worker.core.schedule(TaskRef::new(|| {}), &worker.shared);
        assert!(worker.core.warm_slot.take().is_some());
        assert_eq!(worker.core.local.len(), 1);
    }

    #[test]
    fn next_local_respects_streak_cap() {
        let config = Config {
            max_lifo_streak: 2,
            ..Config::tiny(1)
        };
        let ran = Arc::new(AtomicUsize::new(0));
        let (mut worker, _stealer) = make_worker(0, config, vec![]);
        for _ in 0..5 {
            let ran = ran.clone();
            worker
                .core
                .local
                .push(TaskRef::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        // Prime the warm slot directly so the first couple of pulls come
        // from it before the streak cap forces a local-deque pop.
        worker.core.warm_slot.set(Some(TaskRef::new(|| {})));
        let first = worker.core.next_local(config.max_lifo_streak);
        assert!(first.is_some());
        assert_eq!(worker.core.lifo_streak.get(), 1);
    }
}
