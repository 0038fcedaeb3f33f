//! The public entry point: owns the worker pool, the global overflow
//! queue, and the coordinator, and routes external submissions to
//! whichever of those a caller's context calls for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::{Config, ConfigError};
use crate::coordinator::Coordinator;
use crate::deque;
use crate::global::GlobalQueue;
use crate::task::{Runnable, TaskRef};
use crate::worker::{self, Worker};

/// A fixed pool of worker threads executing a stream of submitted tasks.
///
/// Construction validates `config` up front: invalid construction
/// parameters fail atomically, before any thread is spawned. Dropping an
/// `Executor` requests shutdown and joins every worker thread, so it never
/// leaks threads; any tasks still queued at that point are silently
/// discarded -- task lifecycle beyond "ran exactly once or never" is the
/// caller's concern.
pub struct Executor {
    global: Arc<GlobalQueue>,
    coordinator: Arc<Coordinator>,
    handles: Vec<JoinHandle<()>>,
    worker_count: usize,
    counters: Arc<crate::counters::Counters>,
    /// Counts workers still running; shared with every [`Worker`], which
    /// decrements it as the last step before its thread exits. Used by
    /// [`Executor::drain_stragglers`] to rendezvous with in-flight
    /// shutdown-drain offloads before the final join.
    active_workers: Arc<AtomicUsize>,
}

impl Executor {
    /// Builds and starts a pool of `config.worker_count` worker threads,
    /// each with its own local deque of `config.local_queue_capacity` and
    /// a steal handle to every other worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`Config::validate`]; no
    /// thread is spawned and no deque is allocated in that case.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            worker_count = config.worker_count,
            local_queue_capacity = config.local_queue_capacity,
            max_lifo_streak = config.max_lifo_streak,
            fairness_period = config.fairness_period,
            "starting executor"
        );

        let global = Arc::new(GlobalQueue::new());
        let coordinator = Arc::new(Coordinator::new(config.worker_count));
        let counters = Arc::new(crate::counters::Counters::new());
        let active_workers = Arc::new(AtomicUsize::new(config.worker_count));

        let (locals, stealers): (Vec<_>, Vec<_>) = (0..config.worker_count)
            .map(|_| deque::new(config.local_queue_capacity))
            .unzip();

        let handles = locals
            .into_iter()
            .enumerate()
            .map(|(id, local)| {
                let peers = stealers
                    .iter()
                    .enumerate()
                    .filter(|(peer_id, _)| *peer_id != id)
                    .map(|(_, stealer)| stealer.clone())
                    .collect();
                let worker = Worker::new(
                    id,
                    local,
                    peers,
                    global.clone(),
                    coordinator.clone(),
                    config,
                    counters.clone(),
                    active_workers.clone(),
                );
                std::thread::Builder::new()
                    .name(format!("stealpool-worker-{id}"))
                    .spawn(move || worker.run())
                    .expect("failed to spawn scheduler worker thread")
            })
            .collect();

        Ok(Self {
            global,
            coordinator,
            handles,
            worker_count: config.worker_count,
            counters,
            active_workers,
        })
    }

    /// Convenience constructor using [`Config::default_for`] sized to the
    /// number of available hardware threads (minimum 1).
    pub fn with_default_config() -> Result<Self, ConfigError> {
        let worker_count = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(Config::default_for(worker_count))
    }

    /// Number of worker threads in this executor.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether [`Executor::shutdown`] has already been requested (either
    /// explicitly, or because the executor is being dropped).
    pub fn is_shutdown(&self) -> bool {
        self.coordinator.is_shutdown_requested()
    }

    /// Diagnostic counters accumulated across every worker, only present
    /// when built with the `counters` feature.
    #[cfg(feature = "counters")]
    pub fn counters(&self) -> &crate::counters::Counters {
        &self.counters
    }

    /// Submits a task for execution.
    ///
    /// If called from inside a running task on one of this executor's own
    /// worker threads, the task is handed to that worker's warm slot
    /// (cache-hot local scheduling). Otherwise it is pushed to the global
    /// overflow queue and a parked worker (if any) is woken.
    pub fn submit(&self, runnable: impl Runnable) {
        self.submit_ref(TaskRef::new(runnable));
    }

    fn submit_ref(&self, task: TaskRef) {
        match worker::try_schedule_local(task) {
            Some(task) => {
                tracing::trace!("submitting to global queue");
                self.global.push(task);
                self.coordinator.notify_work_available();
            }
            None => {
                tracing::trace!("submitting to current worker's warm slot");
            }
        }
    }

    /// Requests shutdown: every worker observes [`crate::coordinator::SearchDirective::Terminate`]
    /// at its next task-selection point, drains its local deque to the
    /// global queue, and exits its run-loop. Idempotent.
    ///
    /// This does not block; call `drop(executor)` (or let it go out of
    /// scope) to join the worker threads.
    pub fn shutdown(&self) {
        tracing::debug!("shutdown requested");
        self.coordinator.shutdown();
    }

    /// Rendezvous with workers that are still mid-shutdown: each worker
    /// offloads its local deque and warm slot to the global queue (see
    /// `Worker::drain_on_shutdown`) before decrementing `active_workers`, so
    /// this drains whatever lands there and discards it, repeating until
    /// every worker has finished rather than racing a single post-join
    /// sweep against still-running offloads.
    fn drain_stragglers(&self) {
        loop {
            self.global
                .wait_not_empty(|| self.active_workers.load(Ordering::Acquire) == 0);
            while self.global.try_pop().is_some() {}
            if self.active_workers.load(Ordering::Acquire) == 0 {
                break;
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
        self.drain_stragglers();
        for handle in self.handles.drain(..) {
            // A worker thread only returns an error by panicking; propagate
            // that rather than silently swallowing it, matching how the
            // rest of the crate never catches a task's own panics.
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
        tracing::debug!("executor shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config() {
        let err = Executor::new(Config::default_for(0));
        assert_eq!(err.unwrap_err(), ConfigError::WorkerCountZero);
    }

    #[test]
    fn single_worker_runs_all_submitted_tasks_exactly_once() {
        let executor = Executor::new(Config::tiny(1)).unwrap();
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

    #[test]
    fn many_workers_execute_every_task_exactly_once() {
        let executor = Executor::new(Config::tiny(4)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100_000 {
            let counter = counter.clone();
            executor.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(executor);
        assert_eq!(counter.load(Ordering::SeqCst), 100_000);
    }

    #[test]
    fn worker_count_and_shutdown_flag_are_observable() {
        let executor = Executor::new(Config::tiny(3)).unwrap();
        assert_eq!(executor.worker_count(), 3);
        assert!(!executor.is_shutdown());
        executor.shutdown();
        assert!(executor.is_shutdown());
    }
}
