//! Diagnostic counters for scheduler activity.
//!
//! The counters themselves are always present (each is one relaxed
//! `AtomicU64`, negligible to carry), but every increment on the hot path is
//! gated behind the `counters` feature, so a default build never touches
//! them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals of scheduler activity across every worker.
#[derive(Debug, Default)]
pub struct Counters {
    /// Tasks that ran to completion.
    pub tasks_run: AtomicU64,
    /// Successful steals (single or half).
    pub steals_succeeded: AtomicU64,
    /// Steal attempts that found the victim empty.
    pub steals_empty: AtomicU64,
    /// Steal attempts that lost a CAS race and were retried or abandoned.
    pub steals_retried: AtomicU64,
    /// Times a worker offloaded half its local deque to the global queue.
    pub offloads: AtomicU64,
    /// Times a worker parked with no work available.
    pub parks: AtomicU64,
    /// Times the periodic fairness poll found and took a global-queue task.
    pub fairness_hits: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tasks_run(&self) -> u64 {
        self.tasks_run.load(Ordering::Relaxed)
    }

    pub fn steals_succeeded(&self) -> u64 {
        self.steals_succeeded.load(Ordering::Relaxed)
    }

    pub fn steals_empty(&self) -> u64 {
        self.steals_empty.load(Ordering::Relaxed)
    }

    pub fn steals_retried(&self) -> u64 {
        self.steals_retried.load(Ordering::Relaxed)
    }

    pub fn offloads(&self) -> u64 {
        self.offloads.load(Ordering::Relaxed)
    }

    pub fn parks(&self) -> u64 {
        self.parks.load(Ordering::Relaxed)
    }

    pub fn fairness_hits(&self) -> u64 {
        self.fairness_hits.load(Ordering::Relaxed)
    }
}
