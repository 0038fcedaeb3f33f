//! The coordinator: wraps a [`Throttler`] with the global shutdown flag and
//! turns "do I have a search permit" into a single decision a worker's
//! run-loop can switch on.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::throttle::{SearchPermit, Throttler};

/// What a worker should do next, as decided by [`Coordinator::acquire_search_permit`].
pub enum SearchDirective<'a> {
    /// A permit was acquired; the worker should run a round of steal
    /// attempts and then return the permit (by dropping it, or via
    /// [`SearchDirective::into_permit`] followed by the permit's own
    /// `release`).
    Search(SearchPermit<'a>),
    /// No permit is available, but work may exist (another worker signaled
    /// one is already searching or recently found some); spin once more
    /// before deciding to park.
    Retry,
    /// No permit, and no sign of pending work; the worker should park.
    Wait,
    /// The executor is shutting down; the worker should exit its run-loop.
    Terminate,
}

impl<'a> SearchDirective<'a> {
    pub fn is_search(&self) -> bool {
        matches!(self, SearchDirective::Search(_))
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, SearchDirective::Terminate)
    }

    /// Consumes a `Search` directive into its permit. Returns `None` for
    /// every other variant.
    pub fn into_permit(self) -> Option<SearchPermit<'a>> {
        match self {
            SearchDirective::Search(permit) => Some(permit),
            _ => None,
        }
    }
}

pub struct Coordinator {
    throttler: Throttler,
    shutdown_requested: AtomicBool,
    work_maybe_available: AtomicBool,
}

impl Coordinator {
    /// `total_workers` sizes the searcher cap at `max(1, total_workers / 2)`,
    /// matching the original scheduler: letting every worker search at once
    /// wastes cycles on redundant contention, but at least one searcher
    /// must always be permitted.
    pub fn new(total_workers: usize) -> Self {
        let max_searchers = if total_workers > 1 {
            total_workers / 2
        } else {
            1
        };
        Self {
            throttler: Throttler::new(max_searchers),
            shutdown_requested: AtomicBool::new(false),
            work_maybe_available: AtomicBool::new(false),
        }
    }

    /// Tries to acquire a search permit, returning the directive a worker's
    /// run-loop should act on.
    pub fn acquire_search_permit(&self) -> SearchDirective<'_> {
        if self.shutdown_requested.load(Ordering::Acquire) {
            return SearchDirective::Terminate;
        }
        match self.throttler.try_acquire_permit() {
            Some(permit) => SearchDirective::Search(permit),
            None => {
                if self.work_maybe_available.swap(false, Ordering::AcqRel) {
                    SearchDirective::Retry
                } else {
                    SearchDirective::Wait
                }
            }
        }
    }

    /// Parks the calling worker until work appears or shutdown is
    /// requested.
    pub fn park_worker(&self) {
        self.throttler
            .park(|| self.shutdown_requested.load(Ordering::Acquire));
    }

    /// Signals that new work has appeared (a task was submitted, or a
    /// worker offloaded to the global queue). If a searcher is already
    /// active it will find the work itself; otherwise a parked worker is
    /// woken, or the hint is left for the next permit-acquisition attempt.
    pub fn notify_work_available(&self) {
        if self.throttler.searchers_count() > 0 {
            self.work_maybe_available.store(true, Ordering::Release);
            return;
        }
        if self.throttler.parked_count() > 0 {
            self.throttler.notify_work_available();
        } else {
            self.work_maybe_available.store(true, Ordering::Release);
        }
    }

    /// Requests shutdown and wakes every parked worker so they can observe
    /// it promptly instead of waiting for the next spurious wakeup.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        self.throttler.notify_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_takes_priority_over_permits() {
        let coord = Coordinator::new(4);
        coord.shutdown();
        assert!(coord.acquire_search_permit().is_terminate());
    }

    #[test]
    fn single_worker_gets_at_least_one_searcher() {
        let coord = Coordinator::new(1);
        let directive = coord.acquire_search_permit();
        assert!(directive.is_search());
    }

    #[test]
    fn second_searcher_beyond_cap_retries_or_waits() {
        let coord = Coordinator::new(2);
        let _d1 = coord.acquire_search_permit().into_permit().unwrap();
        match coord.acquire_search_permit() {
            SearchDirective::Wait => {}
            SearchDirective::Retry => {}
            _ => panic!("expected Wait or Retry once the only permit is held"),
        }
    }

    #[test]
    fn notify_is_a_no_op_when_a_searcher_is_already_active() {
        let coord = Coordinator::new(4);
        let _permit = coord.acquire_search_permit().into_permit().unwrap();
        // A searcher is active, so this should not need to wake anyone;
        // it just records the hint for whoever asks next.
        coord.notify_work_available();
        assert!(!coord.is_shutdown_requested());
    }
}
