//! The searcher-permit throttle: bounds how many workers may simultaneously
//! be in the "actively searching for work" phase of the run-loop (stealing,
//! polling the global queue) versus parked.
//!
//! This is a direct port of the original scheduler's `Throttler`: a
//! counting semaphore capped at `max_searchers`, plus a park/wake path for
//! workers that find no work and no permit available.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::loom::sync::{Condvar, Mutex};

struct Waiting {
    parked_count: usize,
}

/// Bounds concurrent searchers and parks workers that have nothing to do.
pub struct Throttler {
    max_searchers: usize,
    searchers_count: AtomicUsize,
    waiting: Mutex<Waiting>,
    work_available: Condvar,
    work_hint: AtomicBool,
}

impl Throttler {
    pub fn new(max_searchers: usize) -> Self {
        Self {
            max_searchers: max_searchers.max(1),
            searchers_count: AtomicUsize::new(0),
            waiting: Mutex::new(Waiting { parked_count: 0 }),
            work_available: Condvar::new(),
            work_hint: AtomicBool::new(false),
        }
    }

    /// Attempts to acquire a search permit. Fails (returns `None`) once
    /// `max_searchers` are already searching.
    pub fn try_acquire_permit(&self) -> Option<SearchPermit<'_>> {
        let mut current = self.searchers_count.load(Ordering::Relaxed);
        loop {
            if current >= self.max_searchers {
                return None;
            }
            match self.searchers_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(SearchPermit { host: Some(self) }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Parks the calling thread until `work_hint` is set by
    /// [`Throttler::notify_work_available`] or `stop_waiting` returns true.
    pub fn park(&self, mut stop_waiting: impl FnMut() -> bool) {
        let mut guard = self.waiting.lock().unwrap();
        guard.parked_count += 1;
        while !stop_waiting() && !self.work_hint.load(Ordering::Acquire) {
            guard = self.work_available.wait(guard).unwrap();
        }
        guard.parked_count -= 1;
        self.work_hint.store(false, Ordering::Release);
    }

    /// Called when new work appears. If any worker is already searching,
    /// it will find the work on its own, so this is a no-op. Otherwise, if
    /// a worker is parked, it is woken via the work hint.
    pub fn notify_work_available(&self) {
        if self.searchers_count.load(Ordering::Acquire) > 0 {
            return;
        }
        let guard = self.waiting.lock().unwrap();
        if guard.parked_count > 0 {
            self.work_hint.store(true, Ordering::Release);
            drop(guard);
            self.work_available.notify_one();
        }
    }

    /// Wakes every parked worker unconditionally; used during shutdown so
    /// parked workers re-check `stop_waiting` and exit their run-loops.
    pub fn notify_all(&self) {
        let _guard = self.waiting.lock().unwrap();
        self.work_available.notify_all();
    }

    pub(crate) fn searchers_count(&self) -> usize {
        self.searchers_count.load(Ordering::Acquire)
    }

    pub(crate) fn parked_count(&self) -> usize {
        self.waiting.lock().unwrap().parked_count
    }

    fn release_permit(&self) {
        self.searchers_count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A move-only, RAII search permit. Dropping it (including via
/// [`SearchPermit::release`]) returns the slot to the throttle.
pub struct SearchPermit<'a> {
    host: Option<&'a Throttler>,
}

impl<'a> SearchPermit<'a> {
    /// Explicitly releases the permit. Equivalent to dropping it; provided
    /// for call sites that want to make the release point visible.
    pub fn release(mut self) {
        self.release_mut();
    }

    fn release_mut(&mut self) {
        if let Some(host) = self.host.take() {
            host.release_permit();
        }
    }
}

impl Drop for SearchPermit<'_> {
    fn drop(&mut self) {
        self.release_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_are_capped() {
        let throttler = Throttler::new(2);
        let p1 = throttler.try_acquire_permit();
        let p2 = throttler.try_acquire_permit();
        let p3 = throttler.try_acquire_permit();
        assert!(p1.is_some());
        assert!(p2.is_some());
        assert!(p3.is_none());
        assert_eq!(throttler.searchers_count(), 2);
    }

    #[test]
    fn dropping_a_permit_frees_a_slot() {
        let throttler = Throttler::new(1);
        {
            let _p = throttler.try_acquire_permit().unwrap();
            assert!(throttler.try_acquire_permit().is_none());
        }
        assert_eq!(throttler.searchers_count(), 0);
        assert!(throttler.try_acquire_permit().is_some());
    }

    #[test]
    fn park_wakes_on_notify() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool as StdAtomicBool;

        let throttler = Arc::new(Throttler::new(1));
        let woke = Arc::new(StdAtomicBool::new(false));
        let t = {
            let throttler = throttler.clone();
            let woke = woke.clone();
            std::thread::spawn(move || {
                throttler.park(|| false);
                woke.store(true, Ordering::SeqCst);
            })
        };
        // Give the parking thread a chance to actually park.
        std::thread::sleep(std::time::Duration::from_millis(20));
        throttler.notify_work_available();
        t.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn park_wakes_on_stop_waiting() {
        let throttler = Throttler::new(1);
        let mut calls = 0;
        throttler.park(|| {
            calls += 1;
            calls > 1
        });
        assert_eq!(calls, 2);
    }
}
