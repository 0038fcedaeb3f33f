//! The per-worker SPMC work-stealing deque: a fixed-capacity, power-of-two
//! ring buffer shared between exactly one owner (the worker thread that
//! pushes and pops) and any number of thieves (other workers that only
//! steal).
//!
//! The algorithm is the Chase-Lev dynamic circular work-stealing deque
//! (Chase & Lev, 2005) in the weak-memory-correct form given by Lê, Pop,
//! Cohen & Nardelli (PPoPP 2013), specialized to a fixed capacity: this
//! deque never resizes, so there is no buffer-swap path. A full local push
//! is handled one level up, in [`crate::worker`], by offloading half the
//! deque to the global queue.
//!
//! `top` is the steal end, `bottom` is the push/pop end. Both are
//! monotonically increasing counters into the ring, never reset; slot
//! indices are `counter & mask`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::loom::sync::atomic::AtomicU64;
use crate::task::TaskRef;

/// Returned by [`Worker::push`] when the local ring is already at capacity.
///
/// The caller (the owning worker) is expected to offload roughly half of
/// the deque to the global queue via [`Worker::offload_half`] and retry.
#[derive(Debug)]
pub struct Full(pub TaskRef);

/// Outcome of a [`Stealer::steal`] attempt.
#[derive(Debug)]
pub enum Loot {
    /// A task was stolen.
    Task(TaskRef),
    /// The deque was empty at the time of the attempt.
    Empty,
    /// Another thief (or the owner's `try_pop`) won a race for the last
    /// element; the caller should retry if it still wants work.
    Retry,
}

struct RingBuffer {
    mask: u64,
    slots: Box<[UnsafeCell<MaybeUninit<TaskRef>>]>,
}

// Safety: slot access is gated by the `top`/`bottom` protocol in `Shared`;
// only one writer (the owner, via `push`/steal-in-progress reads) ever
// touches a given slot index at a time, established by the orderings below.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be a power of two");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            mask: (capacity - 1) as u64,
            slots: slots.into_boxed_slice(),
        }
    }

    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// Safety: caller must hold exclusive (owner-side) access to this index.
    #[allow(clippy::cast_possible_truncation, reason = "masked by self.mask, always < slots.len()")]
    unsafe fn write(&self, index: u64, task: TaskRef) {
        let slot = &self.slots[(index & self.mask) as usize];
        unsafe { (*slot.get()).write(task) };
    }

    /// Safety: caller must be the unique reader of this index (enforced by
    /// the CAS/fence protocol in `Shared::try_pop`/`Stealer::steal`), and
    /// the slot must have been written by a prior `write` not yet read.
    #[allow(clippy::cast_possible_truncation, reason = "masked by self.mask, always < slots.len()")]
    unsafe fn read(&self, index: u64) -> TaskRef {
        let slot = &self.slots[(index & self.mask) as usize];
        unsafe { (*slot.get()).assume_init_read() }
    }
}

struct Shared {
    top: CachePadded<AtomicU64>,
    bottom: CachePadded<AtomicU64>,
    buffer: CachePadded<RingBuffer>,
}

/// Constructs a new deque with the given power-of-two capacity, returning
/// the owner-side handle and a template for producing thief handles.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two. [`crate::config::Config`]
/// validates this before any deque is constructed, so in practice this
/// panic is unreachable outside of direct, unvalidated use of this module.
pub fn new(capacity: usize) -> (Worker, Stealer) {
    let shared = crate::loom::sync::Arc::new(Shared {
        top: CachePadded::new(AtomicU64::new(0)),
        bottom: CachePadded::new(AtomicU64::new(0)),
        buffer: CachePadded::new(RingBuffer::new(capacity)),
    });
    (
        Worker {
            shared: shared.clone(),
        },
        Stealer { shared },
    )
}

/// The owner-side handle to a worker's local deque. Only the worker thread
/// that was handed this `Worker` may call its methods; it is not `Sync`.
pub struct Worker {
    shared: crate::loom::sync::Arc<Shared>,
}

// Safety: a `Worker` is moved to the single thread that owns the deque and
// never shared; it is `Send` so that construction can happen off that
// thread, but deliberately not `Sync`.
unsafe impl Send for Worker {}

impl Worker {
    /// Number of tasks the ring can hold.
    #[allow(clippy::cast_possible_truncation, reason = "mirrors the usize capacity new() was built with")]
    pub fn capacity(&self) -> usize {
        self.shared.buffer.capacity() as usize
    }

    /// Approximate length, for diagnostics only: may be stale the instant
    /// it's read since thieves can concurrently steal.
    #[allow(clippy::cast_possible_truncation, reason = "bounded by capacity, which fits in usize")]
    pub fn len(&self) -> usize {
        let bottom = self.shared.bottom.load(Ordering::Relaxed);
        let top = self.shared.top.load(Ordering::Relaxed);
        bottom.saturating_sub(top) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes a task onto the bottom of the deque.
    ///
    /// Returns `Err(Full(task))` handing the task back if the ring is
    /// already at capacity; the caller should offload and retry.
    pub fn push(&self, task: TaskRef) -> Result<(), Full> {
        let bottom = self.shared.bottom.load(Ordering::Relaxed);
        let top = self.shared.top.load(Ordering::Acquire);
        if bottom.wrapping_sub(top) >= self.shared.buffer.capacity() {
            return Err(Full(task));
        }
        // Safety: `bottom` is exclusively owned by this handle; no thief
        // writes slots, so this write cannot race.
        unsafe { self.shared.buffer.write(bottom, task) };
        // Release fence + release store: publish the slot write before
        // thieves can observe the new `bottom` and attempt to read it.
        crate::loom::sync::atomic::fence(Ordering::Release);
        self.shared.bottom.store(bottom.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pops a task from the bottom of the deque (LIFO from the owner's
    /// perspective), returning `None` if empty.
    pub fn pop(&self) -> Option<TaskRef> {
        let bottom = self.shared.bottom.load(Ordering::Relaxed);
        if bottom == 0 {
            return None;
        }
        let new_bottom = bottom.wrapping_sub(1);
        self.shared.bottom.store(new_bottom, Ordering::Release);
        // Seq-cst fence: forces this thread's bottom-store to become
        // visible to any thief before the following top-load, and
        // vice versa -- the crux of the Chase-Lev correctness argument.
        crate::loom::sync::atomic::fence(Ordering::SeqCst);
        let top = self.shared.top.load(Ordering::Acquire);

        if top < new_bottom {
            // More than one element left; uncontested by thieves.
            Some(unsafe { self.shared.buffer.read(new_bottom) })
        } else if top == new_bottom {
            // Exactly one element left: race the thieves for it.
            let won = self
                .shared
                .top
                .compare_exchange(top, top.wrapping_add(1), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            // Whoever wins or loses, the deque is now empty from the
            // owner's side; normalize `bottom` to match `top`.
            self.shared.bottom.store(top.wrapping_add(1), Ordering::Release);
            if won {
                Some(unsafe { self.shared.buffer.read(new_bottom) })
            } else {
                None
            }
        } else {
            // Already empty before we even decremented; restore bottom.
            self.shared.bottom.store(top, Ordering::Release);
            None
        }
    }

    /// Moves roughly half of the deque's current contents out to `drain`,
    /// returning the number of tasks moved. Used when [`Worker::push`]
    /// reports [`Full`], to make room without blocking.
    ///
    /// Implemented with a CAS on `top` (rather than a plain store) because
    /// thieves may concurrently be stealing from the same end; losing the
    /// race just means fewer tasks were claimed, which is observed through
    /// the return value.
    #[allow(clippy::cast_possible_truncation, reason = "take is at most capacity, which fits in usize")]
    pub fn offload_half(&self, drain: &mut dyn FnMut(TaskRef)) -> usize {
        let bottom = self.shared.bottom.load(Ordering::Relaxed);
        let top = self.shared.top.load(Ordering::Acquire);
        let len = bottom.wrapping_sub(top);
        if len == 0 {
            return 0;
        }
        let take = (len / 2).max(1);
        let new_top = top.wrapping_add(take);
        crate::loom::sync::atomic::fence(Ordering::SeqCst);
        match self
            .shared
            .top
            .compare_exchange(top, new_top, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => {
                for i in top..new_top {
                    // Safety: we just won exclusive claim to [top, new_top)
                    // via the CAS above; no other thief can also have won it.
                    drain(unsafe { self.shared.buffer.read(i) });
                }
                (new_top - top) as usize
            }
            Err(_) => {
                // A thief raced us and moved `top`; back off and let the
                // caller retry `push` on its own terms.
                0
            }
        }
    }

    pub fn stealer(&self) -> Stealer {
        Stealer {
            shared: self.shared.clone(),
        }
    }
}

/// A thief-side handle to a worker's deque. Unlike [`Worker`], `Stealer`
/// is freely `Clone`+`Send`+`Sync`: every other worker holds one for every
/// peer.
#[derive(Clone)]
pub struct Stealer {
    shared: crate::loom::sync::Arc<Shared>,
}

// Safety: stealing only ever reads through the `top`/`bottom` CAS protocol,
// which is correct for any number of concurrent thieves per Chase-Lev.
unsafe impl Send for Stealer {}
unsafe impl Sync for Stealer {}

static_assertions::assert_impl_all!(Stealer: Send, Sync, Clone);
static_assertions::assert_impl_all!(Worker: Send);
static_assertions::assert_not_impl_any!(Worker: Sync);

impl Stealer {
    /// Attempts to steal a single task from the top of the victim's deque.
    pub fn steal(&self) -> Loot {
        let top = self.shared.top.load(Ordering::Acquire);
        crate::loom::sync::atomic::fence(Ordering::SeqCst);
        let bottom = self.shared.bottom.load(Ordering::Acquire);
        if top >= bottom {
            return Loot::Empty;
        }
        self.steal_one(top)
    }

    /// Safety precondition: `top` was just observed with the acquire
    /// load + seq-cst fence pair that precedes every call site below, so
    /// the slot at `top` is either still valid or has already been
    /// claimed by a racing thief/owner (in which case the CAS fails and
    /// the speculative read is discarded via `mem::forget`).
    fn steal_one(&self, top: u64) -> Loot {
        // Safety: the slot at `top` has been published by the owner's
        // `push` (release fence/store of `bottom`) and is only read here
        // under the CAS race below.
        let task = unsafe { self.shared.buffer.read(top) };
        match self.shared.top.compare_exchange(
            top,
            top.wrapping_add(1),
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => Loot::Task(task),
            Err(_) => {
                // We read a slot we didn't win; leak the read rather than
                // drop it, since `task` may have already been handed to
                // another thief or the owner and dropping would double-free.
                core::mem::forget(task);
                Loot::Retry
            }
        }
    }

    /// Attempts to steal roughly half of the victim's deque in one CAS,
    /// handing every claimed task but the first to `drain` and returning
    /// the first as the `Loot::Task` payload. Amortizes stealing overhead
    /// relative to repeated single-task [`Stealer::steal`] calls when a
    /// victim has a long backlog.
    ///
    /// Falls back to single-element semantics when fewer than two tasks
    /// are available, since there is no "half" of one or zero tasks to
    /// claim.
    pub fn steal_half_into(&self, drain: &mut dyn FnMut(TaskRef)) -> Loot {
        let top = self.shared.top.load(Ordering::Acquire);
        crate::loom::sync::atomic::fence(Ordering::SeqCst);
        let bottom = self.shared.bottom.load(Ordering::Acquire);
        if top >= bottom {
            return Loot::Empty;
        }
        let len = bottom.wrapping_sub(top);
        if len < 2 {
            return self.steal_one(top);
        }
        let take = len.div_ceil(2);
        let new_top = top.wrapping_add(take);
        match self
            .shared
            .top
            .compare_exchange(top, new_top, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => {
                // Safety: we just won exclusive claim to [top, new_top)
                // via the CAS above; no other thief can also have won it.
                let first = unsafe { self.shared.buffer.read(top) };
                for i in (top + 1)..new_top {
                    drain(unsafe { self.shared.buffer.read(i) });
                }
                Loot::Task(first)
            }
            Err(_) => Loot::Retry,
        }
    }

    /// Best-effort, possibly-stale emptiness check, used by the worker's
    /// search rounds to skip obviously-empty victims without attempting a
    /// full steal.
    pub fn is_empty(&self) -> bool {
        let top = self.shared.top.load(Ordering::Acquire);
        let bottom = self.shared.bottom.load(Ordering::Acquire);
        top >= bottom
    }
}


/// Model-checked variants of the last-element race, verifying the exact
/// orderings required for correctness under loom's exhaustive interleaving
/// search. Run with `RUSTFLAGS="--cfg loom" cargo test --release --test
/// loom_deque` (or as a `cfg(loom)` unit test target) since loom's
/// exploration is far too slow to run on every `cargo test`.
#[cfg(all(loom, test))]
mod loom_tests {
    use super::*;
    use crate::loom::thread;

    #[test]
    fn owner_pop_races_single_steal_exactly_once() {
        loom::model(|| {
            let (worker, stealer) = new(2);
            worker.push(TaskRef::new(|| {})).unwrap();

            let t = thread::spawn(move || matches!(stealer.steal(), Loot::Task(_)));

            let popped = worker.pop().is_some();
            let stolen = t.join().unwrap();

            assert_eq!(usize::from(popped) + usize::from(stolen), 1);
        });
    }

    #[test]
    fn two_thieves_race_for_a_single_task_exactly_once() {
        loom::model(|| {
            let (worker, stealer) = new(2);
            worker.push(TaskRef::new(|| {})).unwrap();
            let s2 = stealer.clone();

            let t1 = thread::spawn(move || matches!(stealer.steal(), Loot::Task(_)));
            let t2 = thread::spawn(move || matches!(s2.steal(), Loot::Task(_)));

            let a = t1.join().unwrap();
            let b = t2.join().unwrap();
            assert_eq!(usize::from(a) + usize::from(b), 1);
        });
    }

    #[test]
    fn offload_half_and_steal_never_duplicate_a_task() {
        loom::model(|| {
            let (worker, stealer) = new(4);
            worker.push(TaskRef::new(|| {})).unwrap();
            worker.push(TaskRef::new(|| {})).unwrap();

            let t = thread::spawn(move || matches!(stealer.steal(), Loot::Task(_)));

            let mut offloaded = 0usize;
            worker.offload_half(&mut |_| offloaded += 1);
            let remaining = if worker.pop().is_some() { 1 } else { 0 };
            let stolen = usize::from(t.join().unwrap());

            assert_eq!(offloaded + remaining + stolen, 2);
        });
    }
}
