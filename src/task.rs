//! The task contract: a polymorphic, heap-allocated unit of work that is
//! also a node of an intrusive doubly-linked list.
//!
//! Queues never copy a task's body; moving a task between a local deque,
//! the global queue, and a peer's deque is always a pointer move.

use core::fmt;
use core::mem::offset_of;
use core::ptr::NonNull;

use cordyceps::{Linked, list};

/// A runnable unit of work.
///
/// `run` takes `self` by value (through a `Box`) so that a task's state is
/// consumed exactly once, on whichever worker thread ends up executing it.
/// Implementations that fail internally (panic) are the task's own
/// concern: the scheduler does not catch or translate task panics.
pub trait Runnable: Send + 'static {
    fn run(self: Box<Self>);
}

impl<F> Runnable for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)();
    }
}

/// Heap node pairing a boxed [`Runnable`] with the link fields used by
/// [`cordyceps::List`] for O(1), allocation-free batch transfers.
struct Node {
    links: list::Links<Node>,
    inner: Box<dyn Runnable>,
}

/// An owning handle to a queued [`Node`].
///
/// `TaskRef` behaves like a `Box<Node>`: exactly one queue (or one worker's
/// warm slot) holds a `TaskRef` at any moment. Converting it to/from a raw
/// pointer (via the [`Linked`] impl below) is how queues move ownership
/// without copying the task body.
pub struct TaskRef(NonNull<Node>);

// Safety: `Node` contains a `Box<dyn Runnable>` and `Runnable: Send`, and
// `TaskRef` never hands out shared access to the pointee across threads
// without going through a queue's synchronization.
unsafe impl Send for TaskRef {}

impl TaskRef {
    /// Allocates a new task wrapping `runnable`.
    #[must_use]
    pub fn new(runnable: impl Runnable) -> Self {
        let node = Box::new(Node {
            links: list::Links::new(),
            inner: Box::new(runnable),
        });
        Self(NonNull::from(Box::leak(node)))
    }

    /// Runs the task to completion on the calling thread.
    ///
    /// Consumes the handle: the task cannot be observed again afterwards.
    pub fn run(self) {
        // Safety: `self.0` was produced by `Box::leak` in `new` (or by a
        // queue handing ownership back via `Linked::from_ptr`), so
        // reconstructing the `Box` here is the unique, final use of it.
        let node = unsafe { Box::from_raw(self.0.as_ptr()) };
        core::mem::forget(self);
        node.inner.run();
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskRef").field(&self.0).finish()
    }
}

// Safety: `Node` is only ever reachable through a `TaskRef`/`NonNull<Node>`
// obtained via `Box::leak`/`Box::into_raw`, so `into_ptr`/`from_ptr` round
// trip through the same allocation `cordyceps` expects of a `Linked::Handle`.
unsafe impl Linked<list::Links<Node>> for Node {
    type Handle = TaskRef;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        let ptr = handle.0;
        core::mem::forget(handle);
        ptr
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        TaskRef(ptr)
    }

    unsafe fn links(target: NonNull<Self>) -> NonNull<list::Links<Self>> {
        unsafe {
            target
                .map_addr(|addr| addr.checked_add(offset_of!(Node, links)).unwrap())
                .cast()
        }
    }
}

impl Drop for TaskRef {
    fn drop(&mut self) {
        // A `TaskRef` dropped without being `run()` or handed to a queue
        // means its node leaks; queues only ever drop a `TaskRef` that
        // they're discarding on shutdown, in which case they run the
        // destructor through `Box::from_raw` explicitly instead of relying
        // on this impl. This impl exists purely so that `TaskRef` is not
        // silently leak-only if a caller drops one directly.
        tracing::trace!(task = ?self.0, "dropping unexecuted task");
        // Safety: see `run`; this is the same unique reclaim, just via Drop
        // instead of consuming `run`.
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

pub(crate) type List = cordyceps::List<Node>;
