//! `stealpool` -- the core of a work-stealing task scheduler: a fixed pool
//! of worker threads that cooperatively execute externally-submitted
//! tasks, balancing load through per-worker local deques, inter-worker
//! stealing, and a shared global overflow queue, with a parking
//! coordinator that throttles the number of simultaneously-searching
//! thieves.
//!
//! This crate is the scheduler core only: task containers, submission
//! façades, and observability beyond `tracing` spans/events live one layer
//! up and are out of scope here. See each module's docs for its piece of
//! the whole:
//!
//! - [`task`] -- the runnable contract and intrusive list linkage.
//! - [`deque`] -- the per-worker SPMC lock-free work-stealing deque.
//! - [`global`] -- the unbounded mutex-guarded overflow queue.
//! - [`throttle`] -- the searcher-permit semaphore and parking primitive.
//! - [`coordinator`] -- the decision layer above the throttle.
//! - [`worker`] -- the per-thread run-loop.
//! - [`config`] -- tunables and construction-time validation.
//! - [`executor`] -- the public entry point tying everything together.

pub mod config;
pub mod coordinator;
pub mod counters;
pub mod deque;
pub mod executor;
pub mod global;
mod loom;
pub mod task;
pub mod throttle;
mod worker;

pub use config::{Config, ConfigError};
pub use executor::Executor;
pub use task::{Runnable, TaskRef};
