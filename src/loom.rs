//! Indirection over `std::sync`/`std::thread` vs. `loom`'s shadow
//! implementations, so the lock-free collections in this crate can be
//! model-checked under `cfg(loom)` without duplicating their logic.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) mod sync {
            pub(crate) use loom::sync::atomic;
            pub(crate) use loom::sync::atomic::fence;
            pub(crate) use loom::sync::{Arc, Condvar, Mutex};
        }

        pub(crate) mod thread {
            pub(crate) use loom::thread::yield_now;
        }
    } else {
        pub(crate) mod sync {
            pub(crate) use std::sync::atomic;
            pub(crate) use std::sync::atomic::fence;
            pub(crate) use std::sync::{Arc, Condvar, Mutex};
        }

        pub(crate) mod thread {
            pub(crate) use std::thread::yield_now;
        }
    }
}
