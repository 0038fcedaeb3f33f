//! Executor configuration: per-worker local queue capacity, the LIFO
//! warm-slot streak cap, and the fairness period, plus the two named
//! presets the original scheduler shipped (`default`, `tiny`).

use core::fmt;

/// Tunables for an [`crate::executor::Executor`].
///
/// Constructed via [`Config::default`], [`Config::tiny`], or
/// [`Config::builder`] for anything in between.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Number of worker (OS) threads. Must be at least 1.
    pub worker_count: usize,
    /// Capacity of each worker's local deque. Must be a power of two.
    pub local_queue_capacity: usize,
    /// How many consecutive tasks a worker may run straight out of its LIFO
    /// warm slot before being forced to check the local deque/global queue
    /// instead, bounding unfairness from a hot producer/consumer pair.
    pub max_lifo_streak: u32,
    /// Every `fairness_period`-th trip through the run-loop, a worker polls
    /// the global queue before anything else, so globally-submitted tasks
    /// are not starved by workers that always find local work.
    pub fairness_period: u32,
}

impl Config {
    /// The production preset: matches the original scheduler's
    /// `DefaultConfig` (8192-entry local queues, a streak cap of 23, and a
    /// fairness period of 61).
    pub fn default_for(worker_count: usize) -> Self {
        Self {
            worker_count,
            local_queue_capacity: 8192,
            max_lifo_streak: 23,
            fairness_period: 61,
        }
    }

    /// The original scheduler's `TinyConfig`: small, fast-to-overflow
    /// queues, useful for exercising offload/steal paths in tests without
    /// pushing thousands of tasks first.
    pub fn tiny(worker_count: usize) -> Self {
        Self {
            worker_count,
            local_queue_capacity: 256,
            max_lifo_streak: 2,
            fairness_period: 31,
        }
    }

    pub fn builder(worker_count: usize) -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default_for(worker_count),
        }
    }

    /// Checks the invariants [`crate::executor::Executor::new`] relies on
    /// holding before any thread or deque is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::WorkerCountZero);
        }
        if !self.local_queue_capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo {
                requested: self.local_queue_capacity,
            });
        }
        Ok(())
    }
}

/// Builder for [`Config`], seeded from [`Config::default_for`].
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn local_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.local_queue_capacity = capacity;
        self
    }

    pub fn max_lifo_streak(mut self, streak: u32) -> Self {
        self.config.max_lifo_streak = streak;
        self
    }

    pub fn fairness_period(mut self, period: u32) -> Self {
        self.config.fairness_period = period;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Errors returned by [`Config::validate`] / [`crate::executor::Executor::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// An executor was requested with zero worker threads.
    WorkerCountZero,
    /// The local queue capacity was not a power of two.
    CapacityNotPowerOfTwo { requested: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WorkerCountZero => {
                write!(f, "worker_count must be at least 1")
            }
            ConfigError::CapacityNotPowerOfTwo { requested } => {
                write!(
                    f,
                    "local_queue_capacity must be a power of two, got {requested}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
