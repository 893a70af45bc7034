//! Structural modification counter.
//!
//! Every change to the shape of a cached tree (a child materialized, inserted,
//! removed, renamed, or a whole listing replaced) bumps this counter once.
//! Consumers that cache anything derived from the tree compare the value they
//! saw against [`ModificationCounter::get`] to detect staleness.

use std::sync::{Arc, OnceLock};

use crate::sync::atomic::{AtomicU64, Ordering};

/// Monotonic version number for tree topology.
#[derive(Debug, Default)]
pub struct ModificationCounter {
    count: AtomicU64,
}

impl ModificationCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// The process-wide counter shared by every cache that was not given its own.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ModificationCounter>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Records one structural modification and returns the new value.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}
