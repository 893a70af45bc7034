//! Cache configuration.
//!
//! The library only defines the settings; loading them from a file is the
//! embedding application's concern.

use serde::{Deserialize, Serialize};

fn default_batch_merge_threshold() -> usize {
    3
}

/// Tunables for a [`VfsCache`](crate::fs::vfs::VfsCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Verify child ordering after every mutation and treat reconciliation
    /// anomalies as hard errors. O(n) per mutation, so off by default.
    #[serde(default)]
    pub check_consistency: bool,

    /// Batches of at most this many children are added one at a time instead
    /// of through the sorted merge.
    #[serde(default = "default_batch_merge_threshold")]
    pub batch_merge_threshold: usize,

    /// Overrides the file system delegate's policy for marking newly
    /// materialized children dirty.
    #[serde(default)]
    pub mark_new_files_dirty: Option<bool>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            check_consistency: false,
            batch_merge_threshold: default_batch_merge_threshold(),
            mark_new_files_dirty: None,
        }
    }
}

impl CacheConfig {
    /// Defaults with consistency checking turned on, for tests and diagnostics.
    #[must_use]
    pub fn diagnostic() -> Self {
        Self {
            check_consistency: true,
            ..Self::default()
        }
    }
}
