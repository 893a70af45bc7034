//! Synthetic creation events and the refresh queue contract.
//!
//! Refresh machinery lives outside the cache. The cache only reports two
//! things to it: a child it discovered on disk that the cache had recorded as
//! absent ([`CreateEvent`]), and a cached child whose type no longer matches
//! the disk (`refresh`).

use crate::fs::FileId;
use crate::fs::entry::VirtualEntry;

/// A child that exists on disk although the cache had it as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEvent {
    /// Directory receiving the child.
    pub parent: FileId,
    /// Canonical spelling of the child's name.
    pub name: String,
    /// Whether the child is a directory on disk.
    pub is_directory: bool,
}

/// Receiver of refresh requests.
pub trait RefreshQueue: Send + Sync {
    /// Called after the cache applied `event` to its own state.
    fn process_create(&self, event: &CreateEvent);

    /// Asks for `entry` to be refreshed from disk. The cache re-resolves the
    /// entry's name right after this returns.
    fn refresh(&self, entry: &VirtualEntry);
}

/// Queue that drops every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefreshQueue;

impl RefreshQueue for NoopRefreshQueue {
    fn process_create(&self, _event: &CreateEvent) {}

    fn refresh(&self, _entry: &VirtualEntry) {}
}
