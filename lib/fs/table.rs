//! Id-keyed table of every materialized entry.

use std::sync::Arc;

use crate::fs::FileId;
use crate::fs::entry::VirtualEntry;

/// Concurrent `FileId -> VirtualEntry` map.
///
/// An id has at most one live entry. [`EntryTable::insert_new`] refuses to
/// replace an existing one; the caller turns that into a
/// [`DuplicateMaterialization`](crate::fs::CorruptionError::DuplicateMaterialization).
pub struct EntryTable {
    entries: scc::HashMap<FileId, Arc<VirtualEntry>>,
}

impl Default for EntryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: scc::HashMap::new(),
        }
    }

    /// Entry for `id`, if materialized.
    #[must_use]
    pub fn get(&self, id: FileId) -> Option<Arc<VirtualEntry>> {
        self.entries.read_sync(&id, |_, v| Arc::clone(v))
    }

    /// Whether `id` is materialized.
    #[must_use]
    pub fn contains(&self, id: FileId) -> bool {
        self.entries.read_sync(&id, |_, _| ()).is_some()
    }

    /// Inserts a fresh entry. Hands the entry back if its id is taken.
    pub fn insert_new(&self, entry: Arc<VirtualEntry>) -> Result<(), Arc<VirtualEntry>> {
        self.entries
            .insert_sync(entry.id(), entry)
            .map_err(|(_, rejected)| rejected)
    }

    /// Drops the entry for `id`.
    pub fn remove(&self, id: FileId) -> Option<Arc<VirtualEntry>> {
        self.entries.remove_sync(&id).map(|(_, v)| v)
    }

    /// Number of materialized entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
