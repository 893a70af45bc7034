//! Contracts the cache consumes from its collaborators.
//!
//! The [`FileRecordStore`] is the authoritative, persistent database of file
//! records. The [`FileSystemDelegate`] answers questions about the live file
//! system the records describe. Both are expected to be fast local lookups;
//! the cache never retries them and never cancels them.

use std::sync::Arc;

use crate::fs::entry::VirtualEntry;
use crate::fs::{FileAttributes, FileId, RawRecordId};

/// One `(name, id)` pair of a full directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedChild {
    /// Persisted spelling of the child's name.
    pub name: String,
    /// Record id of the child.
    pub id: FileId,
}

impl ListedChild {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, id: FileId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// A child that has not been materialized, identified by parent and name.
///
/// Handed to the delegate when the cache needs facts about a name it has no
/// entry for yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeChild<'a> {
    /// Directory the child would live in.
    pub parent: FileId,
    /// Name as currently known to the cache.
    pub name: &'a str,
}

/// The persistent record store backing the cache.
pub trait FileRecordStore: Send + Sync {
    /// Resolve, or allocate, the record id of `name` under `parent`.
    ///
    /// A non-positive result means the child does not exist.
    fn id_for(&self, parent: FileId, name: &str, delegate: &dyn FileSystemDelegate)
    -> RawRecordId;

    /// Persisted name of a record, if the record exists.
    fn name_of(&self, id: FileId) -> Option<String>;

    /// Attribute bits of a record.
    fn attributes_of(&self, id: FileId) -> FileAttributes;

    /// Complete child listing of `parent`, in no particular order.
    fn list_all(&self, parent: FileId) -> Vec<ListedChild>;

    /// Names of the children persisted for `parent` so far, without listing
    /// the live file system.
    fn list_persisted(&self, parent: FileId) -> Vec<String>;

    /// Whether the children of `parent` were ever listed or looked up.
    fn were_children_ever_listed(&self, parent: FileId) -> bool;

    /// Whether the store holds the complete child list of `parent`.
    fn are_children_fully_loaded(&self, parent: FileId) -> bool;
}

/// Live file-system facts the cache needs but the store does not keep.
pub trait FileSystemDelegate: Send + Sync {
    /// Whether names in this file system are case sensitive.
    fn is_case_sensitive(&self) -> bool;

    /// The true on-disk spelling of `child`. Returns the given name when the
    /// file does not exist; an empty string means the name is unusable.
    fn canonical_spelling(&self, child: &FakeChild<'_>) -> String;

    /// Live attributes of `child`, or `None` if it does not exist on disk.
    fn attributes(&self, child: &FakeChild<'_>) -> Option<FileAttributes>;

    /// Whether the live file behind `entry` is currently a directory.
    fn is_directory(&self, entry: &VirtualEntry) -> bool;

    /// Policy: newly materialized children start out dirty.
    fn mark_new_files_as_dirty(&self) -> bool {
        false
    }
}

/// Why an [`AccessPolicy`] refused an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied(pub String);

/// Hook run on every freshly resolved non-directory child, once it is part of
/// the cache.
pub trait AccessPolicy: Send + Sync {
    /// Accept or refuse `entry`.
    fn check_access(&self, entry: &VirtualEntry) -> Result<(), AccessDenied>;
}

/// Policy that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check_access(&self, _entry: &VirtualEntry) -> Result<(), AccessDenied> {
        Ok(())
    }
}

impl<T: FileRecordStore + ?Sized> FileRecordStore for Arc<T> {
    fn id_for(
        &self,
        parent: FileId,
        name: &str,
        delegate: &dyn FileSystemDelegate,
    ) -> RawRecordId {
        (**self).id_for(parent, name, delegate)
    }

    fn name_of(&self, id: FileId) -> Option<String> {
        (**self).name_of(id)
    }

    fn attributes_of(&self, id: FileId) -> FileAttributes {
        (**self).attributes_of(id)
    }

    fn list_all(&self, parent: FileId) -> Vec<ListedChild> {
        (**self).list_all(parent)
    }

    fn list_persisted(&self, parent: FileId) -> Vec<String> {
        (**self).list_persisted(parent)
    }

    fn were_children_ever_listed(&self, parent: FileId) -> bool {
        (**self).were_children_ever_listed(parent)
    }

    fn are_children_fully_loaded(&self, parent: FileId) -> bool {
        (**self).are_children_fully_loaded(parent)
    }
}
