//! Directory-children cache over a persistent file record store.
/// Bulk add/remove by sorted merge.
pub mod batch;
/// Ordering verification for diagnostic builds.
pub mod consistency;
/// Cached file entries and per-directory child state.
pub mod entry;
/// Error types.
pub mod error;
/// Synthetic creation events and the refresh queue contract.
pub mod refresh;
/// Single-name resolution and full-listing reconciliation.
pub mod resolver;
/// Contracts consumed from the record store and the file system delegate.
pub mod store;
/// Id-keyed table of materialized entries.
pub mod table;
/// The public cache façade.
pub mod vfs;

use std::fmt;

use bitflags::bitflags;

pub use entry::{DirectoryData, VirtualEntry};
pub use error::{CorruptionError, VfsError};
pub use store::{FakeChild, FileRecordStore, FileSystemDelegate, ListedChild};
pub use vfs::VfsCache;

/// Raw record id as the store reports it. Non-positive means "no such record".
pub type RawRecordId = i64;

/// Handle of a record in the [`FileRecordStore`]. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    /// Validates a raw store id. Returns `None` for zero, negative or
    /// out-of-range values.
    #[must_use]
    pub fn new(raw: RawRecordId) -> Option<Self> {
        u32::try_from(raw).ok().filter(|&v| v > 0).map(Self)
    }

    /// Wraps a raw id the caller knows to be positive.
    #[must_use]
    pub const fn new_unchecked(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<FileId> for RawRecordId {
    fn from(id: FileId) -> Self {
        Self::from(id.0)
    }
}

bitflags! {
    /// Attribute bits of a file record, as stored by the [`FileRecordStore`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        /// The record is a directory.
        const DIRECTORY = 1 << 0;
        /// The record is a symbolic link.
        const SYMLINK   = 1 << 1;
        /// Neither a regular file, a directory nor a symlink (fifo, socket, device).
        const SPECIAL   = 1 << 2;
        /// The record is writable by the current user.
        const WRITABLE  = 1 << 3;
        /// The record is hidden.
        const HIDDEN    = 1 << 4;
    }
}

bitflags! {
    /// Flags carried by a materialized [`VirtualEntry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// Copied from [`FileAttributes::SYMLINK`].
        const SYMLINK  = 1 << 0;
        /// Copied from [`FileAttributes::SPECIAL`].
        const SPECIAL  = 1 << 1;
        /// Copied from [`FileAttributes::WRITABLE`].
        const WRITABLE = 1 << 2;
        /// Copied from [`FileAttributes::HIDDEN`].
        const HIDDEN   = 1 << 3;
        /// The entry needs a refresh.
        const DIRTY    = 1 << 4;
    }
}

impl EntryFlags {
    /// Entry flags mirrored from a store attribute bitmask.
    #[must_use]
    pub fn from_attributes(attrs: FileAttributes) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::SYMLINK, attrs.contains(FileAttributes::SYMLINK));
        flags.set(Self::SPECIAL, attrs.contains(FileAttributes::SPECIAL));
        flags.set(Self::WRITABLE, attrs.contains(FileAttributes::WRITABLE));
        flags.set(Self::HIDDEN, attrs.contains(FileAttributes::HIDDEN));
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_rejects_non_positive() {
        assert!(FileId::new(0).is_none());
        assert!(FileId::new(-3).is_none());
        assert!(FileId::new(i64::from(u32::MAX) + 1).is_none());
        assert_eq!(FileId::new(42).map(FileId::get), Some(42));
    }

    #[test]
    fn entry_flags_ignore_directory_bit() {
        let flags = EntryFlags::from_attributes(
            FileAttributes::DIRECTORY | FileAttributes::HIDDEN | FileAttributes::WRITABLE,
        );
        assert_eq!(flags, EntryFlags::HIDDEN | EntryFlags::WRITABLE);
    }
}
