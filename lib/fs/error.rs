//! Error types for cache operations.
//!
//! Normal "no such child" outcomes are not errors: resolvers return
//! `Ok(None)`. Errors are reserved for misuse of an invalidated handle, for
//! operations a directory cannot support, and for index corruption.

use std::fmt;

use thiserror::Error;

use crate::fs::FileId;

/// Errors surfaced by [`VfsCache`](crate::fs::vfs::VfsCache) operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The handle refers to an entry that was invalidated or never materialized.
    #[error("stale handle {id}: entry is no longer valid")]
    StaleHandle {
        /// The invalid handle.
        id: FileId,
    },

    /// A directory operation was attempted on a non-directory entry.
    #[error("{id} is not a directory")]
    NotADirectory {
        /// The offending entry.
        id: FileId,
    },

    /// A directory cannot be read or written as a byte stream.
    #[error("{op} must not be called against directory {id}")]
    UnsupportedOperation {
        /// The rejected operation.
        op: &'static str,
        /// The directory it was called on.
        id: FileId,
    },

    /// The access policy refused a freshly resolved child.
    #[error("access to {id} denied: {reason}")]
    AccessDenied {
        /// The refused child.
        id: FileId,
        /// Policy-provided explanation.
        reason: String,
    },

    /// The cache and the store have diverged. Never retried.
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
}

/// Internal-consistency faults. Any of these aborts the current operation.
#[derive(Debug, Error)]
pub enum CorruptionError {
    /// A record id was materialized twice.
    #[error("{id} materialized twice under {parent}; store children: {listing:?}")]
    DuplicateMaterialization {
        /// The id that already had an entry.
        id: FileId,
        /// The directory that tried to materialize it again.
        parent: FileId,
        /// What the store currently lists for `parent`.
        listing: Vec<String>,
    },

    /// Two adjacent children are not strictly ordered.
    #[error("{0}")]
    OrderingViolation(Box<OrderingReport>),

    /// A previously cached child is missing from a full store listing.
    #[error("loaded child disappeared: parent={parent}; child={child} ('{name}')")]
    DisappearedChild {
        /// The directory being reconciled.
        parent: FileId,
        /// The cached child absent from the listing.
        child: FileId,
        /// Its cached name.
        name: String,
    },

    /// A name is both a cached child and recorded as absent.
    #[error("child {child} ('{name}') of {parent} is also an adopted name")]
    AdoptedChild {
        /// The directory holding both.
        parent: FileId,
        /// The cached child.
        child: FileId,
        /// The conflicting name.
        name: String,
    },

    /// A full store listing contains two names the comparator considers equal.
    #[error(
        "store returned duplicate file names ('{first}', '{second}') in {parent}; \
         case_sensitive: {case_sensitive}"
    )]
    DuplicateListedNames {
        /// The directory being reconciled.
        parent: FileId,
        /// First colliding name.
        first: String,
        /// Second colliding name.
        second: String,
        /// Comparator setting in effect.
        case_sensitive: bool,
    },
}

/// Identity of one entry inside an [`OrderingReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    /// Record id.
    pub id: FileId,
    /// Cached name.
    pub name: String,
    /// Parent record id.
    pub parent: Option<FileId>,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl fmt::Display for EntryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (name: '{}', ", self.id, self.name)?;
        match self.parent {
            Some(parent) => write!(f, "parent: {parent}, ")?,
            None => write!(f, "parent: none, ")?,
        }
        write!(f, "directory: {})", self.is_directory)
    }
}

/// Everything needed to diagnose a broken child ordering without a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingReport {
    /// The directory whose children are out of order.
    pub directory: FileId,
    /// Comparator setting of the directory.
    pub case_sensitive: bool,
    /// Entry that should sort after `next` but was placed before it.
    pub previous: EntryReport,
    /// Entry found right after `previous`.
    pub next: EntryReport,
    /// The whole candidate children array.
    pub children: Vec<EntryReport>,
    /// Operation-specific context.
    pub details: String,
}

impl fmt::Display for OrderingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is wrongly placed before {} in {} (case_sensitive: {}); children: [",
            self.previous, self.next, self.directory, self.case_sensitive
        )?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        write!(f, "]\nDetails: {}", self.details)
    }
}
