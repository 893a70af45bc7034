//! Cached file entries and per-directory child state.
//!
//! A [`VirtualEntry`] exists for every record the cache has materialized.
//! Directory entries additionally own a [`DirectoryData`]: the sorted child-id
//! array, the adopted-name negative cache, and the fully-loaded flag.
//!
//! # Concurrency
//!
//! The child array lives behind an [`ArcSwap`]. Readers load a snapshot
//! without locking; writers build a whole new array and swap it in while
//! holding the directory's `parking_lot::Mutex`, so a reader never sees a
//! torn array and an entry already in a snapshot is never moved under it.
//! The adopted-name set is only reachable through the lock. Locks are per
//! directory; no operation ever holds two of them.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::fs::{EntryFlags, FileId};
use crate::names::{NameId, name_key};
use crate::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// A materialized file record.
#[derive(Debug)]
pub struct VirtualEntry {
    id: FileId,
    name: AtomicU32,
    parent: Option<FileId>,
    flags: AtomicU8,
    valid: AtomicBool,
    dir: Option<DirectoryData>,
}

impl VirtualEntry {
    /// Creates an entry. `dir` is `Some` exactly for directories.
    #[must_use]
    pub fn new(
        id: FileId,
        name: NameId,
        parent: Option<FileId>,
        flags: EntryFlags,
        dir: Option<DirectoryData>,
    ) -> Self {
        Self {
            id,
            name: AtomicU32::new(name.get()),
            parent,
            flags: AtomicU8::new(flags.bits()),
            valid: AtomicBool::new(true),
            dir,
        }
    }

    /// Record id.
    #[must_use]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Current interned name.
    #[must_use]
    pub fn name_id(&self) -> NameId {
        NameId::from_raw(self.name.load(Ordering::Acquire))
    }

    /// Renames the entry. Callers must hold the parent directory's lock and
    /// take the entry out of the parent's array first.
    pub(crate) fn set_name_id(&self, name: NameId) {
        self.name.store(name.get(), Ordering::Release);
    }

    /// Parent record id; `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<FileId> {
        self.parent
    }

    /// Whether the record was a directory when materialized.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.dir.is_some()
    }

    /// Directory state, for directories.
    #[must_use]
    pub fn directory(&self) -> Option<&DirectoryData> {
        self.dir.as_ref()
    }

    /// Whether the entry is still backed by a live record.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Snapshot of the entry flags.
    #[must_use]
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Whether the entry is a symbolic link.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.flags().contains(EntryFlags::SYMLINK)
    }

    /// Whether the entry is writable.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags().contains(EntryFlags::WRITABLE)
    }

    /// Whether the entry is hidden.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.flags().contains(EntryFlags::HIDDEN)
    }

    /// Whether the entry is a special file.
    #[must_use]
    pub fn is_special(&self) -> bool {
        self.flags().contains(EntryFlags::SPECIAL)
    }

    /// Whether the entry is waiting for a refresh.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(EntryFlags::DIRTY)
    }

    /// Flags the entry for refresh.
    pub fn mark_dirty(&self) {
        self.flags
            .fetch_or(EntryFlags::DIRTY.bits(), Ordering::AcqRel);
    }

    /// Clears the refresh flag.
    pub fn mark_clean(&self) {
        self.flags
            .fetch_and(!EntryFlags::DIRTY.bits(), Ordering::AcqRel);
    }
}

/// Negative cache of names known not to exist in a directory.
#[derive(Debug)]
pub struct AdoptedNames {
    case_sensitive: bool,
    /// key (folded when case-insensitive) -> spelling as adopted
    names: FxHashMap<Box<str>, Box<str>>,
}

impl AdoptedNames {
    fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            names: FxHashMap::default(),
        }
    }

    /// Whether `name` is known to be absent.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name_key(name, self.case_sensitive))
    }

    /// Records `name` as absent. Returns `false` if it already was.
    pub fn insert(&mut self, name: &str) -> bool {
        let key = name_key(name, self.case_sensitive);
        if self.names.contains_key(&key) {
            return false;
        }
        self.names.insert(key, Box::from(name));
        true
    }

    /// Forgets `name`. Returns `true` if it was adopted.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names
            .remove(&name_key(name, self.case_sensitive))
            .is_some()
    }

    /// Number of adopted names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no name is adopted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Spellings of all adopted names, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(AsRef::as_ref)
    }

    fn clear(&mut self) {
        self.names.clear();
    }
}

/// Child state owned by a directory entry.
#[derive(Debug)]
pub struct DirectoryData {
    children: ArcSwap<Vec<FileId>>,
    state: Mutex<AdoptedNames>,
    fully_loaded: AtomicBool,
    /// Bumped by every write made through a [`DirGuard`].
    generation: AtomicU64,
    case_sensitive: bool,
}

impl DirectoryData {
    /// Empty, not yet loaded directory state.
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            children: ArcSwap::from_pointee(Vec::new()),
            state: Mutex::new(AdoptedNames::new(case_sensitive)),
            fully_loaded: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            case_sensitive,
        }
    }

    /// Comparator setting, fixed for the lifetime of the directory.
    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Lock-free snapshot of the sorted child ids.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<FileId>> {
        self.children.load_full()
    }

    /// Whether the child array is the complete, authoritative child set.
    #[must_use]
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    /// Write generation. Work prepared outside the lock is only valid if
    /// the generation is unchanged once the lock is taken.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Acquires the directory lock.
    pub fn lock(&self) -> DirGuard<'_> {
        DirGuard {
            data: self,
            adopted: self.state.lock(),
        }
    }
}

/// Exclusive access to one directory's mutable state.
///
/// Every write to the child array or the adopted names goes through a guard,
/// which makes "mutations happen under the directory lock" a type-level fact.
pub struct DirGuard<'a> {
    data: &'a DirectoryData,
    adopted: MutexGuard<'a, AdoptedNames>,
}

impl DirGuard<'_> {
    /// Current child ids. Stable for as long as the guard is held.
    #[must_use]
    pub fn children(&self) -> Arc<Vec<FileId>> {
        self.data.children.load_full()
    }

    /// Publishes a new child array.
    pub fn replace_children(&mut self, ids: Vec<FileId>) {
        self.touch();
        self.data.children.store(Arc::new(ids));
    }

    /// Whether the directory is fully loaded.
    #[must_use]
    pub fn is_fully_loaded(&self) -> bool {
        self.data.is_fully_loaded()
    }

    /// Transition to the fully-loaded state: the negative cache is dropped in
    /// the same step, since the child array now answers every membership
    /// question on its own.
    pub fn mark_fully_loaded(&mut self) {
        self.touch();
        self.adopted.clear();
        self.data.fully_loaded.store(true, Ordering::Release);
    }

    /// Read access to adopted names.
    #[must_use]
    pub fn adopted(&self) -> &AdoptedNames {
        &self.adopted
    }

    /// Write access to adopted names.
    pub fn adopted_mut(&mut self) -> &mut AdoptedNames {
        self.touch();
        &mut self.adopted
    }

    /// Comparator setting of the locked directory.
    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.data.case_sensitive
    }

    fn touch(&self) {
        self.data.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopted_names_fold_when_insensitive() {
        let mut adopted = AdoptedNames::new(false);
        assert!(adopted.insert("Makefile"));
        assert!(!adopted.insert("MAKEFILE"));
        assert!(adopted.contains("makefile"));
        assert!(adopted.remove("MakeFile"));
        assert!(adopted.is_empty());
    }

    #[test]
    fn adopted_names_exact_when_sensitive() {
        let mut adopted = AdoptedNames::new(true);
        adopted.insert("Makefile");
        assert!(!adopted.contains("makefile"));
        assert_eq!(adopted.iter().collect::<Vec<_>>(), ["Makefile"]);
    }

    #[test]
    fn full_load_clears_adopted_names() {
        let data = DirectoryData::new(true);
        {
            let mut guard = data.lock();
            guard.adopted_mut().insert("ghost");
            guard.replace_children(vec![FileId::new_unchecked(3)]);
            guard.mark_fully_loaded();
            assert!(guard.adopted().is_empty());
        }
        assert!(data.is_fully_loaded());
        assert_eq!(*data.snapshot(), vec![FileId::new_unchecked(3)]);
    }

    #[test]
    fn guarded_writes_advance_the_generation() {
        let data = DirectoryData::new(true);
        let start = data.generation();
        {
            let guard = data.lock();
            let _ = guard.children();
            assert!(!guard.adopted().contains("x"));
        }
        assert_eq!(data.generation(), start, "reads leave it alone");
        {
            let mut guard = data.lock();
            guard.adopted_mut().insert("x");
        }
        let adopted = data.generation();
        assert!(adopted > start);
        data.lock().replace_children(Vec::new());
        assert!(data.generation() > adopted);
    }

    #[test]
    fn dirty_flag_round_trips() {
        let entry = VirtualEntry::new(
            FileId::new_unchecked(1),
            NameId::from_raw(0),
            None,
            EntryFlags::WRITABLE,
            None,
        );
        assert!(!entry.is_dirty());
        entry.mark_dirty();
        assert!(entry.is_dirty() && entry.is_writable());
        entry.mark_clean();
        assert!(!entry.is_dirty());
    }
}
