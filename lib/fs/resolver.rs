//! Single-name resolution and full-listing reconciliation.
//!
//! Resolution order for a name under a directory:
//! 1. The sorted child array (lock-free snapshot, binary search).
//! 2. The normalized name, then the negative cache of adopted names.
//! 3. The delegate's canonical spelling, searched again in the array.
//! 4. A store round trip, taken *outside* the directory lock, followed by a
//!    re-check under the lock before anything is inserted. Another resolver
//!    may have materialized or adopted the same name in the gap; the re-check
//!    is what keeps a child from being materialized twice.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::fs::entry::{DirGuard, DirectoryData, VirtualEntry};
use crate::fs::error::{CorruptionError, VfsError};
use crate::fs::refresh::CreateEvent;
use crate::fs::store::{AccessDenied, FakeChild, FileRecordStore, FileSystemDelegate, ListedChild};
use crate::fs::vfs::VfsCache;
use crate::fs::{EntryFlags, FileAttributes, FileId};
use crate::names::{NameId, compare_names};

/// Full listings taken outside the lock before falling back to listing
/// while holding it.
const RELIST_ATTEMPTS: u32 = 3;

/// Outcome of [`VfsCache::do_find_child`].
enum Lookup {
    Found(Arc<VirtualEntry>),
    /// Answered from memory: adopted name, or a fully loaded directory.
    KnownAbsent,
    /// Unusable name, or the store reported no such record.
    Absent,
}

/// Normalizes a caller-supplied name: separators unified, leading and
/// trailing ones stripped. `None` if nothing is left or a separator remains
/// in the middle.
fn normalize_name(name: &str) -> Option<Cow<'_, str>> {
    let unified: Cow<'_, str> = if name.contains('\\') {
        Cow::Owned(name.replace('\\', "/"))
    } else {
        Cow::Borrowed(name)
    };
    let trimmed = unified.trim_matches('/');
    if trimmed.is_empty() || trimmed.contains('/') {
        return None;
    }
    if trimmed.len() == name.len() {
        return Some(Cow::Borrowed(name));
    }
    Some(Cow::Owned(trimmed.to_owned()))
}

impl<S: FileRecordStore> VfsCache<S> {
    /// Looks up child `name` of `dir`, canonicalizing the name first.
    ///
    /// Returns `Ok(None)` when there is no such child, including for empty or
    /// otherwise unusable names.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] if `dir` was invalidated, or a corruption
    /// fault if the store and the cache disagree.
    pub fn find_child(
        &self,
        dir: FileId,
        name: &str,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let delegate = Arc::clone(&self.delegate);
        self.find_child_with(dir, name, false, true, delegate.as_ref())
    }

    /// Looks up `name` like [`find_child`](Self::find_child) with an explicit
    /// delegate, optionally skipping canonicalization.
    ///
    /// # Errors
    ///
    /// See [`find_child`](Self::find_child).
    pub fn resolve(
        &self,
        dir: FileId,
        name: &str,
        ensure_canonical: bool,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        self.find_child_with(dir, name, false, ensure_canonical, delegate)
    }

    /// Looks up `name`, consulting the live file system when the cache has it
    /// as absent or when the cached type disagrees with the disk.
    ///
    /// A child found on disk this way is inserted and announced to the
    /// refresh queue as a [`CreateEvent`].
    ///
    /// # Errors
    ///
    /// See [`find_child`](Self::find_child).
    pub fn refresh_and_find_child(
        &self,
        dir: FileId,
        name: &str,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let delegate = Arc::clone(&self.delegate);
        self.find_child_with(dir, name, true, true, delegate.as_ref())
    }

    /// Looks up `name` using only what is in memory. Never touches the store
    /// and never takes the directory lock: an adopted name is never in the
    /// child array, so the snapshot alone answers.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn find_child_if_cached(
        &self,
        dir: FileId,
        name: &str,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let dir_entry = self.live_dir(dir)?;
        Ok(self.search_snapshot(Self::dir_data(&dir_entry), name))
    }

    /// Looks up a child by record id. Unless `cached_only`, a miss falls back
    /// to resolving the record's persisted name.
    ///
    /// # Errors
    ///
    /// See [`find_child`](Self::find_child).
    pub fn find_child_by_id(
        &self,
        dir: FileId,
        id: FileId,
        cached_only: bool,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let dir_entry = self.live_dir(dir)?;
        if Self::dir_data(&dir_entry).snapshot().contains(&id) {
            return Ok(self.table.get(id));
        }
        if cached_only {
            return Ok(None);
        }
        let Some(name) = self.store.name_of(id) else {
            return Ok(None);
        };
        let delegate = Arc::clone(&self.delegate);
        self.find_child_with(dir, &name, false, false, delegate.as_ref())
    }

    /// Complete, sorted child list of `dir`. The first call lists the store;
    /// afterwards the directory is fully loaded and answers from memory.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`], [`VfsError::NotADirectory`], or a
    /// corruption fault.
    pub fn children(&self, dir: FileId) -> Result<Vec<Arc<VirtualEntry>>, VfsError> {
        let delegate = Arc::clone(&self.delegate);
        self.reconcile_all(dir, delegate.as_ref())
    }

    /// Children the store has persisted for `dir`, resolved into the cache.
    /// Empty if the store never listed `dir`.
    ///
    /// # Errors
    ///
    /// See [`children`](Self::children).
    pub fn in_db_children(&self, dir: FileId) -> Result<Vec<Arc<VirtualEntry>>, VfsError> {
        self.live_dir(dir)?;
        if !self.store.were_children_ever_listed(dir) {
            return Ok(Vec::new());
        }
        if !self.store.are_children_fully_loaded(dir) {
            let delegate = Arc::clone(&self.delegate);
            for name in self.store.list_persisted(dir) {
                self.find_child_with(dir, &name, false, false, delegate.as_ref())?;
            }
        }
        self.cached_children(dir)
    }

    /// Materializes record `id` as a child of `dir` without inserting it into
    /// the child array. Pair with [`add_child`](Self::add_child).
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`], [`VfsError::NotADirectory`], or
    /// [`CorruptionError::DuplicateMaterialization`] if `id` already has an entry.
    pub fn create_child(
        &self,
        dir: FileId,
        name: &str,
        id: FileId,
    ) -> Result<Arc<VirtualEntry>, VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let _guard = Self::dir_data(&dir_entry).lock();
        let delegate = Arc::clone(&self.delegate);
        Ok(self.materialize(&dir_entry, self.names.intern(name), id, delegate.as_ref())?)
    }

    /// Complete child list with an explicit delegate.
    ///
    /// The store listing is fetched before the directory lock is taken;
    /// diffing, materialization and the switch to fully loaded happen under
    /// the lock in one step. If the directory was written to while the store
    /// was listing, the listing is discarded and taken again.
    ///
    /// # Errors
    ///
    /// See [`children`](Self::children).
    pub fn reconcile_all(
        &self,
        dir: FileId,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Vec<Arc<VirtualEntry>>, VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);
        if data.is_fully_loaded() {
            let ids = data.snapshot();
            self.check_order(&dir_entry, &ids, || "cached full listing".to_owned())?;
            return Ok(self.entries_of(&ids));
        }

        let list = || {
            let was_loaded = self.store.are_children_fully_loaded(dir);
            self.sorted_listing(dir, data.case_sensitive(), was_loaded)
        };
        let mut attempt = 1;
        let (listing, mut guard) = loop {
            let seen = data.generation();
            let listing = list()?;
            let guard = data.lock();
            if guard.is_fully_loaded() || data.generation() == seen {
                break (listing, guard);
            }
            // A removal or insertion landed while the store was listing, so
            // the listing may contradict the adopted names.
            if attempt == RELIST_ATTEMPTS {
                tracing::warn!(dir = %dir, attempt, "directory keeps changing, listing under the lock");
                break (list()?, guard);
            }
            drop(guard);
            attempt += 1;
        };
        if guard.is_fully_loaded() {
            // Another caller finished the full load while we were listing.
            let ids = guard.children();
            return Ok(self.entries_of(&ids));
        }

        let current = guard.children();
        let mut previous: FxHashSet<FileId> = current.iter().copied().collect();
        for child in &listing {
            previous.remove(&child.id);
        }
        if let Some(&gone) = previous.iter().next() {
            let fault = CorruptionError::DisappearedChild {
                parent: dir,
                child: gone,
                name: self.child_name(gone).to_string(),
            };
            tracing::error!(parent = %dir, missing = previous.len(), "{fault}");
            if self.config.check_consistency {
                return Err(fault.into());
            }
        }

        let mut result = Vec::with_capacity(listing.len());
        let mut created = Vec::new();
        for child in &listing {
            result.push(child.id);
            if self.table.contains(child.id) {
                continue;
            }
            match self.materialize(&dir_entry, self.names.intern(&child.name), child.id, delegate)
            {
                Ok(_) => created.push(child.id),
                Err(fault) => {
                    self.forget_created(&created);
                    return Err(fault.into());
                }
            }
        }
        if let Err(fault) = self.check_order(&dir_entry, &result, || {
            format!("full listing of {} entries", listing.len())
        }) {
            self.forget_created(&created);
            return Err(fault.into());
        }

        guard.replace_children(result);
        guard.mark_fully_loaded();
        self.bump();
        let ids = guard.children();
        drop(guard);

        tracing::debug!(
            dir = %dir,
            children = ids.len(),
            materialized = created.len(),
            "directory fully loaded"
        );
        Ok(self.entries_of(&ids))
    }

    /// Store listing of `dir` sorted by the comparator, with names the
    /// comparator cannot tell apart reported and dropped.
    fn sorted_listing(
        &self,
        dir: FileId,
        case_sensitive: bool,
        was_loaded: bool,
    ) -> Result<Vec<ListedChild>, CorruptionError> {
        let mut listing = self.store.list_all(dir);
        listing.sort_by(|a, b| compare_names(&a.name, &b.name, case_sensitive));

        let mut sorted: Vec<ListedChild> = Vec::with_capacity(listing.len());
        for child in listing {
            if let Some(last) = sorted.last()
                && compare_names(&last.name, &child.name, case_sensitive) == Ordering::Equal
            {
                let fault = CorruptionError::DuplicateListedNames {
                    parent: dir,
                    first: last.name.clone(),
                    second: child.name.clone(),
                    case_sensitive,
                };
                tracing::error!(parent = %dir, was_loaded, "{fault}");
                if self.config.check_consistency {
                    return Err(fault);
                }
                continue;
            }
            sorted.push(child);
        }
        Ok(sorted)
    }

    fn forget_created(&self, created: &[FileId]) {
        for &id in created {
            self.table.remove(id);
        }
    }

    pub(super) fn find_child_with(
        &self,
        dir: FileId,
        name: &str,
        do_refresh: bool,
        ensure_canonical: bool,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        match self.do_find_child(dir, name, ensure_canonical, delegate)? {
            Lookup::KnownAbsent if do_refresh => {
                self.create_and_find_child_with_event(dir, name, delegate)
            }
            Lookup::KnownAbsent | Lookup::Absent => Ok(None),
            Lookup::Found(child)
                if do_refresh && delegate.is_directory(&child) != child.is_directory() =>
            {
                tracing::warn!(
                    dir = %dir,
                    child = %child.id(),
                    cached_directory = child.is_directory(),
                    "cached child changed type on disk, refreshing"
                );
                self.refresh_queue.refresh(&child);
                self.find_child_with(dir, name, false, ensure_canonical, delegate)
            }
            Lookup::Found(child) => Ok(Some(child)),
        }
    }

    fn do_find_child(
        &self,
        dir: FileId,
        name: &str,
        ensure_canonical: bool,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Lookup, VfsError> {
        if name.is_empty() {
            return Ok(Lookup::Absent);
        }
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);

        if let Some(found) = self.search_snapshot(data, name) {
            tracing::trace!(dir = %dir, name, "child array hit");
            return Ok(Lookup::Found(found));
        }

        let mut name = Cow::Borrowed(name);
        if ensure_canonical {
            let Some(trimmed) = normalize_name(&name) else {
                return Ok(Lookup::Absent);
            };
            if trimmed != name {
                if let Some(found) = self.search_snapshot(data, &trimmed) {
                    return Ok(Lookup::Found(found));
                }
                name = Cow::Owned(trimmed.into_owned());
            }
        }

        if data.is_fully_loaded() {
            return Ok(Lookup::KnownAbsent);
        }
        if data.lock().adopted().contains(&name) {
            tracing::trace!(dir = %dir, name = %name, "adopted name hit");
            return Ok(Lookup::KnownAbsent);
        }

        if ensure_canonical {
            let canonical = delegate.canonical_spelling(&FakeChild {
                parent: dir,
                name: &name,
            });
            if canonical.is_empty() {
                return Ok(Lookup::Absent);
            }
            if canonical != *name {
                if let Some(found) = self.search_snapshot(data, &canonical) {
                    return Ok(Lookup::Found(found));
                }
                name = Cow::Owned(canonical);
            }
        }

        let raw = self.store.id_for(dir, &name, delegate);
        tracing::debug!(dir = %dir, name = %name, raw, "store lookup");

        let mut guard = data.lock();
        if guard.adopted().contains(&name) {
            return Ok(Lookup::KnownAbsent);
        }
        let ids = guard.children();
        let pos = match self.find_index(&ids, &name, data.case_sensitive()) {
            Ok(i) => return Ok(self.table.get(ids[i]).map_or(Lookup::Absent, Lookup::Found)),
            Err(pos) => pos,
        };
        if guard.is_fully_loaded() {
            return Ok(Lookup::Absent);
        }
        let Some(id) = FileId::new(raw) else {
            guard.adopted_mut().insert(&name);
            return Ok(Lookup::Absent);
        };
        let child = self.insert_new_child(&dir_entry, &mut guard, &ids, pos, &name, id, delegate)?;
        drop(guard);

        if !child.is_directory() {
            self.access
                .check_access(&child)
                .map_err(|AccessDenied(reason)| VfsError::AccessDenied { id, reason })?;
        }
        Ok(Lookup::Found(child))
    }

    /// Applies a synthetic creation for a name the cache had as absent, then
    /// resolves the child under its canonical spelling.
    fn create_and_find_child_with_event(
        &self,
        dir: FileId,
        name: &str,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let fake = FakeChild { parent: dir, name };
        let Some(attrs) = delegate.attributes(&fake) else {
            return Ok(None);
        };
        let real_name = delegate.canonical_spelling(&fake);
        if real_name.is_empty() {
            return Ok(None);
        }
        let event = CreateEvent {
            parent: dir,
            name: real_name,
            is_directory: attrs.contains(FileAttributes::DIRECTORY),
        };
        self.apply_create(&event, delegate)?;
        self.refresh_queue.process_create(&event);
        self.find_child_with(dir, &event.name, false, true, delegate)
    }

    fn apply_create(
        &self,
        event: &CreateEvent,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<(), VfsError> {
        let dir_entry = self.live_dir(event.parent)?;
        let data = Self::dir_data(&dir_entry);
        let raw = self.store.id_for(event.parent, &event.name, delegate);

        let mut guard = data.lock();
        guard.adopted_mut().remove(&event.name);
        let Some(id) = FileId::new(raw) else {
            tracing::debug!(dir = %event.parent, name = %event.name, "store has no record for created child");
            return Ok(());
        };
        let ids = guard.children();
        if let Err(pos) = self.find_index(&ids, &event.name, data.case_sensitive()) {
            self.insert_new_child(&dir_entry, &mut guard, &ids, pos, &event.name, id, delegate)?;
            tracing::debug!(dir = %event.parent, name = %event.name, id = %id, "applied create event");
        }
        Ok(())
    }

    /// Materializes `id` and publishes it at `pos`. Rolls the materialization
    /// back if the resulting array fails the ordering check.
    #[expect(clippy::too_many_arguments, reason = "all state of one locked insertion")]
    fn insert_new_child(
        &self,
        dir_entry: &VirtualEntry,
        guard: &mut DirGuard<'_>,
        ids: &[FileId],
        pos: usize,
        name: &str,
        id: FileId,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Arc<VirtualEntry>, VfsError> {
        let child = self.materialize(dir_entry, self.names.intern(name), id, delegate)?;
        let mut next = Vec::with_capacity(ids.len() + 1);
        next.extend_from_slice(&ids[..pos]);
        next.push(id);
        next.extend_from_slice(&ids[pos..]);
        if let Err(fault) = self.check_order(dir_entry, &next, || format!("insert of '{name}'")) {
            self.table.remove(id);
            return Err(fault.into());
        }
        guard.replace_children(next);
        self.bump();
        Ok(child)
    }

    /// Creates the entry for record `id` from the store's attributes.
    ///
    /// Directory-ness comes from the attributes, never from a cached guess.
    pub(super) fn materialize(
        &self,
        parent: &VirtualEntry,
        name: NameId,
        id: FileId,
        delegate: &dyn FileSystemDelegate,
    ) -> Result<Arc<VirtualEntry>, CorruptionError> {
        let attrs = self.store.attributes_of(id);
        let is_dir = attrs.contains(FileAttributes::DIRECTORY);
        let mut flags = EntryFlags::from_attributes(attrs);
        if self
            .config
            .mark_new_files_dirty
            .unwrap_or_else(|| delegate.mark_new_files_as_dirty())
        {
            flags |= EntryFlags::DIRTY;
        }
        let dir = is_dir.then(|| DirectoryData::new(delegate.is_case_sensitive()));
        let entry = Arc::new(VirtualEntry::new(id, name, Some(parent.id()), flags, dir));

        if self.table.insert_new(Arc::clone(&entry)).is_err() {
            let listing = self
                .store
                .list_all(parent.id())
                .into_iter()
                .map(|c| format!("{}={}", c.name, c.id))
                .collect();
            let fault = CorruptionError::DuplicateMaterialization {
                id,
                parent: parent.id(),
                listing,
            };
            tracing::error!(parent = %parent.id(), id = %id, "{fault}");
            return Err(fault);
        }
        self.bump();
        tracing::debug!(parent = %parent.id(), id = %id, directory = is_dir, "materialized child");
        Ok(entry)
    }

    fn search_snapshot(&self, data: &DirectoryData, name: &str) -> Option<Arc<VirtualEntry>> {
        let ids = data.snapshot();
        let i = self.find_index(&ids, name, data.case_sensitive()).ok()?;
        self.table.get(ids[i])
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_name;

    #[test]
    fn normalize_strips_outer_separators() {
        assert_eq!(normalize_name("/foo/").as_deref(), Some("foo"));
        assert_eq!(normalize_name("\\foo").as_deref(), Some("foo"));
        assert_eq!(normalize_name("foo").as_deref(), Some("foo"));
    }

    #[test]
    fn normalize_rejects_inner_separators_and_empty() {
        assert!(normalize_name("a/b").is_none());
        assert!(normalize_name("a\\b").is_none());
        assert!(normalize_name("//").is_none());
    }
}
