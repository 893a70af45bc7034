//! Structural mutations of a directory's child array.
//!
//! Every operation here takes the directory lock once, builds the new array
//! off to the side, checks it, publishes it, and bumps the modification
//! counter exactly once.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::fs::FileId;
use crate::fs::entry::{DirGuard, VirtualEntry};
use crate::fs::error::VfsError;
use crate::fs::store::FileRecordStore;
use crate::fs::vfs::VfsCache;
use crate::names::compare_names;

/// Merges two sorted sequences. On a tie the element from `existing` is kept
/// and the one from `added` dropped. `added` must be free of ties.
fn merge_sorted<T: Copy>(
    existing: &[T],
    added: &[T],
    mut cmp: impl FnMut(&T, &T) -> Ordering,
) -> Vec<T> {
    let mut merged = Vec::with_capacity(existing.len() + added.len());
    let (mut i, mut j) = (0, 0);
    while i < existing.len() && j < added.len() {
        match cmp(&existing[i], &added[j]) {
            Ordering::Less => {
                merged.push(existing[i]);
                i += 1;
            }
            Ordering::Greater => {
                merged.push(added[j]);
                j += 1;
            }
            Ordering::Equal => {
                merged.push(existing[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&existing[i..]);
    merged.extend_from_slice(&added[j..]);
    merged
}

/// Splits sorted `existing` into kept and removed, dropping every element
/// that compares equal to something in sorted `remove`.
fn filter_sorted<T: Copy, R>(
    existing: &[T],
    remove: &[R],
    mut cmp: impl FnMut(&R, &T) -> Ordering,
) -> (Vec<T>, Vec<T>) {
    let mut kept = Vec::with_capacity(existing.len());
    let mut removed = Vec::new();
    let mut r = 0;
    for item in existing {
        while r < remove.len() && cmp(&remove[r], item) == Ordering::Less {
            r += 1;
        }
        if r < remove.len() && cmp(&remove[r], item) == Ordering::Equal {
            removed.push(*item);
        } else {
            kept.push(*item);
        }
    }
    (kept, removed)
}

impl<S: FileRecordStore> VfsCache<S> {
    /// Inserts an already materialized `child` into `dir` at its sorted
    /// position. Its name stops being an adopted name. No-op if a child with
    /// an equal name is already present.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`], [`VfsError::NotADirectory`], or an ordering
    /// fault when consistency checks are on.
    pub fn add_child(&self, dir: FileId, child: &Arc<VirtualEntry>) -> Result<(), VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let name = self.name_of(child);
        let mut guard = Self::dir_data(&dir_entry).lock();
        if self.add_child_locked(&dir_entry, &mut guard, child, &name)? {
            self.bump();
        }
        Ok(())
    }

    /// Inserts many materialized children in one step. `added` pairs each
    /// child with the name to sort it by.
    ///
    /// Small batches are inserted one by one; larger ones are sorted and
    /// merged with the existing array in a single pass. Both paths give the
    /// same result. When two children share a name the one already present
    /// wins, and within `added` the first one wins.
    ///
    /// # Errors
    ///
    /// See [`add_child`](Self::add_child).
    pub fn add_children(
        &self,
        dir: FileId,
        mut added: Vec<(Arc<VirtualEntry>, String)>,
    ) -> Result<(), VfsError> {
        if added.is_empty() {
            return Ok(());
        }
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);
        let cs = data.case_sensitive();

        if added.len() <= self.config.batch_merge_threshold {
            let mut guard = data.lock();
            let mut changed = false;
            for (child, name) in &added {
                changed |= self.add_child_locked(&dir_entry, &mut guard, child, name)?;
            }
            if changed {
                self.bump();
            }
            return Ok(());
        }

        added.sort_by(|a, b| compare_names(&a.1, &b.1, cs));
        added.dedup_by(|later, kept| compare_names(&later.1, &kept.1, cs) == Ordering::Equal);
        let added_named: Vec<(FileId, &str)> = added
            .iter()
            .map(|(child, name)| (child.id(), name.as_str()))
            .collect();

        let mut guard = data.lock();
        let ids = guard.children();
        let existing_names: Vec<Arc<str>> = ids.iter().map(|&id| self.child_name(id)).collect();
        let existing_named: Vec<(FileId, &str)> = ids
            .iter()
            .zip(&existing_names)
            .map(|(&id, name)| (id, name.as_ref()))
            .collect();
        let merged: Vec<FileId> = merge_sorted(&existing_named, &added_named, |a, b| {
            compare_names(a.1, b.1, cs)
        })
        .into_iter()
        .map(|(id, _)| id)
        .collect();
        self.check_order(&dir_entry, &merged, || {
            format!("merge of {} children into {}", added.len(), ids.len())
        })?;
        for (_, name) in &added {
            guard.adopted_mut().remove(name);
        }
        guard.replace_children(merged);
        self.bump();
        tracing::debug!(dir = %dir, added = added.len(), "merged children");
        Ok(())
    }

    /// Removes child `name` from `dir` and invalidates it. When `dir` is not
    /// fully loaded the name is adopted, so a later lookup answers "absent"
    /// without the store. Returns the removed entry, if one was cached.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn remove_child(
        &self,
        dir: FileId,
        name: &str,
    ) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);
        let mut guard = data.lock();
        if guard.adopted().contains(name) {
            return Ok(None);
        }
        if !guard.is_fully_loaded() {
            guard.adopted_mut().insert(name);
        }
        let ids = guard.children();
        let Ok(pos) = self.find_index(&ids, name, data.case_sensitive()) else {
            return Ok(None);
        };
        let mut next = Vec::with_capacity(ids.len() - 1);
        next.extend_from_slice(&ids[..pos]);
        next.extend_from_slice(&ids[pos + 1..]);
        guard.replace_children(next);
        self.bump();
        drop(guard);

        let removed = self.table.get(ids[pos]);
        if let Some(entry) = &removed {
            self.invalidate_subtree(entry);
        }
        tracing::debug!(dir = %dir, name, "removed child");
        Ok(removed)
    }

    /// Removes every child whose name is in `names`, adopting all of `names`
    /// when `dir` is not fully loaded. One counter bump for the whole batch.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn remove_children(&self, dir: FileId, mut names: Vec<String>) -> Result<(), VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);
        let cs = data.case_sensitive();
        names.sort_by(|a, b| compare_names(a, b, cs));

        let mut guard = data.lock();
        if !guard.is_fully_loaded() {
            for name in &names {
                guard.adopted_mut().insert(name);
            }
        }
        let ids = guard.children();
        let (kept, removed) = filter_sorted(ids.as_slice(), &names, |name, &id| {
            compare_names(name, &self.child_name(id), cs)
        });
        guard.replace_children(kept);
        self.bump();
        drop(guard);

        for entry in self.entries_of(&removed) {
            self.invalidate_subtree(&entry);
        }
        tracing::debug!(dir = %dir, requested = names.len(), removed = removed.len(), "removed children");
        Ok(())
    }

    /// Renames cached child `child` of `dir` to `new_name`, moving it to its
    /// new sorted position. A different child already holding `new_name` is
    /// replaced and invalidated. Returns `false` without changes if
    /// `new_name` is not a single path component.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] if `dir` or `child` is not cached, or an
    /// ordering fault when consistency checks are on.
    pub fn rename_child(
        &self,
        dir: FileId,
        child: FileId,
        new_name: &str,
    ) -> Result<bool, VfsError> {
        if new_name.is_empty() || new_name.contains(['/', '\\']) {
            return Ok(false);
        }
        let dir_entry = self.live_dir(dir)?;
        let data = Self::dir_data(&dir_entry);
        let cs = data.case_sensitive();
        let entry = self
            .table
            .get(child)
            .filter(|e| e.parent() == Some(dir))
            .ok_or(VfsError::StaleHandle { id: child })?;

        let mut guard = data.lock();
        let old_name = self.name_of(&entry);
        let ids = guard.children();
        let mut next: Vec<FileId> = ids.iter().copied().filter(|&id| id != child).collect();
        entry.set_name_id(self.names.intern(new_name));

        let displaced = match self.find_index(&next, new_name, cs) {
            Ok(pos) => {
                let displaced = next[pos];
                next[pos] = child;
                Some(displaced)
            }
            Err(pos) => {
                next.insert(pos, child);
                None
            }
        };
        if let Err(fault) = self.check_order(&dir_entry, &next, || {
            format!("rename of '{old_name}' to '{new_name}'")
        }) {
            entry.set_name_id(self.names.intern(&old_name));
            return Err(fault.into());
        }
        if !guard.is_fully_loaded() {
            guard.adopted_mut().insert(&old_name);
        }
        guard.adopted_mut().remove(new_name);
        guard.replace_children(next);
        self.bump();
        drop(guard);

        if let Some(entry) = displaced.and_then(|id| self.table.get(id)) {
            self.invalidate_subtree(&entry);
        }
        tracing::debug!(dir = %dir, child = %child, from = %old_name, to = new_name, "renamed child");
        Ok(true)
    }

    /// Single insertion of `child`, positioned by `name`, under an already
    /// held lock. Returns whether the array changed.
    fn add_child_locked(
        &self,
        dir_entry: &VirtualEntry,
        guard: &mut DirGuard<'_>,
        child: &VirtualEntry,
        name: &str,
    ) -> Result<bool, VfsError> {
        guard.adopted_mut().remove(name);
        let ids = guard.children();
        let Err(pos) = self.find_index(&ids, name, guard.case_sensitive()) else {
            return Ok(false);
        };
        let mut next = Vec::with_capacity(ids.len() + 1);
        next.extend_from_slice(&ids[..pos]);
        next.push(child.id());
        next.extend_from_slice(&ids[pos..]);
        self.check_order(dir_entry, &next, || format!("insert of '{name}'"))?;
        guard.replace_children(next);
        Ok(true)
    }
}
