//! The public cache façade.
//!
//! [`VfsCache`] owns every materialized entry of one file system and routes
//! lookups, listings and mutations to the resolver ([`super::resolver`]), the
//! batch mutator ([`super::batch`]) and the consistency checker
//! ([`super::consistency`]). Handles are plain [`FileId`]s; entries come back
//! as `Arc<VirtualEntry>`.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::fs::entry::{DirectoryData, VirtualEntry};
use crate::fs::error::{CorruptionError, VfsError};
use crate::fs::refresh::{NoopRefreshQueue, RefreshQueue};
use crate::fs::store::{AccessPolicy, AllowAll, FileRecordStore, FileSystemDelegate};
use crate::fs::table::EntryTable;
use crate::fs::{EntryFlags, FileAttributes, FileId};
use crate::modcount::ModificationCounter;
use crate::names::{NameTable, compare_names};

/// In-memory directory-children cache layered over a [`FileRecordStore`].
pub struct VfsCache<S> {
    pub(super) store: S,
    pub(super) delegate: Arc<dyn FileSystemDelegate>,
    pub(super) names: NameTable,
    pub(super) table: EntryTable,
    pub(super) modcount: Arc<ModificationCounter>,
    pub(super) refresh_queue: Arc<dyn RefreshQueue>,
    pub(super) access: Arc<dyn AccessPolicy>,
    pub(super) config: CacheConfig,
    root: FileId,
}

/// Configures and builds a [`VfsCache`].
pub struct VfsCacheBuilder<S> {
    store: S,
    delegate: Arc<dyn FileSystemDelegate>,
    config: CacheConfig,
    modcount: Option<Arc<ModificationCounter>>,
    refresh_queue: Option<Arc<dyn RefreshQueue>>,
    access: Option<Arc<dyn AccessPolicy>>,
}

impl<S: FileRecordStore> VfsCacheBuilder<S> {
    /// Replaces the default [`CacheConfig`].
    #[must_use]
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `counter` instead of [`ModificationCounter::global`].
    #[must_use]
    pub fn counter(mut self, counter: Arc<ModificationCounter>) -> Self {
        self.modcount = Some(counter);
        self
    }

    /// Sends refresh requests to `queue` instead of dropping them.
    #[must_use]
    pub fn refresh_queue(mut self, queue: Arc<dyn RefreshQueue>) -> Self {
        self.refresh_queue = Some(queue);
        self
    }

    /// Runs `policy` on every freshly resolved non-directory child.
    #[must_use]
    pub fn access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access = Some(policy);
        self
    }

    /// Materializes the root directory `root` and returns the cache.
    ///
    /// # Errors
    ///
    /// [`VfsError::NotADirectory`] if the store does not describe `root` as a
    /// directory.
    pub fn build(self, root: FileId, root_name: &str) -> Result<VfsCache<S>, VfsError> {
        let attrs = self.store.attributes_of(root);
        if !attrs.contains(FileAttributes::DIRECTORY) {
            return Err(VfsError::NotADirectory { id: root });
        }

        let cache = VfsCache {
            store: self.store,
            names: NameTable::new(),
            table: EntryTable::new(),
            modcount: self.modcount.unwrap_or_else(ModificationCounter::global),
            refresh_queue: self
                .refresh_queue
                .unwrap_or_else(|| Arc::new(NoopRefreshQueue)),
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            config: self.config,
            root,
            delegate: self.delegate,
        };

        let entry = VirtualEntry::new(
            root,
            cache.names.intern(root_name),
            None,
            EntryFlags::from_attributes(attrs),
            Some(DirectoryData::new(cache.delegate.is_case_sensitive())),
        );
        cache
            .table
            .insert_new(Arc::new(entry))
            .map_err(|_| CorruptionError::DuplicateMaterialization {
                id: root,
                parent: root,
                listing: Vec::new(),
            })?;
        cache.bump();
        tracing::debug!(root = %root, name = root_name, "materialized root directory");
        Ok(cache)
    }
}

impl<S: FileRecordStore> VfsCache<S> {
    /// Starts building a cache over `store`, asking `delegate` about the live
    /// file system.
    pub fn builder(store: S, delegate: Arc<dyn FileSystemDelegate>) -> VfsCacheBuilder<S> {
        VfsCacheBuilder {
            store,
            delegate,
            config: CacheConfig::default(),
            modcount: None,
            refresh_queue: None,
            access: None,
        }
    }

    /// Builds a cache with default settings.
    ///
    /// # Errors
    ///
    /// See [`VfsCacheBuilder::build`].
    pub fn new(
        store: S,
        delegate: Arc<dyn FileSystemDelegate>,
        root: FileId,
        root_name: &str,
        config: CacheConfig,
    ) -> Result<Self, VfsError> {
        Self::builder(store, delegate).config(config).build(root, root_name)
    }

    /// Id of the root directory.
    #[must_use]
    pub fn root(&self) -> FileId {
        self.root
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Materialized entry for `id`, if any.
    #[must_use]
    pub fn entry(&self, id: FileId) -> Option<Arc<VirtualEntry>> {
        self.table.get(id)
    }

    /// Number of materialized entries, root included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    /// Current value of the structural modification counter.
    #[must_use]
    pub fn modification_count(&self) -> u64 {
        self.modcount.get()
    }

    /// Cached name of `entry`.
    #[must_use]
    pub fn name_of(&self, entry: &VirtualEntry) -> Arc<str> {
        self.names
            .name(entry.name_id())
            .unwrap_or_else(|| Arc::from(""))
    }

    /// Whether directory `dir` holds its complete child set in memory.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn is_fully_loaded(&self, dir: FileId) -> Result<bool, VfsError> {
        let entry = self.live_dir(dir)?;
        Ok(Self::dir_data(&entry).is_fully_loaded())
    }

    /// Children currently in memory, in comparator order. Never touches the store.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn cached_children(&self, dir: FileId) -> Result<Vec<Arc<VirtualEntry>>, VfsError> {
        let entry = self.live_dir(dir)?;
        Ok(self.entries_of(&Self::dir_data(&entry).snapshot()))
    }

    /// Names currently recorded as absent in `dir`.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn suspicious_names(&self, dir: FileId) -> Result<Vec<String>, VfsError> {
        let entry = self.live_dir(dir)?;
        let guard = Self::dir_data(&entry).lock();
        Ok(guard.adopted().iter().map(str::to_owned).collect())
    }

    /// Marks `id` dirty.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] if `id` is not materialized.
    pub fn mark_dirty(&self, id: FileId) -> Result<(), VfsError> {
        self.table
            .get(id)
            .ok_or(VfsError::StaleHandle { id })?
            .mark_dirty();
        Ok(())
    }

    /// Marks `dir` and every cached descendant dirty. Only walks what is
    /// already in memory.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`] or [`VfsError::NotADirectory`].
    pub fn mark_dirty_recursively(&self, dir: FileId) -> Result<(), VfsError> {
        let entry = self.live_dir(dir)?;
        entry.mark_dirty();
        let mut stack = vec![entry];
        while let Some(current) = stack.pop() {
            let Some(data) = current.directory() else {
                continue;
            };
            for child in self.entries_of(&data.snapshot()) {
                child.mark_dirty();
                if child.is_directory() {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }

    /// Invalidates `id` and its cached subtree: the entries are detached from
    /// their parent, dropped from the table, and any further directory
    /// operation on them fails with [`VfsError::StaleHandle`].
    ///
    /// Returns `false` if `id` was not materialized.
    pub fn invalidate(&self, id: FileId) -> bool {
        let Some(entry) = self.table.get(id) else {
            return false;
        };
        if let Some(parent) = entry.parent().and_then(|p| self.table.get(p))
            && let Some(data) = parent.directory()
        {
            let mut guard = data.lock();
            let ids = guard.children();
            if let Some(pos) = ids.iter().position(|&c| c == id) {
                let mut next = Vec::with_capacity(ids.len() - 1);
                next.extend_from_slice(&ids[..pos]);
                next.extend_from_slice(&ids[pos + 1..]);
                guard.replace_children(next);
                self.bump();
            }
        }
        self.invalidate_subtree(&entry);
        tracing::debug!(id = %id, "invalidated entry");
        true
    }

    /// Reading a directory as bytes is never supported.
    ///
    /// # Errors
    ///
    /// Always: [`VfsError::UnsupportedOperation`] for a directory,
    /// [`VfsError::NotADirectory`] or [`VfsError::StaleHandle`] otherwise.
    pub fn contents(&self, dir: FileId) -> Result<Vec<u8>, VfsError> {
        Err(self.unsupported_on_directory("contents", dir))
    }

    /// Opening a directory for reading is never supported.
    ///
    /// # Errors
    ///
    /// Always; see [`VfsCache::contents`].
    pub fn input_stream(&self, dir: FileId) -> Result<Box<dyn Read + Send>, VfsError> {
        Err(self.unsupported_on_directory("input_stream", dir))
    }

    /// Opening a directory for writing is never supported.
    ///
    /// # Errors
    ///
    /// Always; see [`VfsCache::contents`].
    pub fn output_stream(&self, dir: FileId) -> Result<Box<dyn Write + Send>, VfsError> {
        Err(self.unsupported_on_directory("output_stream", dir))
    }

    fn unsupported_on_directory(&self, op: &'static str, dir: FileId) -> VfsError {
        match self.live_dir(dir) {
            Ok(_) => {
                tracing::warn!(op, dir = %dir, "byte-stream access attempted on a directory");
                VfsError::UnsupportedOperation { op, id: dir }
            }
            Err(e) => e,
        }
    }

    pub(super) fn invalidate_subtree(&self, entry: &Arc<VirtualEntry>) {
        let mut stack = vec![Arc::clone(entry)];
        while let Some(current) = stack.pop() {
            current.invalidate();
            self.table.remove(current.id());
            if let Some(data) = current.directory() {
                stack.extend(self.entries_of(&data.snapshot()));
            }
        }
    }

    /// Valid directory entry for `id`.
    pub(super) fn live_dir(&self, id: FileId) -> Result<Arc<VirtualEntry>, VfsError> {
        let entry = self.table.get(id).ok_or(VfsError::StaleHandle { id })?;
        if !entry.is_valid() {
            return Err(VfsError::StaleHandle { id });
        }
        if !entry.is_directory() {
            return Err(VfsError::NotADirectory { id });
        }
        Ok(entry)
    }

    /// Directory state of an entry [`live_dir`](Self::live_dir) vouched for.
    pub(super) fn dir_data(entry: &VirtualEntry) -> &DirectoryData {
        entry
            .directory()
            .unwrap_or_else(|| unreachable!("live_dir only returns directories"))
    }

    /// Name of child `id`; empty for an id no longer in the table. Only a
    /// lock-free reader holding an outdated snapshot can hit that case.
    pub(super) fn child_name(&self, id: FileId) -> Arc<str> {
        self.table
            .get(id)
            .map_or_else(|| Arc::from(""), |e| self.name_of(&e))
    }

    /// Binary search of `name` in a sorted child array. `Err` carries the
    /// insertion point.
    pub(super) fn find_index(
        &self,
        ids: &[FileId],
        name: &str,
        case_sensitive: bool,
    ) -> Result<usize, usize> {
        ids.binary_search_by(|&id| compare_names(&self.child_name(id), name, case_sensitive))
    }

    pub(super) fn entries_of(&self, ids: &[FileId]) -> Vec<Arc<VirtualEntry>> {
        ids.iter().filter_map(|&id| self.table.get(id)).collect()
    }

    pub(super) fn bump(&self) {
        self.modcount.increment();
    }
}
