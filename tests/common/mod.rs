#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vfs_dircache::config::CacheConfig;
use vfs_dircache::fs::refresh::{CreateEvent, RefreshQueue};
use vfs_dircache::fs::{
    FakeChild, FileAttributes, FileId, FileRecordStore, FileSystemDelegate, ListedChild,
    RawRecordId, VfsCache, VirtualEntry,
};
use vfs_dircache::modcount::ModificationCounter;
use vfs_dircache::names::name_key;

pub const ROOT: FileId = FileId::new_unchecked(1);

pub fn id(raw: u32) -> FileId {
    FileId::new_unchecked(raw)
}

#[derive(Clone, Debug)]
pub struct MockRecord {
    pub parent: FileId,
    pub name: String,
    pub attrs: FileAttributes,
}

#[derive(Default)]
pub struct MockState {
    pub records: HashMap<FileId, MockRecord>,
    /// Extra `(parent, child)` rows returned by `list_all`, to fake a broken store.
    pub extra_listing: Vec<(FileId, ListedChild)>,
    pub fully_loaded: HashSet<FileId>,
    pub ever_listed: HashSet<FileId>,
}

/// In-memory record store that counts every call the cache makes.
pub struct MockStore {
    pub case_sensitive: bool,
    pub state: Mutex<MockState>,
    pub id_for_calls: AtomicUsize,
    pub list_all_calls: AtomicUsize,
    pub name_of_calls: AtomicUsize,
}

impl MockStore {
    /// A store holding only the root directory.
    pub fn new(case_sensitive: bool) -> Self {
        let mut state = MockState::default();
        state.records.insert(
            ROOT,
            MockRecord {
                parent: ROOT,
                name: "root".to_owned(),
                attrs: FileAttributes::DIRECTORY | FileAttributes::WRITABLE,
            },
        );
        Self {
            case_sensitive,
            state: Mutex::new(state),
            id_for_calls: AtomicUsize::new(0),
            list_all_calls: AtomicUsize::new(0),
            name_of_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_file(&self, parent: FileId, name: &str, raw: u32) -> FileId {
        self.add(parent, name, raw, FileAttributes::WRITABLE)
    }

    pub fn add_dir(&self, parent: FileId, name: &str, raw: u32) -> FileId {
        self.add(
            parent,
            name,
            raw,
            FileAttributes::DIRECTORY | FileAttributes::WRITABLE,
        )
    }

    pub fn add(&self, parent: FileId, name: &str, raw: u32, attrs: FileAttributes) -> FileId {
        let child = id(raw);
        self.state.lock().unwrap().records.insert(
            child,
            MockRecord {
                parent,
                name: name.to_owned(),
                attrs,
            },
        );
        child
    }

    pub fn delete(&self, child: FileId) {
        self.state.lock().unwrap().records.remove(&child);
    }

    pub fn rename(&self, child: FileId, new_name: &str) {
        self.state
            .lock()
            .unwrap()
            .records
            .get_mut(&child)
            .unwrap()
            .name = new_name.to_owned();
    }

    pub fn set_attrs(&self, child: FileId, attrs: FileAttributes) {
        self.state
            .lock()
            .unwrap()
            .records
            .get_mut(&child)
            .unwrap()
            .attrs = attrs;
    }

    pub fn mark_fully_loaded(&self, parent: FileId) {
        let mut state = self.state.lock().unwrap();
        state.fully_loaded.insert(parent);
        state.ever_listed.insert(parent);
    }

    pub fn mark_ever_listed(&self, parent: FileId) {
        self.state.lock().unwrap().ever_listed.insert(parent);
    }

    pub fn push_extra_listing(&self, parent: FileId, name: &str, child: FileId) {
        self.state
            .lock()
            .unwrap()
            .extra_listing
            .push((parent, ListedChild::new(name, child)));
    }

    pub fn id_for_calls(&self) -> usize {
        self.id_for_calls.load(Ordering::SeqCst)
    }

    pub fn list_all_calls(&self) -> usize {
        self.list_all_calls.load(Ordering::SeqCst)
    }

    fn find(&self, parent: FileId, name: &str) -> Option<(FileId, MockRecord)> {
        let key = name_key(name, self.case_sensitive);
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|&(&child, r)| {
                child != ROOT
                    && r.parent == parent
                    && name_key(&r.name, self.case_sensitive) == key
            })
            .map(|(&child, r)| (child, r.clone()))
    }
}

impl FileRecordStore for MockStore {
    fn id_for(
        &self,
        parent: FileId,
        name: &str,
        _delegate: &dyn FileSystemDelegate,
    ) -> RawRecordId {
        self.id_for_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().ever_listed.insert(parent);
        self.find(parent, name).map_or(0, |(child, _)| child.into())
    }

    fn name_of(&self, child: FileId) -> Option<String> {
        self.name_of_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .records
            .get(&child)
            .map(|r| r.name.clone())
    }

    fn attributes_of(&self, child: FileId) -> FileAttributes {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&child)
            .map_or(FileAttributes::empty(), |r| r.attrs)
    }

    fn list_all(&self, parent: FileId) -> Vec<ListedChild> {
        self.list_all_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.fully_loaded.insert(parent);
        state.ever_listed.insert(parent);
        let mut listing: Vec<ListedChild> = state
            .records
            .iter()
            .filter(|&(&child, r)| child != ROOT && r.parent == parent)
            .map(|(&child, r)| ListedChild::new(r.name.clone(), child))
            .collect();
        listing.extend(
            state
                .extra_listing
                .iter()
                .filter(|(p, _)| *p == parent)
                .map(|(_, c)| c.clone()),
        );
        listing
    }

    fn list_persisted(&self, parent: FileId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|&(&child, r)| child != ROOT && r.parent == parent)
            .map(|(_, r)| r.name.clone())
            .collect()
    }

    fn were_children_ever_listed(&self, parent: FileId) -> bool {
        self.state.lock().unwrap().ever_listed.contains(&parent)
    }

    fn are_children_fully_loaded(&self, parent: FileId) -> bool {
        self.state.lock().unwrap().fully_loaded.contains(&parent)
    }
}

/// Delegate answering from the same records as the [`MockStore`].
pub struct MockDelegate {
    pub store: Arc<MockStore>,
    pub dirty_new: bool,
    /// Names that canonicalize to the empty string.
    pub unusable: Mutex<HashSet<String>>,
    /// Entries whose live type is reported flipped.
    pub flipped: Mutex<HashSet<FileId>>,
    pub canonical_calls: AtomicUsize,
}

impl MockDelegate {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            dirty_new: false,
            unusable: Mutex::new(HashSet::new()),
            flipped: Mutex::new(HashSet::new()),
            canonical_calls: AtomicUsize::new(0),
        }
    }

    pub fn flip_type(&self, child: FileId) {
        self.flipped.lock().unwrap().insert(child);
    }
}

impl FileSystemDelegate for MockDelegate {
    fn is_case_sensitive(&self) -> bool {
        self.store.case_sensitive
    }

    fn canonical_spelling(&self, child: &FakeChild<'_>) -> String {
        self.canonical_calls.fetch_add(1, Ordering::SeqCst);
        if self.unusable.lock().unwrap().contains(child.name) {
            return String::new();
        }
        self.store
            .find(child.parent, child.name)
            .map_or_else(|| child.name.to_owned(), |(_, r)| r.name)
    }

    fn attributes(&self, child: &FakeChild<'_>) -> Option<FileAttributes> {
        self.store.find(child.parent, child.name).map(|(_, r)| r.attrs)
    }

    fn is_directory(&self, entry: &VirtualEntry) -> bool {
        let stored = self
            .store
            .attributes_of(entry.id())
            .contains(FileAttributes::DIRECTORY);
        stored != self.flipped.lock().unwrap().contains(&entry.id())
    }

    fn mark_new_files_as_dirty(&self) -> bool {
        self.dirty_new
    }
}

/// Refresh queue that records every request.
#[derive(Default)]
pub struct RecordingRefreshQueue {
    pub created: Mutex<Vec<CreateEvent>>,
    pub refreshed: Mutex<Vec<FileId>>,
}

impl RefreshQueue for RecordingRefreshQueue {
    fn process_create(&self, event: &CreateEvent) {
        self.created.lock().unwrap().push(event.clone());
    }

    fn refresh(&self, entry: &VirtualEntry) {
        self.refreshed.lock().unwrap().push(entry.id());
    }
}

pub type MockCache = VfsCache<Arc<MockStore>>;

/// Everything a test needs to poke at a cache from the outside.
pub struct Harness {
    pub cache: MockCache,
    pub store: Arc<MockStore>,
    pub delegate: Arc<MockDelegate>,
    pub counter: Arc<ModificationCounter>,
    pub queue: Arc<RecordingRefreshQueue>,
}

impl Harness {
    pub fn new(store: MockStore) -> Self {
        Self::with_config(store, CacheConfig::diagnostic())
    }

    pub fn with_config(store: MockStore, config: CacheConfig) -> Self {
        let store = Arc::new(store);
        let delegate = Arc::new(MockDelegate::new(Arc::clone(&store)));
        Self::with_delegate(store, delegate, config)
    }

    pub fn with_delegate(
        store: Arc<MockStore>,
        delegate: Arc<MockDelegate>,
        config: CacheConfig,
    ) -> Self {
        let counter = Arc::new(ModificationCounter::new());
        let queue = Arc::new(RecordingRefreshQueue::default());
        let cache = VfsCache::builder(Arc::clone(&store), delegate.clone())
            .config(config)
            .counter(Arc::clone(&counter))
            .refresh_queue(queue.clone())
            .build(ROOT, "root")
            .unwrap();
        Self {
            cache,
            store,
            delegate,
            counter,
            queue,
        }
    }

    /// Cached child names of `dir`, in array order.
    pub fn names(&self, dir: FileId) -> Vec<String> {
        self.cache
            .cached_children(dir)
            .unwrap()
            .iter()
            .map(|e| self.cache.name_of(e).to_string())
            .collect()
    }

    /// Cached child ids of `dir`, in array order.
    pub fn ids(&self, dir: FileId) -> Vec<u32> {
        self.cache
            .cached_children(dir)
            .unwrap()
            .iter()
            .map(|e| e.id().get())
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.counter.get()
    }
}
