//! A record store and delegate that directly overlay the host filesystem.
//!
//! Ids are handed out on first sight of a path and never reused for the
//! lifetime of the process. The store remembers which directories it has
//! listed, which is all the cache needs to trust a listing.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use vfs_dircache::fs::{
    FakeChild, FileAttributes, FileId, FileRecordStore, FileSystemDelegate, ListedChild,
    RawRecordId, VirtualEntry,
};

/// Id of the browsed root directory.
pub const ROOT_ID: FileId = FileId::new_unchecked(1);

#[derive(Default)]
struct Records {
    /// Index `id - 1` holds the path of `id`.
    paths: Vec<PathBuf>,
    by_path: FxHashMap<PathBuf, FileId>,
    persisted: FxHashMap<FileId, Vec<String>>,
    fully_listed: FxHashSet<FileId>,
}

impl Records {
    fn path(&self, id: FileId) -> Option<&Path> {
        self.paths
            .get(id.get() as usize - 1)
            .map(PathBuf::as_path)
    }

    fn assign(&mut self, parent: FileId, name: &str, path: PathBuf) -> FileId {
        if let Some(&id) = self.by_path.get(&path) {
            return id;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "u32::MAX distinct paths exhaust memory long before the id space"
        )]
        let id = FileId::new_unchecked(self.paths.len() as u32 + 1);
        self.paths.push(path.clone());
        self.by_path.insert(path, id);
        self.persisted
            .entry(parent)
            .or_default()
            .push(name.to_owned());
        id
    }
}

fn attributes_from(meta: &Metadata, name: Option<&str>) -> FileAttributes {
    let file_type = meta.file_type();
    let mut attrs = FileAttributes::empty();
    attrs.set(FileAttributes::DIRECTORY, file_type.is_dir());
    attrs.set(FileAttributes::SYMLINK, file_type.is_symlink());
    attrs.set(
        FileAttributes::SPECIAL,
        !file_type.is_dir() && !file_type.is_file() && !file_type.is_symlink(),
    );
    attrs.set(FileAttributes::WRITABLE, !meta.permissions().readonly());
    attrs.set(
        FileAttributes::HIDDEN,
        name.is_some_and(|n| n.starts_with('.')),
    );
    attrs
}

/// [`FileRecordStore`] over a directory of the host filesystem.
pub struct LocalRecordStore {
    records: Mutex<Records>,
}

impl LocalRecordStore {
    /// Creates a store whose record [`ROOT_ID`] is `root`.
    pub fn new(root: PathBuf) -> Self {
        let mut records = Records::default();
        records.paths.push(root.clone());
        records.by_path.insert(root, ROOT_ID);
        Self {
            records: Mutex::new(records),
        }
    }

    /// Host path of record `id`.
    pub fn path_of(&self, id: FileId) -> Option<PathBuf> {
        self.records.lock().path(id).map(Path::to_path_buf)
    }
}

impl FileRecordStore for LocalRecordStore {
    fn id_for(
        &self,
        parent: FileId,
        name: &str,
        _delegate: &dyn FileSystemDelegate,
    ) -> RawRecordId {
        let Some(path) = self.path_of(parent).map(|p| p.join(name)) else {
            return 0;
        };
        if std::fs::symlink_metadata(&path).is_err() {
            debug!(path = %path.display(), "no such file");
            return 0;
        }
        self.records.lock().assign(parent, name, path).into()
    }

    fn name_of(&self, id: FileId) -> Option<String> {
        self.path_of(id)?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    fn attributes_of(&self, id: FileId) -> FileAttributes {
        let Some(path) = self.path_of(id) else {
            return FileAttributes::empty();
        };
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => attributes_from(&meta, path.file_name().and_then(|n| n.to_str())),
            Err(e) => {
                warn!(path = %path.display(), "failed to stat: {e}");
                FileAttributes::empty()
            }
        }
    }

    fn list_all(&self, parent: FileId) -> Vec<ListedChild> {
        let Some(dir) = self.path_of(parent) else {
            return Vec::new();
        };
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(path = %dir.display(), "failed to list directory: {e}");
                return Vec::new();
            }
        };

        let mut records = self.records.lock();
        let mut listing = Vec::new();
        for entry in read_dir.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping non UTF-8 name");
                continue;
            };
            let id = records.assign(parent, &name, entry.path());
            listing.push(ListedChild::new(name, id));
        }
        records.fully_listed.insert(parent);
        listing
    }

    fn list_persisted(&self, parent: FileId) -> Vec<String> {
        self.records
            .lock()
            .persisted
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    fn were_children_ever_listed(&self, parent: FileId) -> bool {
        let records = self.records.lock();
        records.fully_listed.contains(&parent) || records.persisted.contains_key(&parent)
    }

    fn are_children_fully_loaded(&self, parent: FileId) -> bool {
        self.records.lock().fully_listed.contains(&parent)
    }
}

/// [`FileSystemDelegate`] answering from the host filesystem.
pub struct LocalDelegate {
    store: Arc<LocalRecordStore>,
    case_sensitive: bool,
}

impl LocalDelegate {
    pub fn new(store: Arc<LocalRecordStore>, case_sensitive: bool) -> Self {
        Self {
            store,
            case_sensitive,
        }
    }
}

impl FileSystemDelegate for LocalDelegate {
    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn canonical_spelling(&self, child: &FakeChild<'_>) -> String {
        if self.case_sensitive {
            return child.name.to_owned();
        }
        let Some(dir) = self.store.path_of(child.parent) else {
            return child.name.to_owned();
        };
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            return child.name.to_owned();
        };
        let wanted = child.name.to_lowercase();
        read_dir
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .find(|n| n.to_lowercase() == wanted)
            .unwrap_or_else(|| child.name.to_owned())
    }

    fn attributes(&self, child: &FakeChild<'_>) -> Option<FileAttributes> {
        let path = self.store.path_of(child.parent)?.join(child.name);
        let meta = std::fs::symlink_metadata(&path).ok()?;
        Some(attributes_from(&meta, Some(child.name)))
    }

    fn is_directory(&self, entry: &VirtualEntry) -> bool {
        self.store
            .path_of(entry.id())
            .and_then(|p| std::fs::symlink_metadata(p).ok())
            .is_some_and(|m| m.is_dir())
    }
}
