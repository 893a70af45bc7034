//! Ordering verification.
//!
//! Candidate arrays are checked before they are published, so a failed check
//! leaves the previous array in place. Checks run only with
//! [`CacheConfig::check_consistency`](crate::config::CacheConfig::check_consistency);
//! [`VfsCache::verify`] runs them on demand regardless.

use std::cmp::Ordering;

use crate::fs::FileId;
use crate::fs::entry::VirtualEntry;
use crate::fs::error::{CorruptionError, EntryReport, OrderingReport, VfsError};
use crate::fs::store::FileRecordStore;
use crate::fs::vfs::VfsCache;
use crate::names::compare_names;

impl<S: FileRecordStore> VfsCache<S> {
    /// Checks that `ids` is strictly increasing under the directory's
    /// comparator. `details` is only evaluated on failure.
    pub(super) fn check_order(
        &self,
        dir: &VirtualEntry,
        ids: &[FileId],
        details: impl FnOnce() -> String,
    ) -> Result<(), CorruptionError> {
        if !self.config.check_consistency {
            return Ok(());
        }
        self.verify_order(dir, ids, details)
    }

    /// Verifies the cached state of `dir`: strict child ordering, and no
    /// child name that is also adopted.
    ///
    /// # Errors
    ///
    /// [`VfsError::StaleHandle`], [`VfsError::NotADirectory`], or the
    /// [`CorruptionError`] describing the first violation found.
    pub fn verify(&self, dir: FileId) -> Result<(), VfsError> {
        let dir_entry = self.live_dir(dir)?;
        let guard = Self::dir_data(&dir_entry).lock();
        let ids = guard.children();
        self.verify_order(&dir_entry, &ids, || "explicit verification".to_owned())?;
        for &id in ids.iter() {
            let name = self.child_name(id);
            if guard.adopted().contains(&name) {
                let fault = CorruptionError::AdoptedChild {
                    parent: dir,
                    child: id,
                    name: name.to_string(),
                };
                tracing::error!("{fault}");
                return Err(fault.into());
            }
        }
        Ok(())
    }

    fn verify_order(
        &self,
        dir: &VirtualEntry,
        ids: &[FileId],
        details: impl FnOnce() -> String,
    ) -> Result<(), CorruptionError> {
        let cs = dir.directory().is_none_or(|d| d.case_sensitive());
        let Some(pair) = ids.windows(2).find(|pair| {
            compare_names(&self.child_name(pair[0]), &self.child_name(pair[1]), cs)
                != Ordering::Less
        }) else {
            return Ok(());
        };

        let report = OrderingReport {
            directory: dir.id(),
            case_sensitive: cs,
            previous: self.entry_report(pair[0]),
            next: self.entry_report(pair[1]),
            children: ids.iter().map(|&id| self.entry_report(id)).collect(),
            details: details(),
        };
        tracing::error!(dir = %dir.id(), "{report}");
        Err(CorruptionError::OrderingViolation(Box::new(report)))
    }

    fn entry_report(&self, id: FileId) -> EntryReport {
        match self.table.get(id) {
            Some(entry) => EntryReport {
                id,
                name: self.name_of(&entry).to_string(),
                parent: entry.parent(),
                is_directory: entry.is_directory(),
            },
            None => EntryReport {
                id,
                name: String::new(),
                parent: None,
                is_directory: false,
            },
        }
    }
}
