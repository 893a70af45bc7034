#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use vfs_dircache::config::CacheConfig;
use vfs_dircache::fs::{CorruptionError, VfsError};

use common::{Harness, MockStore, ROOT};

/// Caches `b`, then renames it behind the cache's back so the cached name
/// no longer matches where a full listing puts it.
fn renamed_behind_our_back(config: CacheConfig) -> Harness {
    let store = MockStore::new(true);
    store.add_file(ROOT, "a", 2);
    let b = store.add_file(ROOT, "b", 3);
    store.add_file(ROOT, "c", 4);
    let h = Harness::with_config(store, config);
    h.cache.find_child(ROOT, "b").unwrap().unwrap();
    h.store.rename(b, "z");
    h
}

#[tokio::test]
async fn healthy_directory_verifies() {
    let store = MockStore::new(false);
    store.add_file(ROOT, "B", 2);
    store.add_file(ROOT, "a", 3);
    store.add_file(ROOT, "ccc", 4);
    let h = Harness::new(store);
    h.cache.children(ROOT).unwrap();
    h.cache.verify(ROOT).unwrap();
    assert_eq!(h.names(ROOT), ["a", "B", "ccc"]);
}

#[tokio::test]
async fn ordering_violation_is_reported_before_publishing() {
    let h = renamed_behind_our_back(CacheConfig::diagnostic());

    let Err(VfsError::Corruption(CorruptionError::OrderingViolation(report))) =
        h.cache.children(ROOT)
    else {
        panic!("expected an ordering violation");
    };
    assert_eq!(report.directory, ROOT);
    assert_eq!(report.previous.name, "c");
    assert_eq!(report.next.name, "b");
    assert_eq!(report.children.len(), 3);
    assert!(report.details.contains("full listing"));
    assert!(report.to_string().contains("wrongly placed before"));

    assert_eq!(h.names(ROOT), ["b"], "the previous array stays published");
    assert!(!h.cache.is_fully_loaded(ROOT).unwrap());
    assert_eq!(h.cache.entry_count(), 2, "new materializations were rolled back");
}

#[tokio::test]
async fn explicit_verification_runs_without_checks_enabled() {
    let h = renamed_behind_our_back(CacheConfig::default());
    h.cache.children(ROOT).unwrap();

    assert!(matches!(
        h.cache.verify(ROOT),
        Err(VfsError::Corruption(CorruptionError::OrderingViolation(_)))
    ));
}

#[tokio::test]
async fn duplicate_materialization_lists_store_children() {
    let store = MockStore::new(true);
    store.add_file(ROOT, "a", 2);
    let h = Harness::new(store);
    let a = h.cache.find_child(ROOT, "a").unwrap().unwrap();

    let Err(VfsError::Corruption(CorruptionError::DuplicateMaterialization { id, listing, .. })) =
        h.cache.create_child(ROOT, "a", a.id())
    else {
        panic!("expected a duplicate materialization");
    };
    assert_eq!(id, a.id());
    assert_eq!(listing, ["a=#2"]);
}
