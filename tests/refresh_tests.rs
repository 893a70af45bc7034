#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{Harness, MockStore, ROOT, id};

#[tokio::test]
async fn known_absent_name_found_on_disk_is_created_with_event() {
    let h = Harness::new(MockStore::new(true));
    assert!(h.cache.find_child(ROOT, "new").unwrap().is_none());
    h.store.add_file(ROOT, "new", 5);

    assert!(
        h.cache.find_child(ROOT, "new").unwrap().is_none(),
        "a plain lookup trusts the adopted name"
    );
    let found = h.cache.refresh_and_find_child(ROOT, "new").unwrap().unwrap();
    assert_eq!(found.id(), id(5));
    assert!(h.cache.suspicious_names(ROOT).unwrap().is_empty());

    let created = h.queue.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].parent, ROOT);
    assert_eq!(created[0].name, "new");
    assert!(!created[0].is_directory);
}

#[tokio::test]
async fn fully_loaded_directory_picks_up_new_child_on_refresh() {
    let h = Harness::new(MockStore::new(true));
    h.cache.children(ROOT).unwrap();
    h.store.add_dir(ROOT, "late", 6);

    let found = h.cache.refresh_and_find_child(ROOT, "late").unwrap().unwrap();
    assert!(found.is_directory());
    assert_eq!(h.names(ROOT), ["late"]);
    assert!(h.queue.created.lock().unwrap()[0].is_directory);
    h.cache.verify(ROOT).unwrap();
}

#[tokio::test]
async fn name_missing_on_disk_stays_absent() {
    let h = Harness::new(MockStore::new(true));
    assert!(h.cache.refresh_and_find_child(ROOT, "ghost").unwrap().is_none());
    assert!(h.cache.refresh_and_find_child(ROOT, "ghost").unwrap().is_none());
    assert!(h.queue.created.lock().unwrap().is_empty());
    assert_eq!(h.cache.suspicious_names(ROOT).unwrap(), ["ghost"]);
}

#[tokio::test]
async fn created_child_uses_canonical_spelling() {
    let h = Harness::new(MockStore::new(false));
    assert!(h.cache.find_child(ROOT, "NEW").unwrap().is_none());
    h.store.add_file(ROOT, "New", 5);

    let found = h.cache.refresh_and_find_child(ROOT, "new").unwrap().unwrap();
    assert_eq!(&*h.cache.name_of(&found), "New");
    assert_eq!(h.queue.created.lock().unwrap()[0].name, "New");
    assert!(h.cache.suspicious_names(ROOT).unwrap().is_empty());
}

#[tokio::test]
async fn type_change_on_disk_is_sent_for_refresh() {
    let store = MockStore::new(true);
    let dir = store.add_dir(ROOT, "d", 2);
    let h = Harness::new(store);
    h.cache.find_child(ROOT, "d").unwrap().unwrap();

    assert!(h.cache.refresh_and_find_child(ROOT, "d").unwrap().is_some());
    assert!(h.queue.refreshed.lock().unwrap().is_empty());

    h.delegate.flip_type(dir);
    let found = h.cache.refresh_and_find_child(ROOT, "d").unwrap().unwrap();
    assert_eq!(found.id(), dir);
    assert_eq!(*h.queue.refreshed.lock().unwrap(), [dir]);
}
