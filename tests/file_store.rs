//! File-backed store: state survives reopening and the directory lock is exclusive.

mod common;

use common::{email, item, Harness};
use tempfile::TempDir;
use topicwatch::email::META_CHANGE_SUMMARY_ID;
use topicwatch::{DataStore, Error, Frequency, StoreConfig, StoreError};
use uuid::Uuid;

fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("subscriptions"),
        ..Default::default()
    }
}

#[test]
fn test_cycle_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let bob = Uuid::new_v4();

    let key = {
        let store = DataStore::open_or_create(store_config(&dir)).unwrap();
        let h = Harness::with(store.repositories(), common::config());
        h.source.set_search("name=bob", vec![item(bob, "Bob")]);
        let key = h.subscribe_search("user@example.com", "name=bob", None, Frequency::Realtime);
        assert_eq!(h.cycle().initialised, 1);
        key
    };

    let change_id = {
        let store = DataStore::open_or_create(store_config(&dir)).unwrap();
        let h = Harness::with(store.repositories(), common::config());
        let stored = h.stored(&key);
        assert!(stored.is_initialised());
        assert!(h
            .repositories
            .snapshots
            .exists(stored.snapshot_blob.as_deref().unwrap())
            .unwrap());

        h.source.set_search("name=bob", vec![item(bob, "Bob")]);
        assert_eq!(h.cycle().no_change, 1);

        h.source.set_search("name=bob", vec![item(bob, "Bob2")]);
        assert_eq!(h.cycle().notified, 1);
        let last = h.sender.last().unwrap();
        last.metadata(META_CHANGE_SUMMARY_ID).unwrap().parse::<Uuid>().unwrap()
    };

    let store = DataStore::open(store_config(&dir)).unwrap();
    let h = Harness::with(store.repositories(), common::config());
    let summary = h.service.get_change_summary(change_id).unwrap().unwrap();
    assert_eq!(summary.modified.len(), 1);

    let trail = h.repositories.audit_trail(&email("user@example.com")).unwrap();
    assert!(trail.iter().any(|t| t.starts_with("Initialised subscription")));
    assert!(trail.iter().any(|t| t.starts_with("Notified subscription")));
}

#[test]
fn test_block_list_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = DataStore::open_or_create(store_config(&dir)).unwrap();
        let h = Harness::with(store.repositories(), common::config());
        h.service.block(&email("blocked@example.com")).unwrap();
    }

    let store = DataStore::open(store_config(&dir)).unwrap();
    let h = Harness::with(store.repositories(), common::config());
    assert!(h.service.is_blocked(&email("blocked@example.com")).unwrap());
}

#[test]
fn test_second_open_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let _store = DataStore::open_or_create(store_config(&dir)).unwrap();

    match DataStore::open(store_config(&dir)) {
        Err(Error::Store(StoreError::Locked)) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second open should be locked out"),
    }
}

#[test]
fn test_open_missing_store() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        create_if_missing: false,
        ..store_config(&dir)
    };
    assert!(matches!(
        DataStore::open_or_create(config),
        Err(Error::Store(StoreError::NotInitialized))
    ));
}
