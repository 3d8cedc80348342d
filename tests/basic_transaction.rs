mod common;

use std::sync::Arc;

use folio::{
    ConflictResolution, DocumentStore, FolioError, MemoryStorage, StoreOptions,
    TransactionIsolation,
};
use serde_json::json;

use common::{FlakyStorage, INDEX_TIMEOUT, setup_store, thing, value_of};

#[test]
fn test_transaction_ids_increase() {
    let store = DocumentStore::open_in_memory().unwrap();
    let first = store.start_transaction().id();
    let second = store.start_transaction().id();
    assert!(second > first);
}

#[test]
fn test_basic_read_write_commit() {
    let storage = Arc::new(MemoryStorage::new());
    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();

    let mut txn = store.start_transaction();
    txn.write("things/1".to_string(), thing("hundred")).unwrap();
    txn.commit().unwrap();

    // Persisted through the storage layer
    let stored = storage.get("things/1").unwrap();
    assert_eq!(value_of(&stored), Some("hundred"));

    // And visible to later transactions
    let mut txn2 = store.start_transaction();
    let read = txn2.read("things/1").unwrap().unwrap();
    assert_eq!(*read, thing("hundred"));
}

#[test]
fn test_read_your_own_writes() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut txn = store.start_transaction();
    txn.write("things/1".to_string(), thing("staged")).unwrap();
    assert_eq!(value_of(&txn.read("things/1").unwrap().unwrap()), Some("staged"));

    txn.delete("things/1").unwrap();
    assert!(txn.read("things/1").unwrap().is_none());
}

#[test]
fn test_basic_delete_commit() {
    let storage = Arc::new(MemoryStorage::new());
    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();

    let mut txn = store.start_transaction();
    txn.write("things/1".to_string(), thing("doomed")).unwrap();
    txn.commit().unwrap();
    assert!(storage.get("things/1").is_some());

    let mut txn2 = store.start_transaction();
    txn2.delete("things/1").unwrap();
    txn2.commit().unwrap();
    assert!(storage.get("things/1").is_none());

    let mut txn3 = store.start_transaction();
    assert!(txn3.read("things/1").unwrap().is_none());
}

#[test]
fn test_delete_of_missing_id_is_a_no_op() {
    let storage = Arc::new(MemoryStorage::new());
    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();

    let mut txn = store.start_transaction();
    txn.delete("things/404").unwrap();
    assert!(txn.commit().is_ok());
    assert!(storage.is_empty());
}

#[test]
fn test_basic_rollback() {
    let storage = Arc::new(MemoryStorage::new());
    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();

    let mut txn = store.start_transaction();
    txn.write("things/1".to_string(), thing("never")).unwrap();
    txn.rollback();

    assert!(storage.get("things/1").is_none());
    let mut txn2 = store.start_transaction();
    assert!(txn2.read("things/1").unwrap().is_none());
}

#[test]
fn test_patch_applies_to_latest_committed_version() {
    let store = setup_store(TransactionIsolation::RepeatableRead, ConflictResolution::Fail);

    let mut setup = store.start_transaction();
    setup.write("things/1".to_string(), thing("v1")).unwrap();
    setup.commit().unwrap();

    // Staged before a concurrent full write lands
    let mut patcher = store.start_transaction();
    patcher
        .patch("things/1".to_string(), "Color", json!("red"))
        .unwrap();

    let mut writer = store.start_transaction();
    writer.write("things/1".to_string(), thing("v2")).unwrap();
    writer.commit().unwrap();

    // Patches are not validated, so this commits on top of v2
    patcher.commit().unwrap();

    let mut reader = store.start_transaction();
    let document = reader.read("things/1").unwrap().unwrap();
    assert_eq!(value_of(&document), Some("v2"));
    assert_eq!(document.field("Color"), Some(&json!("red")));
}

#[test]
fn test_patch_of_missing_document_is_skipped() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut txn = store.start_transaction();
    txn.patch("things/9".to_string(), "Value", json!("x")).unwrap();
    txn.commit().unwrap();

    let mut reader = store.start_transaction();
    assert!(reader.read("things/9").unwrap().is_none());
    assert_eq!(store.document_count(), 0);
}

#[test]
fn test_patch_to_null_removes_field() {
    let store = DocumentStore::open_in_memory().unwrap();
    let mut setup = store.start_transaction();
    setup.write("things/1".to_string(), thing("gone soon")).unwrap();
    setup.commit().unwrap();

    let mut txn = store.start_transaction();
    txn.patch("things/1".to_string(), "Value", serde_json::Value::Null)
        .unwrap();
    txn.commit().unwrap();

    let mut reader = store.start_transaction();
    let document = reader.read("things/1").unwrap().unwrap();
    assert!(document.field("Value").is_none());
}

#[test]
fn test_storage_failure_publishes_nothing() {
    let storage = Arc::new(FlakyStorage::new());
    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();

    storage.set_failing(true);
    let mut txn = store.start_transaction();
    txn.write("things/1".to_string(), thing("lost")).unwrap();
    txn.write("things/2".to_string(), thing("lost")).unwrap();
    match txn.commit() {
        Err(FolioError::StorageError(_)) => {}
        other => panic!("expected a storage error, got {other:?}"),
    }

    let mut reader = store.start_transaction();
    assert!(reader.read("things/1").unwrap().is_none());
    assert!(reader.read("things/2").unwrap().is_none());
    store.wait_for_indexing(INDEX_TIMEOUT).unwrap();
    assert_eq!(store.collection_count("Things"), 0);

    storage.set_failing(false);
    let mut retry = store.start_transaction();
    retry.write("things/1".to_string(), thing("kept")).unwrap();
    retry.commit().unwrap();
    assert_eq!(value_of(&storage.get("things/1").unwrap()), Some("kept"));
}

#[test]
fn test_reopen_recovers_documents_and_ids() {
    let storage = Arc::new(MemoryStorage::new());
    let first_id;
    {
        let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();
        let mut session = store.open_session();
        let mut book = folio::Book::new("Dune", "Herbert");
        session.store(&mut book).unwrap();
        session.save_changes().unwrap();
        first_id = book.id;
    }

    let store = DocumentStore::open(storage.clone(), StoreOptions::default()).unwrap();
    assert_eq!(store.collection_count("Books"), 1);

    let mut session = store.open_session();
    let recovered: folio::Book = session.load(&first_id).unwrap().unwrap();
    assert_eq!(recovered.title, "Dune");

    let mut another = folio::Book::new("Emma", "Austen");
    session.store(&mut another).unwrap();
    session.save_changes().unwrap();
    assert_ne!(another.id, first_id);
}
