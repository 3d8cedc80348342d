//! Common utilities for folio integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use folio::{
    Book, ConflictResolution, Document, DocumentId, DocumentStore, FolioError, Library,
    LibraryUser, MemoryStorage, Result, Storage, StorageMutation, StoreOptions,
    TransactionIsolation,
};
use serde_json::{Map, Value, json};

pub const INDEX_TIMEOUT: Duration = Duration::from_secs(10);

// --- FlakyStorage ---

/// A `Storage` that delegates to `MemoryStorage` but can be told to fail
/// every `apply_mutations` call.
#[derive(Debug, Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Document> {
        self.inner.get(key)
    }
}

impl Storage for FlakyStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FolioError::StorageError("disk unavailable".to_string()));
        }
        self.inner.apply_mutations(mutations)
    }

    fn load_documents(&self) -> Result<Vec<(DocumentId, Document)>> {
        self.inner.load_documents()
    }
}

// --- SlowStorage ---

/// A `MemoryStorage` whose commits take `set_delay` long to persist, keeping a
/// commit between etag assignment and publication for that time.
#[derive(Debug, Default)]
pub struct SlowStorage {
    inner: MemoryStorage,
    delay_ms: AtomicU64,
}

impl SlowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Storage for SlowStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms));
        }
        self.inner.apply_mutations(mutations)
    }

    fn load_documents(&self) -> Result<Vec<(DocumentId, Document)>> {
        self.inner.load_documents()
    }
}

// --- Helper Functions ---

/// Creates an in-memory store with the given isolation and resolution.
pub fn setup_store(
    isolation: TransactionIsolation,
    conflict_resolution: ConflictResolution,
) -> Arc<DocumentStore> {
    setup_store_over(Arc::new(MemoryStorage::new()), isolation, conflict_resolution)
}

/// Creates a store over `storage` with the given isolation and resolution.
pub fn setup_store_over(
    storage: Arc<dyn Storage>,
    isolation: TransactionIsolation,
    conflict_resolution: ConflictResolution,
) -> Arc<DocumentStore> {
    let options = StoreOptions {
        isolation,
        conflict_resolution,
        ..StoreOptions::default()
    };
    Arc::new(DocumentStore::open(storage, options).unwrap())
}

pub fn setup_library() -> Library {
    Library::new(setup_store(
        TransactionIsolation::RepeatableRead,
        ConflictResolution::Fail,
    ))
}

/// A document in collection `Things` with a single `Value` field.
pub fn thing(value: &str) -> Document {
    let mut body = Map::new();
    body.insert("Value".to_string(), json!(value));
    Document::new("Things", body)
}

pub fn value_of(document: &Document) -> Option<&str> {
    document.field("Value").and_then(Value::as_str)
}

/// Seeds books titled `Something{i}` by `Someone{i}` and returns their ids.
pub fn seed_books(library: &Library, count: usize) -> Vec<DocumentId> {
    let mut books: Vec<Option<Book>> = (1..=count)
        .map(|i| Some(Book::new(format!("Something{i}"), format!("Someone{i}"))))
        .collect();
    library.add_books(&mut books).unwrap();
    books.into_iter().flatten().map(|book| book.id).collect()
}

/// Seeds users named `Someone{i} Else{i}` and returns their ids.
pub fn seed_users(library: &Library, count: usize) -> Vec<DocumentId> {
    let mut users: Vec<Option<LibraryUser>> = (1..=count)
        .map(|i| Some(LibraryUser::new(format!("Someone{i}"), format!("Else{i}"))))
        .collect();
    library.add_users(&mut users).unwrap();
    users.into_iter().flatten().map(|user| user.id).collect()
}

/// Asserts that every book's loan fields agree with the loaned sets of users.
pub fn assert_links_consistent(library: &Library, book_ids: &[DocumentId], user_ids: &[DocumentId]) {
    for book_id in book_ids {
        let book = library.get_book_by_id(book_id).unwrap().unwrap();
        assert!(
            book.has_consistent_loan_state(),
            "partial loan state on {book_id}: {book:?}"
        );
        if let Some(user_id) = &book.loaned_by {
            let user = library.get_user_by_id(user_id).unwrap().unwrap();
            assert!(
                user.loaned_books_ids.contains(book_id),
                "{book_id} loaned by {user_id} but missing from their set"
            );
        }
    }
    for user_id in user_ids {
        let user = library.get_user_by_id(user_id).unwrap().unwrap();
        for book_id in &user.loaned_books_ids {
            let book = library.get_book_by_id(book_id).unwrap().unwrap();
            assert_eq!(
                book.loaned_by.as_deref(),
                Some(user_id.as_str()),
                "{user_id} holds {book_id} which is not loaned to them"
            );
        }
    }
}
