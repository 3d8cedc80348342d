use crate::document::{Document, DocumentId};
use crate::errors::Result;

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::MemoryStorage;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStorage;

/// Represents a single mutation to be applied to the storage layer.
///
/// `StorageMutation` is used to describe a change (insert, update, or delete)
/// that needs to be persisted to durable storage as part of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageMutation {
    /// Insert or update the document stored under the given id.
    /// If a document with the same id already exists, it is replaced.
    Insert(DocumentId, Document),
    /// Delete the document with the given id.
    /// If no document with the id exists, this mutation is a no-op.
    Delete(DocumentId),
}

impl StorageMutation {
    pub fn key(&self) -> &str {
        match self {
            StorageMutation::Insert(key, _) | StorageMutation::Delete(key) => key,
        }
    }
}

/// Trait for interacting with a storage layer to persist committed documents.
///
/// Implementations of this trait are responsible for durably storing the
/// documents managed by the store. A commit hands over the full list of
/// `StorageMutation`s it produced; the storage implementation must ensure that
/// either all mutations in a single `apply_mutations` call are persisted, or
/// none are.
///
/// Implementations must be `Send` and `Sync` to be used concurrently by multiple
/// sessions.
pub trait Storage: Send + Sync {
    /// Atomically applies the given mutations to the storage layer.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::StorageError` if the atomic application of mutations
    /// fails. The commit that produced them is then aborted and the in-memory
    /// state is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::prelude::*;
    ///
    /// struct CountingStorage;
    ///
    /// impl Storage for CountingStorage {
    ///     fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
    ///         for mutation in &mutations {
    ///             println!("persisting {}", mutation.key());
    ///         }
    ///         Ok(())
    ///     }
    /// }
    /// ```
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()>;

    /// Returns every persisted document, used to warm the store on open.
    fn load_documents(&self) -> Result<Vec<(DocumentId, Document)>> {
        Ok(Vec::new())
    }
}
