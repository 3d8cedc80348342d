//! In-memory implementation of the `Storage` trait.
//!
//! Nothing survives the process, but the mutations of one commit are applied
//! under a single lock so readers of the storage never see half of a commit.

use ahash::AHashMap as HashMap;
use parking_lot::Mutex;

use crate::document::{Document, DocumentId};
use crate::errors::Result;
use crate::storage::{Storage, StorageMutation};

/// Stores documents in a `HashMap` guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<DocumentId, Document>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a persisted document.
    pub fn get(&self, key: &str) -> Option<Document> {
        self.data.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        let mut data = self.data.lock();
        for mutation in mutations {
            match mutation {
                StorageMutation::Insert(key, document) => {
                    data.insert(key, document);
                }
                StorageMutation::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn load_documents(&self) -> Result<Vec<(DocumentId, Document)>> {
        Ok(self
            .data
            .lock()
            .iter()
            .map(|(key, document)| (key.clone(), document.clone()))
            .collect())
    }
}
