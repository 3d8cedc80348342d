//! RocksDB-backed implementation of the `Storage` trait.
//!
//! Each document is stored as JSON under its id. The mutations of one commit
//! go into a single `WriteBatch`, which RocksDB applies atomically.

use std::path::Path;

use log::debug;
use rocksdb::{DB, IteratorMode, Options, WriteBatch};

use crate::document::{Document, DocumentId};
use crate::errors::{FolioError, Result};
use crate::storage::{Storage, StorageMutation};

pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::StorageError` if RocksDB cannot open the directory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).map_err(|e| FolioError::StorageError(e.to_string()))?;
        debug!("Opened RocksDB document storage at {}", path.display());
        Ok(Self { db })
    }

    /// Reads a persisted document directly from disk.
    pub fn get(&self, key: &str) -> Result<Option<Document>> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| FolioError::StorageError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Storage for RocksDbStorage {
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for mutation in &mutations {
            match mutation {
                StorageMutation::Insert(key, document) => {
                    batch.put(key.as_bytes(), serde_json::to_vec(document)?);
                }
                StorageMutation::Delete(key) => batch.delete(key.as_bytes()),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| FolioError::StorageError(e.to_string()))
    }

    fn load_documents(&self) -> Result<Vec<(DocumentId, Document)>> {
        let mut documents = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(|e| FolioError::StorageError(e.to_string()))?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| FolioError::StorageError(format!("non-utf8 document id: {e}")))?;
            documents.push((id, serde_json::from_slice(&value)?));
        }
        Ok(documents)
    }
}
