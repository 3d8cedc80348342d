use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;

use crate::TransactionIsolation;
use crate::conflict::detection::detect_conflicts;
use crate::conflict::resolution::ConflictResolution;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::data_store::versioned_value::VersionedValue;
use crate::document::{Document, DocumentId};
use crate::errors::{FolioError, Result};
use crate::index::{IndexBatch, Indexer};
use crate::storage::{Storage, StorageMutation};

/// A server-side field assignment, applied to whatever version of the document
/// is current at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub field: String,
    pub value: Value,
}

/// A change staged in a transaction's write set.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange {
    /// Insert or fully replace the document.
    Put(Document),
    /// Assign individual fields without reading the document first.
    Patch(Vec<FieldPatch>),
    /// Remove the document.
    Delete,
}

/// Represents a single transaction.
///
/// A transaction provides a mechanism for performing a series of read, write,
/// patch and delete operations on the document buffer atomically and in
/// isolation. Transactions are created by the `DocumentStore` and manage their
/// own read and write sets.
pub struct Transaction {
    /// Unique identifier for the transaction.
    id: u64,
    /// Etag of the latest commit published when the transaction started.
    snapshot_etag: u64,
    /// The isolation level for this transaction.
    isolation_level: TransactionIsolation,
    /// Reference to the transaction buffer.
    txn_buffer: Arc<TxnBuffer>,
    /// Reference to the global etag counter.
    transaction_counter: Arc<AtomicU64>,
    /// Advanced to each commit etag once its changes are visible.
    published_etag: Arc<AtomicU64>,
    /// Reference to the storage implementation.
    storage: Arc<dyn Storage>,
    /// Serializes validation and publication of commits.
    commit_lock: Arc<Mutex<()>>,
    /// Receives committed change sets for query indexing.
    indexer: Arc<Indexer>,
    /// The documents read by this transaction and the version recorded
    /// (0 when absent).
    read_set: HashMap<DocumentId, u64>,
    /// Staged changes (puts, patches, deletions) for this transaction.
    write_set: HashMap<DocumentId, StagedChange>,
    /// The conflict resolution strategy for this transaction.
    conflict_resolution: ConflictResolution,
}

impl Transaction {
    /// Creates a new transaction.
    ///
    /// This is called by `DocumentStore` when a session is opened; the store
    /// hands over clones of its shared components.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        snapshot_etag: u64,
        isolation_level: TransactionIsolation,
        txn_buffer: Arc<TxnBuffer>,
        transaction_counter: Arc<AtomicU64>,
        published_etag: Arc<AtomicU64>,
        storage: Arc<dyn Storage>,
        commit_lock: Arc<Mutex<()>>,
        indexer: Arc<Indexer>,
        conflict_resolution: ConflictResolution,
    ) -> Self {
        Self {
            id,
            snapshot_etag,
            isolation_level,
            txn_buffer,
            transaction_counter,
            published_etag,
            storage,
            commit_lock,
            indexer,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            conflict_resolution,
        }
    }

    /// Returns the unique identifier of the transaction.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation_level(&self) -> TransactionIsolation {
        self.isolation_level
    }

    /// `true` if anything is staged for commit.
    pub fn has_changes(&self) -> bool {
        !self.write_set.is_empty()
    }

    /// Reads the document stored under `key`.
    ///
    /// Changes staged by this transaction take precedence over the committed
    /// state. The committed version read is recorded in the read set (0 when
    /// the document did not exist): the first one under `RepeatableRead`,
    /// where commit validates every recorded read, and the latest one under
    /// `ReadCommitted`, where only the reads of written ids are validated.
    ///
    /// # Errors
    ///
    /// Reads from the in-memory buffer do not fail today; the `Result` leaves
    /// room for storage-backed reads.
    pub fn read(&mut self, key: &str) -> Result<Option<Arc<Document>>> {
        let pending_patches = match self.write_set.get(key) {
            Some(StagedChange::Put(document)) => return Ok(Some(Arc::new(document.clone()))),
            Some(StagedChange::Delete) => return Ok(None),
            Some(StagedChange::Patch(patches)) => Some(patches.clone()),
            None => None,
        };

        let committed = self.read_committed(key);
        match (committed, pending_patches) {
            (Some(document), Some(patches)) => {
                let mut patched = (*document).clone();
                for patch in patches {
                    patched.set_field(&patch.field, patch.value);
                }
                Ok(Some(Arc::new(patched)))
            }
            (committed, _) => Ok(committed),
        }
    }

    fn read_committed(&mut self, key: &str) -> Option<Arc<Document>> {
        let versioned_value = self.txn_buffer.get(key);
        let version = versioned_value.as_ref().map_or(0, VersionedValue::version);
        match self.isolation_level {
            TransactionIsolation::RepeatableRead => {
                self.read_set.entry(key.to_string()).or_insert(version);
            }
            TransactionIsolation::ReadCommitted => {
                self.read_set.insert(key.to_string(), version);
            }
        }
        versioned_value.map(|value| Arc::clone(value.data()))
    }

    /// Stages a full write of `document` under `key`.
    ///
    /// # Errors
    ///
    /// Staging does not fail today; conflicts surface at commit.
    pub fn write(&mut self, key: DocumentId, document: Document) -> Result<()> {
        self.write_set.insert(key, StagedChange::Put(document));
        Ok(())
    }

    /// Stages a field assignment on the document stored under `key`.
    ///
    /// Patches of a document already staged for a full write are folded into
    /// that write. Patching a document staged for deletion is ignored.
    ///
    /// # Errors
    ///
    /// Staging does not fail today; a patch of a missing document is skipped
    /// at commit.
    pub fn patch(&mut self, key: DocumentId, field: &str, value: Value) -> Result<()> {
        match self.write_set.get_mut(&key) {
            Some(StagedChange::Put(document)) => document.set_field(field, value),
            Some(StagedChange::Patch(patches)) => patches.push(FieldPatch {
                field: field.to_string(),
                value,
            }),
            Some(StagedChange::Delete) => {
                debug!(
                    "Transaction {} ignores patch of {} staged for deletion",
                    self.id, key
                );
            }
            None => {
                self.write_set.insert(
                    key,
                    StagedChange::Patch(vec![FieldPatch {
                        field: field.to_string(),
                        value,
                    }]),
                );
            }
        }
        Ok(())
    }

    /// Stages a delete operation for a key.
    ///
    /// # Errors
    ///
    /// Staging does not fail today; deleting a missing id is a no-op.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.write_set.insert(key.to_string(), StagedChange::Delete);
        Ok(())
    }

    /// Attempts to commit the transaction.
    ///
    /// 1. Takes the store-wide commit lock.
    /// 2. Validates the read and write sets against the transaction buffer.
    /// 3. Applies the configured `ConflictResolution` to any conflicts.
    /// 4. Assigns a commit etag and resolves patches against the current
    ///    committed documents.
    /// 5. Persists the resulting mutations through `Storage`.
    /// 6. Publishes them to the transaction buffer and enqueues them for indexing.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::TransactionConflict` if a conflict is detected and
    /// the resolution strategy is `Fail`, or the storage error if persisting
    /// fails. Either way nothing of this transaction becomes visible.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::prelude::*;
    ///
    /// let store = DocumentStore::open_in_memory().unwrap();
    /// let mut transaction = store.start_transaction();
    /// transaction
    ///     .write("books/1".to_string(), Document::new("Books", Default::default()))
    ///     .unwrap();
    /// transaction.commit().unwrap();
    ///
    /// let mut reader = store.start_transaction();
    /// assert!(reader.read("books/1").unwrap().is_some());
    /// ```
    pub fn commit(self) -> Result<()> {
        if self.write_set.is_empty() {
            debug!("Transaction {} has nothing to commit", self.id);
            return Ok(());
        }

        let _commit_guard = self.commit_lock.lock();
        let mut write_set_to_apply = self.write_set;

        let conflicts = detect_conflicts(
            self.snapshot_etag,
            self.isolation_level,
            &self.read_set,
            &write_set_to_apply,
            &self.txn_buffer,
        );

        if !conflicts.is_empty() {
            match self.conflict_resolution {
                ConflictResolution::Fail => {
                    debug!(
                        "Transaction {} aborted on {} conflicting documents",
                        self.id,
                        conflicts.len()
                    );
                    return Err(FolioError::TransactionConflict);
                }
                ConflictResolution::Ignore => {
                    write_set_to_apply.retain(|key, _| !conflicts.contains_key(key));
                    debug!(
                        "Conflict detected for transaction {}. Resolution: Ignore. Filtered {} conflicting changes.",
                        self.id,
                        conflicts.len()
                    );
                }
                ConflictResolution::Replace => {
                    debug!(
                        "Conflict detected for transaction {}. Resolution: Replace. Conflicting changes will overwrite existing documents.",
                        self.id
                    );
                }
            }
        }

        let commit_etag = self.transaction_counter.fetch_add(1, Ordering::SeqCst);

        let mut mutations_to_persist: Vec<StorageMutation> = Vec::new();
        let mut published: Vec<(DocumentId, Option<Arc<Document>>)> = Vec::new();
        for (key, change) in write_set_to_apply {
            match change {
                StagedChange::Put(document) => {
                    mutations_to_persist.push(StorageMutation::Insert(key.clone(), document.clone()));
                    published.push((key, Some(Arc::new(document))));
                }
                StagedChange::Patch(patches) => match self.txn_buffer.get(&key) {
                    Some(current) => {
                        let mut document = (**current.data()).clone();
                        for patch in patches {
                            document.set_field(&patch.field, patch.value);
                        }
                        mutations_to_persist.push(StorageMutation::Insert(key.clone(), document.clone()));
                        published.push((key, Some(Arc::new(document))));
                    }
                    None => debug!("Transaction {} skips patch of missing document {}", self.id, key),
                },
                StagedChange::Delete => {
                    if self.txn_buffer.get(&key).is_some() {
                        mutations_to_persist.push(StorageMutation::Delete(key.clone()));
                        published.push((key, None));
                    }
                }
            }
        }

        if mutations_to_persist.is_empty() {
            debug!("Transaction {} committed without effective changes", self.id);
            return Ok(());
        }

        self.storage.apply_mutations(mutations_to_persist)?;

        for (key, change) in &published {
            match change {
                Some(document) => self.txn_buffer.insert(
                    key.clone(),
                    VersionedValue::new(Arc::clone(document), commit_etag),
                ),
                None => {
                    self.txn_buffer.delete(key);
                }
            }
        }
        self.published_etag.store(commit_etag, Ordering::SeqCst);
        self.indexer.submit(IndexBatch {
            etag: commit_etag,
            changes: published,
        });

        debug!("Transaction {} committed at etag {}", self.id, commit_etag);
        Ok(())
    }

    /// Aborts the transaction, discarding staged changes.
    ///
    /// The transaction buffer remains unaffected by the operations performed
    /// within this transaction.
    pub fn rollback(self) {
        debug!("Transaction {} rolled back", self.id);
        // The `write_set` and `read_set` are dropped when `self` is dropped.
    }
}
