use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::TransactionIsolation;
use crate::conflict::resolution::ConflictResolution;
use crate::data_store::txn_buffer::TxnBuffer;
use crate::data_store::versioned_value::VersionedValue;
use crate::document::{Document, DocumentId};
use crate::errors::Result;
use crate::index::Indexer;
use crate::session::Session;
use crate::storage::{MemoryStorage, Storage};
use crate::transaction::Transaction;

/// Folio prelude
pub mod prelude {
    pub use crate::conflict::detection::*;
    pub use crate::conflict::resolution::*;
    pub use crate::data_store::txn_buffer::*;
    pub use crate::data_store::versioned_value::*;
    pub use crate::document::*;
    pub use crate::errors::*;
    pub use crate::model::*;
    pub use crate::query::*;
    pub use crate::session::*;
    pub use crate::storage::*;
    pub use crate::store::{CollectionStatistics, DocumentStore, StoreOptions};
    pub use crate::transaction::*;
    pub use crate::TransactionIsolation;
}

/// Etag given to documents recovered from storage on open.
const RECOVERED_ETAG: u64 = 1;

/// Tuning knobs for a `DocumentStore`.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Isolation level of every transaction the store starts.
    pub isolation: TransactionIsolation,
    /// Conflict resolution strategy of every transaction the store starts.
    pub conflict_resolution: ConflictResolution,
    /// Upper bound on how long a non-stale query waits for the indexer.
    pub non_stale_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            isolation: TransactionIsolation::RepeatableRead,
            conflict_resolution: ConflictResolution::Fail,
            non_stale_timeout: Duration::from_secs(15),
        }
    }
}

/// Per-collection document counts as currently indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStatistics {
    pub collections: HashMap<String, u64>,
}

impl CollectionStatistics {
    /// Count for `collection`, zero when the collection has no documents.
    pub fn count(&self, collection: &str) -> u64 {
        self.collections.get(collection).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.collections.values().sum()
    }
}

/// Hands out `<prefix>/<n>` ids, one counter per prefix.
#[derive(Default)]
struct IdGenerator {
    counters: Mutex<HashMap<String, u64>>,
}

impl IdGenerator {
    /// Next id of `prefix` for which `taken` is false.
    fn next(&self, prefix: &str, taken: impl Fn(&str) -> bool) -> DocumentId {
        let mut counters = self.counters.lock();
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let id = format!("{prefix}/{counter}");
            if !taken(&id) {
                return id;
            }
        }
    }

    /// Makes sure an id already in use is never handed out again.
    fn observe(&self, id: &str) {
        if let Some((prefix, number)) = id.rsplit_once('/') {
            if let Ok(number) = number.parse::<u64>() {
                let mut counters = self.counters.lock();
                let counter = counters.entry(prefix.to_string()).or_insert(0);
                *counter = (*counter).max(number);
            }
        }
    }
}

/// The main entry point: an embedded transactional document store.
///
/// Committed documents live in a lock-free transaction buffer, are persisted
/// through a `Storage` implementation, and are indexed asynchronously for
/// queries. Units of work are opened with [`DocumentStore::open_session`].
pub struct DocumentStore {
    /// The transaction buffer holding the latest committed documents.
    txn_buffer: Arc<TxnBuffer>,
    /// A globally increasing counter for transaction ids and commit etags.
    transaction_counter: Arc<AtomicU64>,
    /// Etag of the latest commit visible in the transaction buffer.
    published_etag: Arc<AtomicU64>,
    /// The storage implementation for persisting committed documents.
    storage: Arc<dyn Storage>,
    /// Held while a transaction validates and publishes its changes.
    commit_lock: Arc<Mutex<()>>,
    indexer: Arc<Indexer>,
    indexer_thread: Mutex<Option<JoinHandle<()>>>,
    id_generator: IdGenerator,
    options: StoreOptions,
}

impl DocumentStore {
    /// Opens a store over `storage`, loading any documents it already holds.
    ///
    /// # Errors
    ///
    /// Fails if the storage cannot be read or the indexer thread cannot be
    /// spawned.
    pub fn open(storage: Arc<dyn Storage>, options: StoreOptions) -> Result<Self> {
        let recovered = storage.load_documents()?;
        let (indexer, indexer_thread) = Indexer::start()?;
        let txn_buffer = Arc::new(TxnBuffer::new());
        let id_generator = IdGenerator::default();

        let mut next_etag = RECOVERED_ETAG;
        if !recovered.is_empty() {
            info!("Recovered {} documents from storage", recovered.len());
            let mut seeded = Vec::with_capacity(recovered.len());
            for (id, document) in recovered {
                id_generator.observe(&id);
                let document = Arc::new(document);
                txn_buffer.insert(
                    id.clone(),
                    VersionedValue::new(Arc::clone(&document), RECOVERED_ETAG),
                );
                seeded.push((id, document));
            }
            indexer.seed(seeded, RECOVERED_ETAG);
            next_etag = RECOVERED_ETAG + 1;
        }

        debug!(
            "Opened document store (isolation {:?}, resolution {:?})",
            options.isolation, options.conflict_resolution
        );

        Ok(Self {
            txn_buffer,
            transaction_counter: Arc::new(AtomicU64::new(next_etag)),
            published_etag: Arc::new(AtomicU64::new(next_etag - 1)),
            storage,
            commit_lock: Arc::new(Mutex::new(())),
            indexer,
            indexer_thread: Mutex::new(Some(indexer_thread)),
            id_generator,
            options,
        })
    }

    /// Opens an empty store backed by [`MemoryStorage`] with default options.
    ///
    /// # Errors
    ///
    /// Fails only if the indexer thread cannot be spawned.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryStorage::new()), StoreOptions::default())
    }

    /// Starts a new low-level transaction.
    pub fn start_transaction(&self) -> Transaction {
        // Atomically increment the counter to get a unique id / start etag.
        let transaction_id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        // Commits holding an etag but not yet published are not part of the snapshot.
        let snapshot_etag = self.published_etag.load(Ordering::SeqCst);

        Transaction::new(
            transaction_id,
            snapshot_etag,
            self.options.isolation,
            Arc::clone(&self.txn_buffer),
            Arc::clone(&self.transaction_counter),
            Arc::clone(&self.published_etag),
            Arc::clone(&self.storage),
            Arc::clone(&self.commit_lock),
            Arc::clone(&self.indexer),
            self.options.conflict_resolution,
        )
    }

    /// Opens a unit of work. Nothing it stages is visible until
    /// [`Session::save_changes`].
    pub fn open_session(&self) -> Session<'_> {
        Session::new(self, self.start_transaction())
    }

    /// Number of indexed documents in `collection`. Eventually consistent
    /// with recent commits.
    pub fn collection_count(&self, collection: &str) -> u64 {
        self.indexer.count(collection)
    }

    /// Document counts of every collection, as currently indexed.
    pub fn collection_statistics(&self) -> CollectionStatistics {
        CollectionStatistics {
            collections: self.indexer.collection_counts(),
        }
    }

    /// Blocks until every commit made so far is visible to queries.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::StaleIndexTimeout` if indexing does not catch up
    /// within `timeout`.
    pub fn wait_for_indexing(&self, timeout: Duration) -> Result<()> {
        self.indexer.wait_for_non_stale(timeout)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of committed documents across all collections.
    pub fn document_count(&self) -> usize {
        self.txn_buffer.len()
    }

    pub(crate) fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Generates an id of `prefix` not held by any committed document.
    pub(crate) fn next_id(&self, prefix: &str) -> DocumentId {
        self.id_generator
            .next(prefix, |id| self.txn_buffer.get(id).is_some())
    }

    /// Reserves a caller-supplied id so it is never generated.
    pub(crate) fn observe_id(&self, id: &str) {
        self.id_generator.observe(id);
    }

    /// Committed documents of `collection`, read from the buffer rather than
    /// the index.
    pub fn committed_documents(&self, collection: &str) -> Vec<(DocumentId, Arc<Document>)> {
        self.txn_buffer
            .entries()
            .into_iter()
            .filter(|(_, value)| value.data().collection() == collection)
            .map(|(id, value)| (id, Arc::clone(value.data())))
            .collect()
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.indexer.shutdown();
        if let Some(handle) = self.indexer_thread.lock().take() {
            if handle.join().is_err() {
                warn!("Indexer thread panicked during shutdown");
            }
        }
    }
}
