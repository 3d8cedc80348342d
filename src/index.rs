//! Asynchronous document index backing queries and collection statistics.
//!
//! Every commit enqueues its change set, tagged with the commit etag, onto a
//! channel drained by a dedicated indexer thread. Queries read the indexed
//! snapshot, which may trail the latest commit. A query that asks for
//! non-stale results first waits until the indexer has caught up with every
//! etag submitted before the query started.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::document::{Document, DocumentId};
use crate::errors::{FolioError, Result};

const QUEUE_CAPACITY: usize = 1024;

/// The changes of one committed transaction. `None` marks a deletion.
#[derive(Debug, Clone)]
pub struct IndexBatch {
    pub etag: u64,
    pub changes: Vec<(DocumentId, Option<Arc<Document>>)>,
}

enum IndexCommand {
    Apply(IndexBatch),
    Shutdown,
}

#[derive(Default)]
struct IndexState {
    collections: HashMap<String, HashMap<DocumentId, Arc<Document>>>,
    owners: HashMap<DocumentId, String>,
}

impl IndexState {
    fn apply(&mut self, changes: Vec<(DocumentId, Option<Arc<Document>>)>) {
        for (id, change) in changes {
            if let Some(previous) = self.owners.remove(&id) {
                if let Some(documents) = self.collections.get_mut(&previous) {
                    documents.remove(&id);
                }
            }
            if let Some(document) = change {
                let collection = document.collection().to_string();
                self.owners.insert(id.clone(), collection.clone());
                self.collections
                    .entry(collection)
                    .or_default()
                    .insert(id, document);
            }
        }
    }
}

pub struct Indexer {
    queue: Mutex<Option<Sender<IndexCommand>>>,
    state: RwLock<IndexState>,
    submitted_etag: AtomicU64,
    indexed_etag: Mutex<u64>,
    progress: Condvar,
}

impl Indexer {
    /// Creates the indexer and spawns its worker thread.
    pub(crate) fn start() -> Result<(Arc<Self>, JoinHandle<()>)> {
        let (sender, receiver) = bounded::<IndexCommand>(QUEUE_CAPACITY);
        let indexer = Arc::new(Self {
            queue: Mutex::new(Some(sender)),
            state: RwLock::new(IndexState::default()),
            submitted_etag: AtomicU64::new(0),
            indexed_etag: Mutex::new(0),
            progress: Condvar::new(),
        });

        let worker = Arc::clone(&indexer);
        let handle = thread::Builder::new()
            .name("folio-indexer".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|e| FolioError::Other(format!("failed to spawn indexer thread: {e}")))?;

        Ok((indexer, handle))
    }

    fn run(&self, receiver: Receiver<IndexCommand>) {
        for command in receiver.iter() {
            match command {
                IndexCommand::Apply(batch) => self.apply(batch),
                IndexCommand::Shutdown => {
                    debug!("Indexer shutting down");
                    break;
                }
            }
        }
    }

    fn apply(&self, batch: IndexBatch) {
        let etag = batch.etag;
        self.state.write().apply(batch.changes);
        let mut indexed = self.indexed_etag.lock();
        if etag > *indexed {
            *indexed = etag;
        }
        self.progress.notify_all();
    }

    /// Loads documents recovered from storage, bypassing the queue.
    pub(crate) fn seed(&self, documents: Vec<(DocumentId, Arc<Document>)>, etag: u64) {
        let changes = documents
            .into_iter()
            .map(|(id, document)| (id, Some(document)))
            .collect();
        self.submitted_etag.fetch_max(etag, Ordering::SeqCst);
        self.apply(IndexBatch { etag, changes });
    }

    /// Enqueues a committed change set. Callers submit in etag order.
    pub(crate) fn submit(&self, batch: IndexBatch) {
        self.submitted_etag.fetch_max(batch.etag, Ordering::SeqCst);
        let queue = self.queue.lock();
        let undelivered = match queue.as_ref() {
            Some(sender) => match sender.send(IndexCommand::Apply(batch)) {
                Ok(()) => None,
                Err(err) => match err.into_inner() {
                    IndexCommand::Apply(batch) => Some(batch),
                    IndexCommand::Shutdown => None,
                },
            },
            None => Some(batch),
        };
        drop(queue);
        if let Some(batch) = undelivered {
            warn!("Indexer queue closed; indexing etag {} inline", batch.etag);
            self.apply(batch);
        }
    }

    /// Stops the worker thread after it drains everything already queued.
    pub(crate) fn shutdown(&self) {
        if let Some(sender) = self.queue.lock().take() {
            let _ = sender.send(IndexCommand::Shutdown);
        }
    }

    /// Highest etag handed to the indexer so far.
    pub fn submitted_etag(&self) -> u64 {
        self.submitted_etag.load(Ordering::SeqCst)
    }

    /// Highest etag whose changes are visible to queries.
    pub fn indexed_etag(&self) -> u64 {
        *self.indexed_etag.lock()
    }

    pub fn is_stale(&self) -> bool {
        self.indexed_etag() < self.submitted_etag()
    }

    /// Blocks until everything submitted before this call is indexed.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::StaleIndexTimeout` if the indexer does not catch up
    /// within `timeout`.
    pub fn wait_for_non_stale(&self, timeout: Duration) -> Result<()> {
        self.wait_for_etag(self.submitted_etag(), timeout)
    }

    pub fn wait_for_etag(&self, etag: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut indexed = self.indexed_etag.lock();
        while *indexed < etag {
            if self.progress.wait_until(&mut indexed, deadline).timed_out() && *indexed < etag {
                return Err(FolioError::StaleIndexTimeout {
                    expected: etag,
                    indexed: *indexed,
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        Ok(())
    }

    /// Indexed documents of `collection`, in no particular order.
    pub fn documents(&self, collection: &str) -> Vec<(DocumentId, Arc<Document>)> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, document)| (id.clone(), Arc::clone(document)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Arc<Document>> {
        self.state
            .read()
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id).cloned())
    }

    /// Number of indexed documents in `collection`.
    pub fn count(&self, collection: &str) -> u64 {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, |documents| documents.len() as u64)
    }

    /// Per-collection document counts.
    pub fn collection_counts(&self) -> HashMap<String, u64> {
        self.state
            .read()
            .collections
            .iter()
            .map(|(name, documents)| (name.clone(), documents.len() as u64))
            .collect()
    }
}
