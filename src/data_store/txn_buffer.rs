use crossbeam_skiplist::SkipMap;

use crate::data_store::versioned_value::VersionedValue;
use crate::document::DocumentId;

/// The Transaction Buffer (TxnBuffer) implemented using a lock-free SkipMap.
/// This holds the latest committed version of every document.
pub struct TxnBuffer {
    data: SkipMap<DocumentId, VersionedValue>,
}

impl Default for TxnBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnBuffer {
    /// Creates a new, empty `TxnBuffer`.
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
        }
    }

    /// Retrieves a `VersionedValue` from the buffer based on the id.
    /// Returns `None` if the document does not exist.
    pub fn get(&self, key: &str) -> Option<VersionedValue> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or replaces a `VersionedValue` in the buffer.
    /// This operation is atomic for the specific id.
    pub fn insert(&self, key: DocumentId, value: VersionedValue) {
        self.data.insert(key, value);
    }

    /// Removes a document from the buffer.
    /// Returns the removed `VersionedValue` if one existed.
    pub fn delete(&self, key: &str) -> Option<VersionedValue> {
        self.data.remove(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of every `(id, value)` pair, in id order.
    pub fn entries(&self) -> Vec<(DocumentId, VersionedValue)> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
