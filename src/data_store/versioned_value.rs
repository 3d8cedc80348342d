use std::sync::Arc;

use crate::document::Document;

/// Represents a document with the etag of the commit that produced it.
///
/// Documents held in the transaction buffer are wrapped in `VersionedValue` to
/// track the version (commit etag) at which they were last modified. This is
/// what optimistic validation compares against at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    /// The committed document.
    data: Arc<Document>,
    /// The etag of the transaction that last committed this document.
    version: u64,
}

impl VersionedValue {
    /// Creates a new `VersionedValue`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use folio::prelude::*;
    ///
    /// let document = Document::new("Books", Default::default());
    /// let versioned_value = VersionedValue::new(Arc::new(document), 7);
    /// assert_eq!(versioned_value.version(), 7);
    /// ```
    pub fn new(data: Arc<Document>, version: u64) -> Self {
        Self { data, version }
    }

    /// Returns a reference to the document.
    pub fn data(&self) -> &Arc<Document> {
        &self.data
    }

    /// Returns the version of the value.
    pub fn version(&self) -> u64 {
        self.version
    }
}
