//! Units of work over the document store.
//!
//! A `Session` wraps one `Transaction` and adds typed entity access, id
//! assignment, and the `include` prefetch hint. Everything staged through a
//! session becomes visible atomically on [`Session::save_changes`]; dropping the
//! session discards it.

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::debug;
use serde::Serialize;

use crate::document::{Document, DocumentId};
use crate::errors::Result;
use crate::model::Entity;
use crate::query::Query;
use crate::store::DocumentStore;
use crate::transaction::Transaction;

pub struct Session<'a> {
    store: &'a DocumentStore,
    transaction: Transaction,
    /// Documents already read in this session, keyed by id. `None` caches a miss.
    loaded: HashMap<DocumentId, Option<Arc<Document>>>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(store: &'a DocumentStore, transaction: Transaction) -> Self {
        Self {
            store,
            transaction,
            loaded: HashMap::new(),
        }
    }

    fn read(&mut self, id: &str) -> Result<Option<Arc<Document>>> {
        if let Some(cached) = self.loaded.get(id) {
            return Ok(cached.clone());
        }
        let document = self.transaction.read(id)?;
        self.loaded.insert(id.to_string(), document.clone());
        Ok(document)
    }

    /// Loads the entity stored under `id`.
    ///
    /// Returns `Ok(None)` when no document exists under `id` or when it belongs
    /// to a different collection.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if the document does not match `T`.
    pub fn load<T: Entity>(&mut self, id: &str) -> Result<Option<T>> {
        match self.read(id)? {
            Some(document) if document.collection() == T::COLLECTION => {
                Ok(Some(document.to_entity(id)?))
            }
            Some(document) => {
                debug!(
                    "Document {} belongs to {}, not {}",
                    id,
                    document.collection(),
                    T::COLLECTION
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Starts a load that also prefetches the documents referenced by `field`.
    ///
    /// ```
    /// use folio::prelude::*;
    ///
    /// let store = DocumentStore::open_in_memory().unwrap();
    /// let mut session = store.open_session();
    /// let book: Option<Book> = session.include("LoanedBy").load("books/1").unwrap();
    /// assert!(book.is_none());
    /// ```
    pub fn include(&mut self, field: &str) -> Include<'_, 'a> {
        Include {
            session: self,
            fields: vec![field.to_string()],
        }
    }

    /// `true` if a document exists under `id`, as seen by this session.
    pub fn exists(&mut self, id: &str) -> Result<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// Stages `entity` for insert or full replacement.
    ///
    /// An entity with an empty id is assigned the next free `<prefix>/<n>` id
    /// of its collection; the id is written back into the entity immediately.
    /// Ids supplied by the caller are never generated afterwards.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if the entity cannot be serialized.
    pub fn store<T: Entity>(&mut self, entity: &mut T) -> Result<()> {
        if entity.id().is_empty() {
            entity.set_id(self.store.next_id(T::ID_PREFIX));
        } else {
            self.store.observe_id(entity.id());
        }
        let id = entity.id().to_string();
        let document = Document::from_entity(entity)?;
        self.loaded.remove(&id);
        self.transaction.write(id, document)
    }

    /// Stages deletion of the document stored under `id`.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.loaded.remove(id);
        self.transaction.delete(id)
    }

    /// Stages a server-side assignment of one field.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if `value` cannot be serialized.
    pub fn patch<V: Serialize>(&mut self, id: &str, field: &str, value: V) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.loaded.remove(id);
        self.transaction.patch(id.to_string(), field, value)
    }

    /// Starts a query over the indexed documents of `T`'s collection.
    pub fn query<T: Entity>(&self) -> Query<'a, T> {
        Query::new(self.store)
    }

    pub fn has_changes(&self) -> bool {
        self.transaction.has_changes()
    }

    /// Commits everything staged in this session as one transaction.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::TransactionConflict` if a document this session
    /// read or wrote was changed by a concurrent commit, or the storage error
    /// if persisting fails.
    pub fn save_changes(self) -> Result<()> {
        self.transaction.commit()
    }
}

/// A load that prefetches related documents into the session.
pub struct Include<'s, 'a> {
    session: &'s mut Session<'a>,
    fields: Vec<String>,
}

impl Include<'_, '_> {
    /// Adds another reference field to prefetch.
    pub fn include(mut self, field: &str) -> Self {
        self.fields.push(field.to_string());
        self
    }

    /// Loads `id` and every document its include fields reference.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if the document does not match `T`.
    pub fn load<T: Entity>(self, id: &str) -> Result<Option<T>> {
        if let Some(document) = self.session.read(id)? {
            for field in &self.fields {
                for related in document.referenced_ids(field) {
                    self.session.read(&related)?;
                }
            }
        }
        self.session.load(id)
    }
}
