use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{FolioError, Result};
use crate::model::Entity;

/// The key type for documents in the store.
///
/// Ids are `<prefix>/<n>` strings assigned by the store when an entity is first
/// stored, e.g. `books/17`.
pub type DocumentId = String;

/// A schemaless JSON document belonging to a named collection.
///
/// The body holds the entity fields by their document names (`Title`,
/// `IsLoaned`, `LoanedBooksIds`, ...). The id is never part of the body; it is
/// the key the document is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    collection: String,
    body: Map<String, Value>,
}

impl Document {
    /// Creates a document in `collection` with the given body.
    pub fn new(collection: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            collection: collection.into(),
            body,
        }
    }

    /// Serializes an entity into a document of its collection.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if the entity does not serialize to a
    /// JSON object.
    pub fn from_entity<T: Entity>(entity: &T) -> Result<Self> {
        match serde_json::to_value(entity)? {
            Value::Object(body) => Ok(Self::new(T::COLLECTION, body)),
            other => Err(FolioError::Serialization(format!(
                "entity of collection {} serialized to a non-object: {other}",
                T::COLLECTION
            ))),
        }
    }

    /// Deserializes the document body into an entity and stamps it with `id`.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Serialization` if the body does not match the
    /// entity's shape.
    pub fn to_entity<T: Entity>(&self, id: &str) -> Result<T> {
        let mut entity: T = serde_json::from_value(Value::Object(self.body.clone()))?;
        entity.set_id(id.to_string());
        Ok(entity)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Returns the value of a top-level field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Sets a top-level field. A `null` value removes the field so that absent
    /// optionals are never written as null.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if value.is_null() {
            self.body.remove(name);
        } else {
            self.body.insert(name.to_string(), value);
        }
    }

    /// Collects the document ids referenced by `field`: a single string or an
    /// array of strings.
    pub fn referenced_ids(&self, field: &str) -> Vec<DocumentId> {
        match self.field(field) {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}
