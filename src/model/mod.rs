//! Entities stored by the loan service.

use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod book;
pub mod user;

pub use book::Book;
pub use user::LibraryUser;

/// A type that is persisted as a document in a single collection.
///
/// The id lives outside the serialized body; the store assigns one on the
/// first `store` of an entity whose id is empty.
pub trait Entity: Serialize + DeserializeOwned {
    /// Collection name, as reported by collection statistics.
    const COLLECTION: &'static str;
    /// Prefix of generated ids, e.g. `books` for `books/17`.
    const ID_PREFIX: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);
}
