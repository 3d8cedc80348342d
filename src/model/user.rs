use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};

use super::Entity;

/// Document field names of [`LibraryUser`].
pub mod fields {
    pub const FIRST_NAME: &str = "FirstName";
    pub const LAST_NAME: &str = "LastName";
    pub const LOANED_BOOKS_IDS: &str = "LoanedBooksIds";
}

/// A registered borrower and the ids of the books they currently hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LibraryUser {
    #[serde(skip)]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub loaned_books_ids: HashSet<String>,
}

impl LibraryUser {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }
}

impl Entity for LibraryUser {
    const COLLECTION: &'static str = "LibraryUsers";
    const ID_PREFIX: &'static str = "libraryusers";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
