use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;

/// Document field names of [`Book`].
pub mod fields {
    pub const TITLE: &str = "Title";
    pub const AUTHOR: &str = "Author";
    pub const ISBN: &str = "ISBN";
    pub const IS_LOANED: &str = "IsLoaned";
    pub const LOANED_BY: &str = "LoanedBy";
    pub const LOAN_DATE: &str = "LoanDate";
}

/// A catalog entry.
///
/// `is_loaned`, `loaned_by` and `loan_date` are set and cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Book {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "ISBN")]
    pub isbn: String,
    pub is_loaned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaned_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_date: Option<DateTime<Utc>>,
}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = isbn.into();
        self
    }

    /// Marks the book as loaned to `user_id` at `at`.
    pub fn mark_loaned(&mut self, user_id: &str, at: DateTime<Utc>) {
        self.is_loaned = true;
        self.loaned_by = Some(user_id.to_string());
        self.loan_date = Some(at);
    }

    /// Clears all loan fields.
    pub fn clear_loan(&mut self) {
        self.is_loaned = false;
        self.loaned_by = None;
        self.loan_date = None;
    }

    /// `true` when the loan flag, borrower and loan date agree.
    pub fn has_consistent_loan_state(&self) -> bool {
        self.is_loaned == self.loaned_by.is_some() && self.is_loaned == self.loan_date.is_some()
    }
}

impl Entity for Book {
    const COLLECTION: &'static str = "Books";
    const ID_PREFIX: &'static str = "books";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
