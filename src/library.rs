//! The loan service: book and user CRUD plus the loan/return state machine.
//!
//! A book moves `Available -> Loaned` through [`Library::try_loan_book`] and
//! back through [`Library::try_return_book`] or [`Library::return_books`].
//! Each transition loads the book and its borrower in one session and commits
//! both documents together, so no reader ever sees a book linked to a user
//! whose loaned set does not contain it, or the reverse.
//!
//! Expected misses (unknown id, already loaned, not loaned) come back as
//! `false`/`None`. Store failures, conflicts included, propagate unchanged;
//! nothing here retries.

use std::sync::Arc;

use chrono::Utc;
use log::debug;
use serde_json::Value;

use crate::errors::{FolioError, Result};
use crate::model::book::fields as book_fields;
use crate::model::user::fields as user_fields;
use crate::model::{Book, Entity, LibraryUser};
use crate::query::ID_FIELD;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct Library {
    store: Arc<DocumentStore>,
}

impl Library {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// `true` if any document is stored under `id`.
    pub fn exists(&self, id: &str) -> Result<bool> {
        self.store.open_session().exists(id)
    }

    fn add_entity<T: Entity>(&self, entity: Option<&mut T>, what: &str) -> Result<()> {
        let entity =
            entity.ok_or_else(|| FolioError::InvalidArgument(format!("'{what}' can't be empty")))?;
        if !entity.id().is_empty() && self.exists(entity.id())? {
            debug!("{} {} already exists; add is a no-op", what, entity.id());
            return Ok(());
        }
        let mut session = self.store.open_session();
        session.store(entity)?;
        session.save_changes()
    }

    fn add_entities<T: Entity>(&self, entities: &mut [Option<T>]) -> Result<()> {
        let mut session = self.store.open_session();
        for entity in entities.iter_mut().flatten() {
            session.store(entity)?;
        }
        session.save_changes()
    }

    fn remove_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let mut session = self.store.open_session();
        for id in ids {
            session.delete(id.as_ref())?;
        }
        session.save_changes()
    }

    // --- users ---

    /// Persists `user` and assigns its id.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::InvalidArgument` when `user` is `None`.
    pub fn add_user(&self, user: Option<&mut LibraryUser>) -> Result<()> {
        self.add_entity(user, "user")
    }

    /// Persists every present user in one transaction; `None` entries are skipped.
    pub fn add_users(&self, users: &mut [Option<LibraryUser>]) -> Result<()> {
        self.add_entities(users)
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<LibraryUser>> {
        self.store.open_session().load(user_id)
    }

    pub fn remove_user_by_id(&self, user_id: &str) -> Result<()> {
        self.remove_by_ids(&[user_id])
    }

    pub fn remove_users_by_id<S: AsRef<str>>(&self, user_ids: &[S]) -> Result<()> {
        self.remove_by_ids(user_ids)
    }

    /// Size of the user collection from collection statistics; eventually
    /// consistent with recent writes.
    pub fn get_number_of_users(&self) -> u64 {
        self.store.collection_count(LibraryUser::COLLECTION)
    }

    // --- books ---

    /// Persists `book` and assigns its id.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::InvalidArgument` when `book` is `None`.
    pub fn add_book(&self, book: Option<&mut Book>) -> Result<()> {
        self.add_entity(book, "book")
    }

    /// Persists every present book in one transaction; `None` entries are skipped.
    pub fn add_books(&self, books: &mut [Option<Book>]) -> Result<()> {
        self.add_entities(books)
    }

    pub fn get_book_by_id(&self, book_id: &str) -> Result<Option<Book>> {
        self.store.open_session().load(book_id)
    }

    /// # Errors
    ///
    /// Returns `FolioError::MultipleResults` if more than one book carries `isbn`.
    pub fn get_book_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        self.store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(book_fields::ISBN, isbn)
            .single_or_default()
    }

    /// # Errors
    ///
    /// Returns `FolioError::MultipleResults` if more than one book matches.
    pub fn get_book_by_title_and_author(&self, title: &str, author: &str) -> Result<Option<Book>> {
        self.store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(book_fields::TITLE, title)
            .and_also()
            .where_equals(book_fields::AUTHOR, author)
            .single_or_default()
    }

    pub fn get_books_by_author(&self, author: &str) -> Result<Vec<Book>> {
        self.store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(book_fields::AUTHOR, author)
            .to_list()
    }

    pub fn remove_book_by_id(&self, book_id: &str) -> Result<()> {
        self.remove_by_ids(&[book_id])
    }

    pub fn remove_books_by_id<S: AsRef<str>>(&self, book_ids: &[S]) -> Result<()> {
        self.remove_by_ids(book_ids)
    }

    /// Size of the book collection from collection statistics; eventually
    /// consistent with recent writes.
    pub fn get_number_of_books(&self) -> u64 {
        self.store.collection_count(Book::COLLECTION)
    }

    pub fn update_book_title(&self, book_id: &str, new_title: &str) -> Result<()> {
        let mut session = self.store.open_session();
        session.patch(book_id, book_fields::TITLE, new_title)?;
        session.save_changes()
    }

    pub fn update_book_author(&self, book_id: &str, new_author: &str) -> Result<()> {
        let mut session = self.store.open_session();
        session.patch(book_id, book_fields::AUTHOR, new_author)?;
        session.save_changes()
    }

    pub fn update_book_title_and_author(
        &self,
        book_id: &str,
        new_title: &str,
        new_author: &str,
    ) -> Result<()> {
        let mut session = self.store.open_session();
        session.patch(book_id, book_fields::TITLE, new_title)?;
        session.patch(book_id, book_fields::AUTHOR, new_author)?;
        session.save_changes()
    }

    // --- loans ---

    /// Loans `book_id` to `user_id`.
    ///
    /// Returns `Ok(false)` without changing anything when the book does not
    /// exist, is already loaned, or the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::TransactionConflict` if the book or the user was
    /// changed concurrently between the load and the commit.
    pub fn try_loan_book(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let mut session = self.store.open_session();
        let Some(mut book) = session.load::<Book>(book_id)? else {
            return Ok(false);
        };
        if book.is_loaned {
            return Ok(false);
        }
        let Some(mut user) = session.load::<LibraryUser>(user_id)? else {
            return Ok(false);
        };

        user.loaned_books_ids.insert(book_id.to_string());
        book.mark_loaned(user_id, Utc::now());

        session.store(&mut user)?;
        session.store(&mut book)?;
        session.save_changes()?;
        Ok(true)
    }

    /// Returns `book_id` from its borrower.
    ///
    /// Returns `Ok(false)` without changing anything when the book does not
    /// exist, is not loaned, or its borrower cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::TransactionConflict` if the book or the borrower
    /// was changed concurrently between the load and the commit.
    pub fn try_return_book(&self, book_id: &str) -> Result<bool> {
        let mut session = self.store.open_session();
        let Some(mut book) = session
            .include(book_fields::LOANED_BY)
            .load::<Book>(book_id)?
        else {
            return Ok(false);
        };
        let Some(user_id) = book.loaned_by.clone().filter(|_| book.is_loaned) else {
            return Ok(false);
        };
        let Some(mut user) = session.load::<LibraryUser>(&user_id)? else {
            return Ok(false);
        };

        user.loaned_books_ids.remove(book_id);
        book.clear_loan();

        session.store(&mut user)?;
        session.store(&mut book)?;
        session.save_changes()?;
        Ok(true)
    }

    /// Best-effort batch return committed as one transaction.
    ///
    /// Missing books are skipped. Every existing book has its loan fields
    /// cleared; its borrower's loaned set is updated only if the borrower can
    /// be resolved, so an unresolvable borrower keeps its stale link.
    pub fn return_books<S: AsRef<str>>(&self, book_ids: &[S]) -> Result<()> {
        let mut session = self.store.open_session();
        for book_id in book_ids {
            let book_id = book_id.as_ref();
            let Some(mut book) = session
                .include(book_fields::LOANED_BY)
                .load::<Book>(book_id)?
            else {
                continue;
            };

            if let Some(user_id) = book.loaned_by.as_deref() {
                match session.load::<LibraryUser>(user_id)? {
                    Some(mut user) => {
                        user.loaned_books_ids.remove(book_id);
                        session.store(&mut user)?;
                    }
                    None => debug!(
                        "Borrower {} of {} not found; clearing the book only",
                        user_id, book_id
                    ),
                }
            }
            book.clear_loan();
            session.store(&mut book)?;
        }
        session.save_changes()
    }

    /// Every loaned book, oldest loan first.
    pub fn get_all_loaned_books(&self) -> Result<Vec<Book>> {
        self.store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(book_fields::IS_LOANED, true)
            .order_by(book_fields::LOAN_DATE)
            .to_list()
    }

    pub fn is_book_loaned(&self, book_id: &str) -> Result<bool> {
        let loaned = self
            .store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(ID_FIELD, book_id)
            .select_field(book_fields::IS_LOANED)
            .single_or_default()?;
        Ok(matches!(loaned, Some(Value::Bool(true))))
    }

    pub fn is_book_loaned_by_user(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let borrower = self
            .store
            .open_session()
            .query::<Book>()
            .wait_for_non_stale_results()
            .where_equals(ID_FIELD, book_id)
            .select_field(book_fields::LOANED_BY)
            .single_or_default()?;
        Ok(borrower.as_ref().and_then(Value::as_str) == Some(user_id))
    }

    pub fn has_user_loaned_book(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let count = self
            .store
            .open_session()
            .query::<LibraryUser>()
            .wait_for_non_stale_results()
            .where_equals(ID_FIELD, user_id)
            .search(user_fields::LOANED_BOOKS_IDS, book_id)
            .count()?;
        Ok(count > 0)
    }
}
