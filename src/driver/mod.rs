//! Concurrent randomized load driver for the loan service.
//!
//! A run seeds a book catalog and a user roster exactly once, lets every
//! worker thread loop through four phases (loan/return, update, loan/return,
//! update), then audits the loan links, releases outstanding loans and removes
//! everything it seeded. Individual probe failures are logged and counted but
//! never stop the run; only records left behind by the cleanup fail it.

pub mod error;
pub mod latch;
pub mod report;
pub mod rng;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::DriverConfig;
use crate::document::DocumentId;
use crate::library::Library;
use crate::model::{Book, Entity, LibraryUser};

pub use error::DriverError;
pub use latch::{LatchState, SeedLatch};
pub use report::{ProbeKind, ProbeStats, RunReport};
pub use rng::SharedRng;

use report::ProbeCounters;

/// Borrower reported by the return probe when a book has none.
const NO_USER: &str = "no_user";

/// Upper bound of the random numbers written by the update probe.
const MAX_UPDATE_VALUE: u32 = 512;

/// Ids of the records seeded for a run. Read-only once seeding completes.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub book_ids: Vec<DocumentId>,
    pub user_ids: Vec<DocumentId>,
}

pub struct LoadDriver {
    library: Library,
    config: DriverConfig,
    rng: SharedRng,
    seed: SeedLatch<Catalog>,
    counters: ProbeCounters,
}

impl LoadDriver {
    pub fn new(library: Library, config: DriverConfig) -> Self {
        let rng = SharedRng::new(config.rng_seed);
        Self {
            library,
            config,
            rng,
            seed: SeedLatch::new(),
            counters: ProbeCounters::default(),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// The seeded catalog, once seeding has completed.
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.seed.get()
    }

    /// Runs the whole workload: parallel phases, audit, release, cleanup.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::SeedFailed` if the catalog could not be seeded,
    /// `DriverError::WorkerPanicked` if a worker thread panicked, or
    /// `DriverError::RunIntegrity` if records survive the cleanup pass.
    pub fn run(&self) -> Result<RunReport, DriverError> {
        let started = Instant::now();
        info!(
            "Starting load run: {} workers, {} books, {} users, {} iterations per phase",
            self.config.workers, self.config.books, self.config.users, self.config.iterations_per_phase
        );

        self.run_in_parallel(self.config.workers)?;
        let catalog = self.seed_once()?;

        let (link_violations, loaned) = self.audit(&catalog)?;
        for violation in &link_violations {
            error!("Loan link violation: {}", violation);
        }
        let loans_released = loaned.len();
        if !loaned.is_empty() {
            let _ = self.probe(ProbeKind::ReleasingLoans, || {
                self.library.return_books(&loaned)?;
                Ok(())
            });
        }

        self.cleanup(&catalog)?;

        let report = RunReport {
            probes: self.counters.snapshot(),
            books_seeded: catalog.book_ids.len(),
            users_seeded: catalog.user_ids.len(),
            link_violations,
            loans_released,
            elapsed: started.elapsed(),
        };
        info!("Load run finished\n{}", report);
        Ok(report)
    }

    /// Runs `workers` worker threads to completion.
    ///
    /// # Errors
    ///
    /// Returns the first worker error after every worker has been joined.
    pub fn run_in_parallel(&self, workers: usize) -> Result<(), DriverError> {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| scope.spawn(move || self.worker(worker)))
                .collect();

            let mut first_error = None;
            for (worker, handle) in handles.into_iter().enumerate() {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(DriverError::WorkerPanicked { worker }));
                if let Err(err) = outcome {
                    error!("Worker {} stopped: {}", worker, err);
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    fn worker(&self, worker: usize) -> Result<(), DriverError> {
        let catalog = self.seed_once()?;
        info!("Worker {} started", worker);

        for _ in 0..2 {
            for _ in 0..self.config.iterations_per_phase {
                self.loan_and_return(&catalog);
                self.pause();
            }
            for _ in 0..self.config.iterations_per_phase {
                self.update_random_book(&catalog);
                self.pause();
            }
        }

        info!("Worker {} finished", worker);
        Ok(())
    }

    fn seed_once(&self) -> Result<Arc<Catalog>, DriverError> {
        self.seed.get_or_init(|| self.seed_catalog())
    }

    fn seed_catalog(&self) -> Result<Catalog, DriverError> {
        let book_ids: Vec<DocumentId> = self.probe(ProbeKind::AddingBooks, || {
            let mut books: Vec<Option<Book>> = (1..=self.config.books)
                .map(|i| Some(Book::new(format!("Something{i}"), format!("Someone{i}"))))
                .collect();
            self.library.add_books(&mut books)?;
            self.wait_for_indexing()?;

            let stored = self.library.get_number_of_books();
            if stored < self.config.books as u64 {
                return Err(DriverError::Probe(format!(
                    "{stored} books were stored instead of {}",
                    self.config.books
                )));
            }
            Ok(books.into_iter().flatten().map(|book| book.id).collect())
        })?;

        let user_ids: Vec<DocumentId> = self.probe(ProbeKind::AddingUsers, || {
            let mut users: Vec<Option<LibraryUser>> = (1..=self.config.users)
                .map(|i| Some(LibraryUser::new(format!("Someone{i}"), format!("Else{i}"))))
                .collect();
            self.library.add_users(&mut users)?;
            self.wait_for_indexing()?;

            let stored = self.library.get_number_of_users();
            if stored < self.config.users as u64 {
                return Err(DriverError::Probe(format!(
                    "{stored} users were stored instead of {}",
                    self.config.users
                )));
            }
            Ok(users.into_iter().flatten().map(|user| user.id).collect())
        })?;

        Ok(Catalog { book_ids, user_ids })
    }

    /// Runs one probe, logging and counting its outcome.
    fn probe<T, F>(&self, kind: ProbeKind, body: F) -> Result<T, DriverError>
    where
        F: FnOnce() -> Result<T, DriverError>,
    {
        let outcome = body();
        match &outcome {
            Ok(_) => info!("{} SUCCEEDED", kind),
            Err(err) => warn!("{} FAILED with ERROR: \n{}", kind, err),
        }
        self.counters.record(kind, outcome.is_ok());
        outcome
    }

    fn loan_and_return(&self, catalog: &Catalog) {
        let (Some(book_id), Some(user_id)) = (
            self.rng.choose(&catalog.book_ids),
            self.rng.choose(&catalog.user_ids),
        ) else {
            return;
        };
        if self.loan_book(book_id, user_id) {
            // Other workers probe the book while it is out.
            self.pause();
            self.return_book(book_id);
        }
    }

    /// Loans `book_id` to `user_id`; `true` if the loan went through.
    fn loan_book(&self, book_id: &str, user_id: &str) -> bool {
        self.probe(ProbeKind::LoanBook, || {
            if self.library.is_book_loaned(book_id)? {
                return Err(DriverError::Probe(format!("book {book_id} is already loaned")));
            }
            if !self.library.try_loan_book(book_id, user_id)? {
                return Err(DriverError::Probe(format!(
                    "loan of book {book_id} by user {user_id} failed"
                )));
            }
            Ok(())
        })
        .is_ok()
    }

    fn return_book(&self, book_id: &str) -> bool {
        self.probe(ProbeKind::ReturnBook, || {
            let user_id = self
                .library
                .get_book_by_id(book_id)?
                .and_then(|book| book.loaned_by)
                .unwrap_or_else(|| NO_USER.to_string());
            if !self.library.is_book_loaned(book_id)? {
                return Err(DriverError::Probe(format!(
                    "book {book_id} of user {user_id} is not loaned"
                )));
            }
            if !self.library.try_return_book(book_id)? {
                return Err(DriverError::Probe(format!(
                    "return of the book {book_id} by user {user_id} failed"
                )));
            }
            Ok(())
        })
        .is_ok()
    }

    fn update_random_book(&self, catalog: &Catalog) {
        let Some(book_id) = self.rng.choose(&catalog.book_ids) else {
            return;
        };
        let title = self.rng.random_range(1..=MAX_UPDATE_VALUE).to_string();
        let author = self.rng.random_range(1..=MAX_UPDATE_VALUE).to_string();
        let _ = self.probe(ProbeKind::UpdateBook, || {
            self.library
                .update_book_title_and_author(book_id, &title, &author)?;
            Ok(())
        });
    }

    fn pause(&self) {
        let millis = self.rng.random_range(self.config.delay_range());
        if millis > 0 {
            thread::sleep(Duration::from_millis(millis));
        }
    }

    fn wait_for_indexing(&self) -> Result<(), DriverError> {
        let store = self.library.store();
        store.wait_for_indexing(store.options().non_stale_timeout)?;
        Ok(())
    }

    /// Checks every seeded book and user against the loan invariants.
    ///
    /// Returns the violations found and the ids of books still on loan.
    fn audit(&self, catalog: &Catalog) -> Result<(Vec<String>, Vec<DocumentId>), DriverError> {
        let mut violations = Vec::new();
        let mut loaned = Vec::new();

        for book_id in &catalog.book_ids {
            let Some(book) = self.library.get_book_by_id(book_id)? else {
                violations.push(format!("seeded book {book_id} is missing"));
                continue;
            };
            if !book.has_consistent_loan_state() {
                violations.push(format!("book {book_id} has a partial loan state"));
            }
            let Some(user_id) = book.loaned_by.as_deref() else {
                continue;
            };
            loaned.push(book_id.clone());
            match self.library.get_user_by_id(user_id)? {
                Some(user) if user.loaned_books_ids.contains(book_id) => {}
                Some(_) => violations.push(format!(
                    "book {book_id} is loaned by {user_id}, who does not hold it"
                )),
                None => violations.push(format!(
                    "book {book_id} is loaned by missing user {user_id}"
                )),
            }
        }

        for user_id in &catalog.user_ids {
            let Some(user) = self.library.get_user_by_id(user_id)? else {
                violations.push(format!("seeded user {user_id} is missing"));
                continue;
            };
            for book_id in &user.loaned_books_ids {
                let borrower = self
                    .library
                    .get_book_by_id(book_id)?
                    .and_then(|book| book.loaned_by);
                if borrower.as_deref() != Some(user_id.as_str()) {
                    violations.push(format!(
                        "user {user_id} holds book {book_id}, which is not loaned to them"
                    ));
                }
            }
        }

        Ok((violations, loaned))
    }

    /// Removes the seeded records and verifies nothing is left behind.
    fn cleanup(&self, catalog: &Catalog) -> Result<(), DriverError> {
        let _ = self.probe(ProbeKind::RemovingBooks, || {
            self.library.remove_books_by_id(&catalog.book_ids)?;
            Ok(())
        });
        let _ = self.probe(ProbeKind::RemovingUsers, || {
            self.library.remove_users_by_id(&catalog.user_ids)?;
            Ok(())
        });
        self.wait_for_indexing()?;

        let residual_books = self.library.get_number_of_books();
        if residual_books != 0 {
            error!("{} books were not removed", residual_books);
            return Err(DriverError::RunIntegrity {
                collection: Book::COLLECTION.to_string(),
                residual: residual_books,
            });
        }
        let residual_users = self.library.get_number_of_users();
        if residual_users != 0 {
            error!("{} users were not unregistered", residual_users);
            return Err(DriverError::RunIntegrity {
                collection: LibraryUser::COLLECTION.to_string(),
                residual: residual_users,
            });
        }
        Ok(())
    }
}
