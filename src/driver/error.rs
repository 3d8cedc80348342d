use thiserror::Error;

use crate::errors::FolioError;

#[derive(Error, Debug)]
pub enum DriverError {
    /// A probe observed an outcome it did not expect.
    #[error("{0}")]
    Probe(String),

    /// Records were left behind after the cleanup pass.
    #[error("{residual} records left in {collection} after cleanup")]
    RunIntegrity { collection: String, residual: u64 },

    #[error("Seeding failed: {0}")]
    SeedFailed(String),

    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error(transparent)]
    Store(#[from] FolioError),
}
