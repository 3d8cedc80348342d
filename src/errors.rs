use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Transaction conflict detected")]
    TransactionConflict,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Expected at most one document in {collection}, found {found}")]
    MultipleResults { collection: String, found: usize },

    #[error("Index did not reach etag {expected} within {waited_ms} ms (indexed up to {indexed})")]
    StaleIndexTimeout {
        expected: u64,
        indexed: u64,
        waited_ms: u64,
    },

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for FolioError {
    fn from(err: serde_json::Error) -> Self {
        FolioError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;
