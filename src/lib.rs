pub mod config;
pub mod conflict;
pub mod data_store;
pub mod document;
pub mod driver;
pub mod errors;
pub mod index;
mod isolation;
pub mod library;
pub mod model;
pub mod query;
pub mod session;
pub mod storage;
pub mod store;
pub mod transaction;

// Re-export key types and structs for easier access
pub use config::{AppConfig, ConfigError, DriverConfig, StoreConfig};
pub use conflict::resolution::ConflictResolution;
pub use data_store::txn_buffer::TxnBuffer;
pub use data_store::versioned_value::VersionedValue;
pub use document::{Document, DocumentId};
pub use driver::{DriverError, LoadDriver, ProbeKind, ProbeStats, RunReport};
pub use errors::{FolioError, Result};
pub use isolation::TransactionIsolation;
pub use library::Library;
pub use model::{Book, Entity, LibraryUser};
pub use query::Query;
pub use session::Session;
pub use storage::{MemoryStorage, Storage, StorageMutation};
pub use store::{CollectionStatistics, DocumentStore, StoreOptions, prelude};
pub use transaction::Transaction;
