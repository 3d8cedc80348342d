//! Configuration of the store and the load driver.
//!
//! Loaded from a TOML file; every field has a default so an empty file, or no
//! file at all, yields a runnable configuration.
//!
//! ```toml
//! [store]
//! database = "Library"
//! isolation = "repeatable_read"
//! non_stale_timeout_ms = 15000
//!
//! [driver]
//! workers = 8
//! books = 1000
//! users = 100
//! min_delay_ms = 500
//! max_delay_ms = 1500
//! ```

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflict::resolution::ConflictResolution;
use crate::errors::Result;
use crate::storage::{MemoryStorage, Storage};
use crate::store::{DocumentStore, StoreOptions};
use crate::TransactionIsolation;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub driver: DriverConfig,
}

impl AppConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.store.database.trim().is_empty() {
            errors.push("store.database cannot be empty".to_string());
        }
        if self.driver.workers == 0 {
            errors.push("driver.workers must be greater than 0".to_string());
        }
        if self.driver.books == 0 {
            errors.push("driver.books must be greater than 0".to_string());
        }
        if self.driver.users == 0 {
            errors.push("driver.users must be greater than 0".to_string());
        }
        if self.driver.min_delay_ms > self.driver.max_delay_ms {
            errors.push(format!(
                "driver.min_delay_ms ({}) exceeds driver.max_delay_ms ({})",
                self.driver.min_delay_ms, self.driver.max_delay_ms
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Logical database name, used in log output.
    pub database: String,
    pub isolation: TransactionIsolation,
    pub conflict_resolution: ConflictResolution,
    pub non_stale_timeout_ms: u64,
    /// Directory of the RocksDB backend. Unset means in-memory storage.
    pub data_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "Library".to_string(),
            isolation: TransactionIsolation::default(),
            conflict_resolution: ConflictResolution::default(),
            non_stale_timeout_ms: 15_000,
            data_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            isolation: self.isolation,
            conflict_resolution: self.conflict_resolution,
            non_stale_timeout: Duration::from_millis(self.non_stale_timeout_ms),
        }
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Fails if the storage backend cannot be opened, or with
    /// `FolioError::InvalidArgument` if `data_dir` is set in a build without
    /// the `rocksdb` feature.
    pub fn open_store(&self) -> Result<DocumentStore> {
        let storage = self.open_storage()?;
        info!("Opening database {}", self.database);
        DocumentStore::open(storage, self.store_options())
    }

    #[cfg(feature = "rocksdb")]
    fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        match &self.data_dir {
            Some(path) => Ok(Arc::new(crate::storage::RocksDbStorage::open(path)?)),
            None => Ok(Arc::new(MemoryStorage::new())),
        }
    }

    #[cfg(not(feature = "rocksdb"))]
    fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        match &self.data_dir {
            Some(path) => Err(crate::errors::FolioError::InvalidArgument(format!(
                "data_dir {} requires the rocksdb feature",
                path.display()
            ))),
            None => Ok(Arc::new(MemoryStorage::new())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub workers: usize,
    pub books: usize,
    pub users: usize,
    /// Iterations of each of the four worker phases.
    pub iterations_per_phase: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Seeds the shared random source; unset draws from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            books: 1000,
            users: 100,
            iterations_per_phase: 100,
            min_delay_ms: 500,
            max_delay_ms: 1500,
            rng_seed: None,
        }
    }
}

impl DriverConfig {
    pub fn delay_range(&self) -> RangeInclusive<u64> {
        self.min_delay_ms..=self.max_delay_ms
    }
}
