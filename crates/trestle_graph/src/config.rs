//! Store configuration.
//!
//! A [`StoreConfig`] selects the storage backend and tunes the lazy scan and
//! term cache. Configs can be built in code, read from JSON, or taken from
//! the environment.
//!
//! # Examples
//!
//! ```
//! use trestle_graph::config::{BackendConfig, StoreConfig};
//!
//! let config = StoreConfig::memory();
//! assert_eq!(config.backend, BackendConfig::Memory);
//! assert!(config.validate().is_ok());
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Selects the backend: `memory` or `sqlite`.
pub const ENV_BACKEND: &str = "TRESTLE_BACKEND";
/// Path of the SQLite database file.
pub const ENV_DB_PATH: &str = "TRESTLE_DB_PATH";
/// Rows fetched per index page by lazy scans.
pub const ENV_SCAN_BATCH: &str = "TRESTLE_SCAN_BATCH";

/// Default number of rows per scan page.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 256;
/// Default bound on cached dictionary entries.
pub const DEFAULT_TERM_CACHE_CAPACITY: usize = 65_536;

/// Which storage backend holds the term and quad tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory tables. Data is lost when the store is dropped.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Path to the `.db` file, created if missing.
        path: PathBuf,
    },
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite { path } => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// Configuration for a [`TripleStore`](crate::TripleStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The backend holding terms and quads.
    pub backend: BackendConfig,
    /// Rows pulled from the index per page while a scan is iterated.
    pub scan_batch_size: usize,
    /// Maximum number of dictionary entries kept in the in-memory cache.
    pub term_cache_capacity: usize,
    /// Preload rdf/rdfs/xsd/owl/... prefixes into parsers.
    pub default_prefixes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            term_cache_capacity: DEFAULT_TERM_CACHE_CAPACITY,
            default_prefixes: true,
        }
    }
}

impl StoreConfig {
    /// In-memory store with default tuning.
    pub fn memory() -> Self {
        Self::default()
    }

    /// SQLite store at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite { path: path.into() },
            ..Default::default()
        }
    }

    /// Sets the scan page size.
    pub fn with_scan_batch_size(mut self, rows: usize) -> Self {
        self.scan_batch_size = rows;
        self
    }

    /// Sets the term cache bound.
    pub fn with_term_cache_capacity(mut self, entries: usize) -> Self {
        self.term_cache_capacity = entries;
        self
    }

    /// Builds a configuration from the environment.
    ///
    /// `TRESTLE_BACKEND` selects `memory` or `sqlite`; a SQLite backend takes
    /// its path from `TRESTLE_DB_PATH` (default `./trestle.db`). Unparseable
    /// values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let db_path = std::env::var(ENV_DB_PATH).ok();
        match std::env::var(ENV_BACKEND).map(|b| b.to_ascii_lowercase()) {
            Ok(backend) if backend == "sqlite" => {
                config.backend = BackendConfig::Sqlite {
                    path: db_path.unwrap_or_else(|| "./trestle.db".into()).into(),
                };
            }
            Ok(backend) if backend == "memory" => config.backend = BackendConfig::Memory,
            Ok(other) => log::warn!("ignoring unknown {} value {:?}", ENV_BACKEND, other),
            Err(_) => {
                if let Some(path) = db_path {
                    config.backend = BackendConfig::Sqlite { path: path.into() };
                }
            }
        }

        if let Ok(batch) = std::env::var(ENV_SCAN_BATCH) {
            if let Ok(rows) = batch.parse::<usize>() {
                config.scan_batch_size = rows;
            }
        }

        config
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the tuning values.
    pub fn validate(&self) -> Result<()> {
        if self.scan_batch_size == 0 {
            return Err(Error::Config("scan_batch_size must be at least 1".into()));
        }
        if let BackendConfig::Sqlite { path } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("sqlite backend needs a path".into()));
            }
        }
        Ok(())
    }
}
