//! varcache Configuration Management
//!
//! Settings for the SQLite store, the adaptor caches and logging, read from
//! layered TOML files (see [`ConfigLoader`]) and turned into
//! [`SqliteOptions`] and [`AdaptorOptions`].

mod error;
mod loader;
mod logging;

pub use error::{ConfigError, FileOp};
pub use loader::{ConfigLoader, Layer, HOME_ENV};
pub use logging::init_tracing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use varcache_core::{
    AdaptorError, AdaptorOptions, SqliteOptions, VariationDb, DEFAULT_MAX_KEYS_PER_QUERY,
    MAX_KEYS_PER_QUERY_LIMIT,
};

/// Log levels accepted by `logging.level`
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Everything a varcache process reads at startup, one table per section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VarCacheConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// SQLite store configuration.
///
/// # Example TOML
///
/// ```toml
/// [store]
/// database = "variation.db"
/// busy_timeout_ms = 5000
/// read_only = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; relative paths resolve against the workspace root
    pub database: PathBuf,

    /// How long a query waits on a locked database (milliseconds)
    pub busy_timeout_ms: u64,

    /// Open the database read-only
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("variation.db"),
            busy_timeout_ms: 5000,
            read_only: false,
        }
    }
}

impl From<&StoreConfig> for SqliteOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            read_only: config.read_only,
        }
    }
}

/// Cache and batch-fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of keys in one store query
    pub max_keys_per_query: usize,

    /// Load the whole source table when the adaptor opens
    pub preload_sources: bool,

    /// How long a reader waits for another reader's lazy load
    /// (milliseconds, 0 = no limit)
    pub lazy_wait_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_keys_per_query: DEFAULT_MAX_KEYS_PER_QUERY,
            preload_sources: true,
            lazy_wait_timeout_ms: 0,
        }
    }
}

impl From<&CacheConfig> for AdaptorOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_keys_per_query: config.max_keys_per_query,
            preload_sources: config.preload_sources,
            lazy_wait_timeout: match config.lazy_wait_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

/// Where `init_tracing` sends events and at what verbosity.
///
/// ```toml
/// [logging]
/// level = "debug"
/// format = "json"
/// file = "/var/log/varcache.log"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`, any case
    pub level: String,
    pub format: LogFormat,
    /// Appended to; stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Values set by the embedding program, applied after every file layer
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<PathBuf>,
    pub read_only: Option<bool>,
    pub max_keys_per_query: Option<usize>,
    pub preload_sources: Option<bool>,
    pub log_level: Option<String>,
}

impl VarCacheConfig {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let ConfigOverrides {
            database,
            read_only,
            max_keys_per_query,
            preload_sources,
            log_level,
        } = overrides;

        if let Some(database) = database {
            self.store.database.clone_from(database);
        }
        if let Some(read_only) = *read_only {
            self.store.read_only = read_only;
        }
        if let Some(max_keys) = *max_keys_per_query {
            self.cache.max_keys_per_query = max_keys;
        }
        if let Some(preload) = *preload_sources {
            self.cache.preload_sources = preload;
        }
        if let Some(level) = log_level {
            self.logging.level.clone_from(level);
        }
    }

    /// Reject settings the adaptor or the subscriber cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_keys_per_query == 0 {
            return Err(ConfigError::invalid_value(
                "cache.max_keys_per_query",
                "must be greater than 0",
            ));
        }
        if self.cache.max_keys_per_query > MAX_KEYS_PER_QUERY_LIMIT {
            return Err(ConfigError::invalid_value(
                "cache.max_keys_per_query",
                format!("must be at most {}", MAX_KEYS_PER_QUERY_LIMIT),
            ));
        }
        if !LOG_LEVELS
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&self.logging.level))
        {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}'. Valid values: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }
        if self.store.database.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("store.database", "path is empty"));
        }
        Ok(())
    }

    /// Get the effective database path for a workspace.
    pub fn database_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store.database.is_absolute() {
            self.store.database.clone()
        } else {
            workspace_root.join(&self.store.database)
        }
    }

    /// Adaptor options for `VariationDb::open`
    pub fn adaptor_options(&self) -> AdaptorOptions {
        AdaptorOptions::from(&self.cache)
    }

    /// Open the configured SQLite database for a workspace.
    pub fn open(&self, workspace_root: &Path) -> Result<Arc<VariationDb>, AdaptorError> {
        VariationDb::open_sqlite(
            self.database_path(workspace_root),
            &SqliteOptions::from(&self.store),
            self.adaptor_options(),
        )
    }
}
