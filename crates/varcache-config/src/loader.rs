//! Layered configuration files.
//!
//! A configuration starts from defaults, then takes the global file
//! (`~/.varcache/config.toml`, or `$VARCACHE_HOME/config.toml`), then the
//! workspace file (`<root>/.varcache/config.toml`), then `ConfigOverrides`.
//! A file only changes the keys it names, so a workspace file can restate a
//! default to undo a global setting.

use crate::error::{ConfigError, FileOp};
use crate::{ConfigOverrides, LogFormat, VarCacheConfig};
use serde::Deserialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

const FILE_NAME: &str = "config.toml";
const DIR_NAME: &str = ".varcache";

/// Overrides the global config directory
pub const HOME_ENV: &str = "VARCACHE_HOME";

/// Which configuration file a load or save targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Per-user file
    Global,
    /// Per-workspace file, next to the data
    Local,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Global => "global",
            Layer::Local => "local",
        })
    }
}

/// The keys one file sets
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct FileLayer {
    store: StoreKeys,
    cache: CacheKeys,
    logging: LoggingKeys,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct StoreKeys {
    database: Option<PathBuf>,
    busy_timeout_ms: Option<u64>,
    read_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct CacheKeys {
    max_keys_per_query: Option<usize>,
    preload_sources: Option<bool>,
    lazy_wait_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct LoggingKeys {
    level: Option<String>,
    format: Option<LogFormat>,
    file: Option<PathBuf>,
}

impl FileLayer {
    fn apply_to(self, config: &mut VarCacheConfig) {
        let FileLayer {
            store,
            cache,
            logging,
        } = self;

        if let Some(v) = store.database {
            config.store.database = v;
        }
        if let Some(v) = store.busy_timeout_ms {
            config.store.busy_timeout_ms = v;
        }
        if let Some(v) = store.read_only {
            config.store.read_only = v;
        }

        if let Some(v) = cache.max_keys_per_query {
            config.cache.max_keys_per_query = v;
        }
        if let Some(v) = cache.preload_sources {
            config.cache.preload_sources = v;
        }
        if let Some(v) = cache.lazy_wait_timeout_ms {
            config.cache.lazy_wait_timeout_ms = v;
        }

        if let Some(v) = logging.level {
            config.logging.level = v;
        }
        if let Some(v) = logging.format {
            config.logging.format = v;
        }
        if logging.file.is_some() {
            config.logging.file = logging.file;
        }
    }
}

/// Reads and writes the layered configuration files.
///
/// The parsed global file is kept between loads; call `forget_global` to
/// pick up edits.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_dir: Option<PathBuf>,
    global: Option<Option<FileLayer>>,
    applied: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader using `$VARCACHE_HOME`, else `~/.varcache`, as global directory
    pub fn new() -> Self {
        let global_dir = std::env::var_os(HOME_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(DIR_NAME)));
        Self {
            global_dir,
            global: None,
            applied: Vec::new(),
        }
    }

    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: Some(global_dir.into()),
            global: None,
            applied: Vec::new(),
        }
    }

    /// Path of a layer's file; `None` for the global layer without a home
    pub fn path(&self, layer: Layer, workspace_root: &Path) -> Option<PathBuf> {
        match layer {
            Layer::Global => self.global_dir.as_ref().map(|dir| dir.join(FILE_NAME)),
            Layer::Local => Some(workspace_root.join(DIR_NAME).join(FILE_NAME)),
        }
    }

    /// Build and validate the configuration for a workspace
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<VarCacheConfig, ConfigError> {
        let mut config = VarCacheConfig::default();
        self.applied.clear();

        if let Some(layer) = self.global_layer()? {
            layer.apply_to(&mut config);
            if let Some(path) = self.path(Layer::Global, workspace_root) {
                self.applied.push(path);
            }
        }

        if let Some(path) = self.path(Layer::Local, workspace_root) {
            if let Some(layer) = read_layer(&path)? {
                layer.apply_to(&mut config);
                self.applied.push(path);
            }
        }

        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }

        config.validate()?;
        info!(
            "Configuration loaded from {} file(s), database {:?}",
            self.applied.len(),
            config.store.database
        );
        Ok(config)
    }

    /// Files applied by the last `load`, global first
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.applied
    }

    /// Drop the parsed global file so the next load reads it again
    pub fn forget_global(&mut self) {
        self.global = None;
    }

    fn global_layer(&mut self) -> Result<Option<FileLayer>, ConfigError> {
        if let Some(cached) = &self.global {
            return Ok(cached.clone());
        }
        let layer = match self.path(Layer::Global, Path::new("")) {
            Some(path) => read_layer(&path)?,
            None => {
                debug!("No home directory, global config skipped");
                None
            }
        };
        self.global = Some(layer.clone());
        Ok(layer)
    }

    /// Write `config` in full to a layer's file
    pub fn save(
        &self,
        layer: Layer,
        workspace_root: &Path,
        config: &VarCacheConfig,
    ) -> Result<PathBuf, ConfigError> {
        let path = self
            .path(layer, workspace_root)
            .ok_or(ConfigError::NoHomeDir)?;
        write_config(&path, config)?;
        debug!("Saved {} config to {:?}", layer, path);
        Ok(path)
    }

    /// Create a layer's file with defaults unless it already exists
    pub fn init(&self, layer: Layer, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let path = self
            .path(layer, workspace_root)
            .ok_or(ConfigError::NoHomeDir)?;
        if path.exists() {
            trace!("{} config already present at {:?}", layer, path);
            return Ok(path);
        }
        write_config(&path, &VarCacheConfig::default())?;
        Ok(path)
    }
}

fn read_layer(path: &Path) -> Result<Option<FileLayer>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("No config at {:?}", path);
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::file(FileOp::Read, path, e)),
    };
    debug!("Reading config from {:?}", path);
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn write_config(path: &Path, config: &VarCacheConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::file(FileOp::CreateDir, dir, e))?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::file(FileOp::Write, path, e))
}
