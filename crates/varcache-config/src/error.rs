//! Errors raised while reading, writing or applying configuration.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The filesystem operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
    CreateDir,
    OpenLog,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileOp::Read => "read config file",
            FileOp::Write => "write config file",
            FileOp::CreateDir => "create config directory",
            FileOp::OpenLog => "open log file",
        })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to {op} '{path}': {source}")]
    File {
        op: FileOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid varcache TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot encode config as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    /// No home directory, so there is no global config location
    #[error("no home directory for the global config")]
    NoHomeDir,

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn file(op: FileOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The failed file operation, if this is a filesystem error
    pub fn file_op(&self) -> Option<FileOp> {
        match self {
            Self::File { op, .. } => Some(*op),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_key() {
        let err = ConfigError::invalid_value("cache.max_keys_per_query", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid value for 'cache.max_keys_per_query': must be greater than 0"
        );
        assert_eq!(err.file_op(), None);
    }

    #[test]
    fn test_file_error_carries_op_and_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::file(FileOp::OpenLog, "/var/log/varcache.log", io);

        assert_eq!(err.file_op(), Some(FileOp::OpenLog));
        let message = err.to_string();
        assert!(message.starts_with("failed to open log file '/var/log/varcache.log'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
