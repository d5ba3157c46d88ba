//! Error types for the adaptor layer.
//!
//! Lookups that find nothing are not errors: they return `None` or omit the
//! key from a result map. Only store failures, refused cache inserts and
//! expired lazy-load waits are represented here.

use crate::entity::{DbId, EntityKind};
use thiserror::Error;

/// Failures of the store boundary (connection lost, statement failed).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// An entity refused by a `KeyedCache`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Entities with ID 0 have never been persisted and cannot be cached
    #[error("{kind} has no database ID and cannot be cached")]
    Unpersisted { kind: EntityKind },

    /// Entity failed validation (a required field is missing)
    #[error("malformed {kind} {id}: {reason}")]
    Malformed {
        kind: EntityKind,
        id: DbId,
        reason: String,
    },
}

/// Errors returned by adaptor operations.
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("timed out waiting for {attribute} of {kind} {id}")]
    Timeout {
        kind: EntityKind,
        id: DbId,
        attribute: &'static str,
    },

    #[error("adaptor has been closed")]
    Closed,

    #[error("invalid adaptor option '{key}': {message}")]
    InvalidOption { key: String, message: String },
}

impl AdaptorError {
    /// Create an InvalidOption error.
    pub fn invalid_option(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the store boundary.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
