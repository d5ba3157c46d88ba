//! Entity identity and row mapping.
//!
//! Every cached entity has an immutable identity: its kind and its database
//! ID. ID 0 means "not persisted"; such entities are never cache-eligible.

use crate::adaptor::AdaptorLink;
use crate::row::{Row, RowError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Database identifier. 0 means the entity has not been persisted.
pub type DbId = u64;

/// Name of a secondary cache key
pub type KeyName = &'static str;

/// Secondary key holding an entity's canonical name
pub const NAME_KEY: KeyName = "name";

/// Secondary key holding historical aliases resolved through a synonym table
pub const SYNONYM_KEY: KeyName = "synonym";

/// Secondary key holding a variation set's short name
pub const SHORT_NAME_KEY: KeyName = "short_name";

/// The kinds of entity the adaptor layer caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Source,
    Variation,
    VariationFeature,
    VariationSet,
    Synonym,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Source,
        EntityKind::Variation,
        EntityKind::VariationFeature,
        EntityKind::VariationSet,
        EntityKind::Synonym,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Source => "source",
            EntityKind::Variation => "variation",
            EntityKind::VariationFeature => "variation_feature",
            EntityKind::VariationSet => "variation_set",
            EntityKind::Synonym => "synonym",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown entity kind: '{0}'")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// An entity with a persistent identity.
pub trait Entity: Send + Sync + 'static {
    const KIND: EntityKind;

    /// Database ID (0 if never persisted)
    fn db_id(&self) -> DbId;

    /// Canonical name, if this kind has one
    fn name(&self) -> Option<&str> {
        None
    }

    /// Secondary keys this entity is registered under when cached.
    ///
    /// Defaults to the canonical name under `NAME_KEY`.
    fn secondary_keys(&self) -> Vec<(KeyName, String)> {
        self.name()
            .map(|n| vec![(NAME_KEY, n.to_string())])
            .unwrap_or_default()
    }

    /// Check required fields. Returns the reason on failure.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// An entity stored as one row of one table.
pub trait Persisted: Entity + Sized {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    /// Column holding the canonical name, if lookups by name are supported
    const NAME_COLUMN: Option<&'static str> = None;
    const COLUMNS: &'static [&'static str];

    /// Decode a row. `link` is stored on the entity for lazy loading.
    fn from_row(row: &Row, link: &AdaptorLink) -> Result<Self, RowError>;
}
