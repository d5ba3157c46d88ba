//! varcache Core - Identity-map caching for genomic variation stores
//!
//! This crate sits between application code and a relational store holding
//! variation annotation entities:
//! - Per-kind identity-map caches keyed by database ID and natural keys
//! - Batched fetching bounded by a maximum key-list size per query
//! - Lazy attributes loaded once per entity, shared by concurrent callers
//! - Cycle-safe resolution of the variation set hierarchy
//!
//! # Architecture
//!
//! ```text
//! VariationDb (Arc, owns the store and every cache)
//! ├── KeyedCache<Source>            (preloaded on open)
//! ├── KeyedCache<Variation>         (name + synonym keys)
//! ├── KeyedCache<VariationFeature>
//! ├── KeyedCache<VariationSet>      (name + short_name keys)
//! ├── KeyedCache<Synonym>
//! └── Store (SqliteStore or any `Store` implementation)
//!
//! Entities hold a weak link back to the VariationDb that created them,
//! used only to resolve their lazy attributes.
//! ```

pub mod adaptor;
pub mod cache;
pub mod entity;
pub mod error;
pub mod model;
pub mod row;
pub mod store;

// Re-exports for convenience
pub use adaptor::{
    AdaptorLink, AdaptorOptions, SourceAdaptor, VariationAdaptor, VariationDb,
    VariationFeatureAdaptor, VariationSetAdaptor, DEFAULT_MAX_KEYS_PER_QUERY,
    MAX_KEYS_PER_QUERY_LIMIT,
};
pub use cache::{
    AliasRelation, BatchFetcher, CacheMetrics, Direction, KeyedCache, LazyAttribute, LoadError,
    LoadState, SetGraph, SetHierarchyResolver,
};
pub use entity::{
    DbId, Entity, EntityKind, KeyName, ParseKindError, Persisted, NAME_KEY, SHORT_NAME_KEY,
    SYNONYM_KEY,
};
pub use error::{AdaptorError, CacheError, StoreError};
pub use model::{
    Allele, FlankingSequence, Source, Synonym, Variation, VariationFeature, VariationSet,
};
pub use row::{Row, RowError, Value};
pub use store::{Filter, Select, SqliteOptions, SqliteStore, Store, STORE_SCHEMA_VERSION};
