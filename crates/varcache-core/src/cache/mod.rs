//! Adaptor Cache Module
//!
//! This module provides the caching building blocks shared by every adaptor:
//! - Identity-map caches keyed by database ID and secondary keys
//! - Chunked batch fetching through the store boundary
//! - Lazy attribute slots with single-flight loading
//! - Cycle-safe traversal of the variation set hierarchy
//!
//! # Architecture
//!
//! ```text
//! BatchFetcher<T>
//! ├── KeyedCache<T>   (canonical instances, insert-or-get)
//! └── Store           (one query per chunk of at most max_keys_per_query keys)
//!
//! LazyAttribute<T>    (unloaded → loading → loaded, waiters block on loading)
//!
//! SetHierarchyResolver
//! └── SetGraph        (direct edges and members, fetched per frontier)
//! ```

pub mod batch;
pub mod hierarchy;
pub mod keyed;
pub mod lazy;

// Re-exports
pub use batch::{AliasRelation, BatchFetcher};
pub use hierarchy::{Direction, SetGraph, SetHierarchyResolver};
pub use keyed::{CacheMetrics, KeyedCache};
pub use lazy::{LazyAttribute, LoadError, LoadState};
