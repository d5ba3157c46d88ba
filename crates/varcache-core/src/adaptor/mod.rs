//! Adaptors
//!
//! `VariationDb` owns the store and one `KeyedCache` per entity kind. The
//! per-kind adaptors are cheap borrowed views over it:
//!
//! ```text
//! Arc<VariationDb>
//! ├── sources()             -> SourceAdaptor
//! ├── variations()          -> VariationAdaptor
//! ├── variation_features()  -> VariationFeatureAdaptor
//! └── variation_sets()      -> VariationSetAdaptor
//! ```
//!
//! Every query goes through `VariationDb`'s own `Store` implementation,
//! which counts it per table before delegating to the real store.

mod source;
mod variation;
mod variation_feature;
mod variation_set;

pub use source::SourceAdaptor;
pub use variation::VariationAdaptor;
pub use variation_feature::VariationFeatureAdaptor;
pub use variation_set::VariationSetAdaptor;

use crate::cache::{
    BatchFetcher, CacheMetrics, Direction, KeyedCache, LazyAttribute, LoadError, SetGraph,
};
use crate::entity::{DbId, EntityKind, Persisted};
use crate::error::{AdaptorError, StoreError};
use crate::model::{Source, Synonym, Variation, VariationFeature, VariationSet};
use crate::row::Row;
use crate::store::{Select, SqliteOptions, SqliteStore, Store};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Link from an entity back to the `VariationDb` that created it.
///
/// Weak so that cached entities never keep the adaptor alive.
pub type AdaptorLink = Weak<VariationDb>;

/// Default number of keys per store query
pub const DEFAULT_MAX_KEYS_PER_QUERY: usize = 2000;

/// Largest accepted `max_keys_per_query`: SQLite's bound-parameter limit
pub const MAX_KEYS_PER_QUERY_LIMIT: usize = 32766;

const SET_STRUCTURE_TABLE: &str = "variation_set_structure";
const SET_SUPER_COLUMN: &str = "variation_set_super";
const SET_SUB_COLUMN: &str = "variation_set_sub";
const SET_MEMBER_TABLE: &str = "variation_set_variation";

/// Options for a `VariationDb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptorOptions {
    /// Maximum number of keys in one store query
    pub max_keys_per_query: usize,
    /// Load the whole source table when the adaptor opens
    pub preload_sources: bool,
    /// How long a reader waits for another reader's lazy load (None = no limit)
    pub lazy_wait_timeout: Option<Duration>,
}

impl Default for AdaptorOptions {
    fn default() -> Self {
        Self {
            max_keys_per_query: DEFAULT_MAX_KEYS_PER_QUERY,
            preload_sources: true,
            lazy_wait_timeout: None,
        }
    }
}

impl AdaptorOptions {
    pub fn validate(&self) -> Result<(), AdaptorError> {
        if self.max_keys_per_query == 0 {
            return Err(AdaptorError::invalid_option(
                "max_keys_per_query",
                "must be greater than 0",
            ));
        }
        if self.max_keys_per_query > MAX_KEYS_PER_QUERY_LIMIT {
            return Err(AdaptorError::invalid_option(
                "max_keys_per_query",
                format!(
                    "{} exceeds the store limit of {} parameters per statement",
                    self.max_keys_per_query, MAX_KEYS_PER_QUERY_LIMIT
                ),
            ));
        }
        if self.lazy_wait_timeout == Some(Duration::ZERO) {
            return Err(AdaptorError::invalid_option(
                "lazy_wait_timeout",
                "use None to wait without a deadline",
            ));
        }
        Ok(())
    }
}

/// Entry point of the adaptor layer.
///
/// Owns the store, one identity-map cache per entity kind and the
/// failed-description dictionary. Always handled through an `Arc`.
pub struct VariationDb {
    store: Arc<dyn Store>,
    options: AdaptorOptions,
    self_link: AdaptorLink,

    sources: KeyedCache<Source>,
    variations: KeyedCache<Variation>,
    variation_features: KeyedCache<VariationFeature>,
    variation_sets: KeyedCache<VariationSet>,
    synonyms: KeyedCache<Synonym>,

    /// failed_description_id → description
    failed_descriptions: DashMap<DbId, String>,

    query_counts: DashMap<&'static str, u64>,
    queries: AtomicU64,
    open: AtomicBool,
}

impl std::fmt::Debug for VariationDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariationDb")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl VariationDb {
    /// Open an adaptor over `store`.
    ///
    /// Preloads the source table when `options.preload_sources` is set.
    pub fn open(store: Arc<dyn Store>, options: AdaptorOptions) -> Result<Arc<Self>, AdaptorError> {
        options.validate()?;

        let db = Arc::new_cyclic(|link| Self {
            store,
            options,
            self_link: link.clone(),
            sources: KeyedCache::new(),
            variations: KeyedCache::new(),
            variation_features: KeyedCache::new(),
            variation_sets: KeyedCache::new(),
            synonyms: KeyedCache::new(),
            failed_descriptions: DashMap::new(),
            query_counts: DashMap::new(),
            queries: AtomicU64::new(0),
            open: AtomicBool::new(true),
        });

        if db.options.preload_sources {
            let count = db.sources().preload()?;
            debug!("Preloaded {} sources", count);
        }

        info!(
            "Opened variation adaptor (max {} keys per query)",
            db.options.max_keys_per_query
        );
        Ok(db)
    }

    /// Open an adaptor over an existing SQLite database
    pub fn open_sqlite(
        path: impl AsRef<Path>,
        sqlite: &SqliteOptions,
        options: AdaptorOptions,
    ) -> Result<Arc<Self>, AdaptorError> {
        let store = SqliteStore::open(path.as_ref(), sqlite)?;
        Self::open(Arc::new(store), options)
    }

    pub fn options(&self) -> &AdaptorOptions {
        &self.options
    }

    pub fn sources(&self) -> SourceAdaptor<'_> {
        SourceAdaptor::new(self)
    }

    pub fn variations(&self) -> VariationAdaptor<'_> {
        VariationAdaptor::new(self)
    }

    pub fn variation_features(&self) -> VariationFeatureAdaptor<'_> {
        VariationFeatureAdaptor::new(self)
    }

    pub fn variation_sets(&self) -> VariationSetAdaptor<'_> {
        VariationSetAdaptor::new(self)
    }

    pub fn source_cache(&self) -> &KeyedCache<Source> {
        &self.sources
    }

    pub fn variation_cache(&self) -> &KeyedCache<Variation> {
        &self.variations
    }

    pub fn variation_feature_cache(&self) -> &KeyedCache<VariationFeature> {
        &self.variation_features
    }

    pub fn variation_set_cache(&self) -> &KeyedCache<VariationSet> {
        &self.variation_sets
    }

    pub fn synonym_cache(&self) -> &KeyedCache<Synonym> {
        &self.synonyms
    }

    /// Metrics of every cache, by kind
    pub fn cache_metrics(&self) -> Vec<(EntityKind, CacheMetrics)> {
        vec![
            (EntityKind::Source, self.sources.metrics()),
            (EntityKind::Variation, self.variations.metrics()),
            (EntityKind::VariationFeature, self.variation_features.metrics()),
            (EntityKind::VariationSet, self.variation_sets.metrics()),
            (EntityKind::Synonym, self.synonyms.metrics()),
        ]
    }

    /// Total store queries issued through this adaptor
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Store queries issued against one table
    pub fn query_count_for(&self, table: &str) -> u64 {
        self.query_counts.get(table).map(|c| *c).unwrap_or(0)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), AdaptorError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AdaptorError::Closed)
        }
    }

    /// Evict every cached entity and refuse further fetches.
    ///
    /// Entities still held by callers stay valid; their unloaded lazy
    /// attributes yield empty values from now on. Returns the number of
    /// entities evicted.
    pub fn close(&self) -> usize {
        if !self.open.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let evicted = self.sources.clear()
            + self.variations.clear()
            + self.variation_features.clear()
            + self.variation_sets.clear()
            + self.synonyms.clear();
        self.failed_descriptions.clear();
        info!(
            "Closed variation adaptor: evicted {} entities after {} queries",
            evicted,
            self.query_count()
        );
        evicted
    }

    /// Batch fetcher over one of this adaptor's caches
    pub(crate) fn fetcher<'a, T: Persisted>(&'a self, cache: &'a KeyedCache<T>) -> BatchFetcher<'a, T> {
        BatchFetcher::new(cache, self, self.options.max_keys_per_query)
            .with_link(self.self_link.clone())
    }

    /// Run one select per chunk of `keys`
    pub(crate) fn select_chunked(
        &self,
        table: &'static str,
        columns: &[&'static str],
        column: &'static str,
        keys: &[DbId],
    ) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        for chunk in keys.chunks(self.options.max_keys_per_query) {
            let select = Select::where_in(table, columns, column, chunk.iter().copied());
            rows.extend(self.execute(&select)?);
        }
        Ok(rows)
    }

    /// Sets that directly contain any of `variations`, as `(variation, set)`
    pub(crate) fn sets_containing(
        &self,
        variations: &[DbId],
    ) -> Result<Vec<(DbId, DbId)>, AdaptorError> {
        let rows = self.select_chunked(
            SET_MEMBER_TABLE,
            &["variation_id", "variation_set_id"],
            "variation_id",
            variations,
        )?;
        Ok(id_pairs(&rows, SET_MEMBER_TABLE, "variation_id", "variation_set_id"))
    }

    pub(crate) fn failed_description(&self, id: DbId) -> Option<String> {
        self.failed_descriptions.get(&id).map(|d| d.clone())
    }

    pub(crate) fn remember_failed_description(&self, id: DbId, description: String) {
        self.failed_descriptions.insert(id, description);
    }
}

impl Drop for VariationDb {
    fn drop(&mut self) {
        self.close();
    }
}

impl Store for VariationDb {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.query_counts.entry(select.table).or_insert(0) += 1;
        debug!(
            "Querying {} ({} keys)",
            select.table,
            select.key_count()
        );
        self.store.execute(select)
    }
}

impl SetGraph for VariationDb {
    fn neighbours(
        &self,
        sets: &[DbId],
        direction: Direction,
    ) -> Result<Vec<(DbId, DbId)>, AdaptorError> {
        let (from, to) = match direction {
            Direction::Ascendants => (SET_SUB_COLUMN, SET_SUPER_COLUMN),
            Direction::Descendants => (SET_SUPER_COLUMN, SET_SUB_COLUMN),
        };
        let rows = self.select_chunked(
            SET_STRUCTURE_TABLE,
            &[SET_SUPER_COLUMN, SET_SUB_COLUMN],
            from,
            sets,
        )?;
        Ok(id_pairs(&rows, SET_STRUCTURE_TABLE, from, to))
    }

    fn members(&self, sets: &[DbId]) -> Result<Vec<(DbId, DbId)>, AdaptorError> {
        let rows = self.select_chunked(
            SET_MEMBER_TABLE,
            &["variation_set_id", "variation_id"],
            "variation_set_id",
            sets,
        )?;
        Ok(id_pairs(&rows, SET_MEMBER_TABLE, "variation_set_id", "variation_id"))
    }
}

/// Decode `(left, right)` ID pairs from a join table, skipping bad rows
fn id_pairs(rows: &[Row], table: &str, left: &str, right: &str) -> Vec<(DbId, DbId)> {
    rows.iter()
        .filter_map(|row| match (row.id(left), row.id(right)) {
            (Ok(l), Ok(r)) => Some((l, r)),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Skipping malformed {} row: {}", table, e);
                None
            }
        })
        .collect()
}

/// Entities from `found` in the order of `ids`, each at most once
pub(crate) fn in_request_order<T>(ids: &[DbId], mut found: HashMap<DbId, Arc<T>>) -> Vec<Arc<T>> {
    ids.iter().filter_map(|id| found.remove(id)).collect()
}

/// The adaptor behind `link`, unless it has been dropped or closed
pub(crate) fn live_adaptor(link: &AdaptorLink) -> Option<Arc<VariationDb>> {
    link.upgrade().filter(|db| db.is_open())
}

/// Read a lazy attribute, loading it through the entity's adaptor.
///
/// Detached entities (adaptor dropped or closed) and unpersisted entities
/// get `T::default()`, which is not stored in the slot.
pub(crate) fn load_lazy<T, F>(
    link: &AdaptorLink,
    kind: EntityKind,
    id: DbId,
    attribute: &'static str,
    slot: &LazyAttribute<T>,
    fetch: F,
) -> Result<T, AdaptorError>
where
    T: Clone + Default,
    F: FnOnce(&VariationDb) -> Result<T, AdaptorError>,
{
    if let Some(value) = slot.get() {
        return Ok(value);
    }
    let Some(db) = live_adaptor(link) else {
        return Ok(T::default());
    };
    if id == 0 {
        return Ok(T::default());
    }

    let deadline = db.options.lazy_wait_timeout.map(|t| Instant::now() + t);
    slot.load_until(deadline, || fetch(&db)).map_err(|e| match e {
        LoadError::TimedOut => {
            debug!("Gave up waiting for {} of {} {}", attribute, kind, id);
            AdaptorError::Timeout {
                kind,
                id,
                attribute,
            }
        }
        LoadError::Failed(e) => e,
    })
}
