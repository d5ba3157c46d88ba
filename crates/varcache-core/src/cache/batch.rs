//! Batch Fetcher
//!
//! Resolves arbitrarily large key sets through the store in chunks of at
//! most `max_keys_per_query` keys. Keys already cached are served without a
//! query; everything fetched passes through `KeyedCache::insert`, so the
//! returned entities are always the canonical instances.

use crate::adaptor::AdaptorLink;
use crate::cache::keyed::KeyedCache;
use crate::entity::{DbId, Entity, KeyName, Persisted, NAME_KEY, SYNONYM_KEY};
use crate::error::StoreError;
use crate::row::{Row, Value};
use crate::store::{Select, Store};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Largest ID the store can hold (SQLite integers are signed 64-bit)
const MAX_STORED_ID: DbId = i64::MAX as DbId;

/// A relation mapping historical aliases to entity IDs
/// (e.g. `variation_synonym.name → variation_synonym.variation_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasRelation {
    pub table: &'static str,
    pub alias_column: &'static str,
    pub target_column: &'static str,
}

/// Chunked, cache-aware fetching for one entity kind
pub struct BatchFetcher<'a, T> {
    cache: &'a KeyedCache<T>,
    store: &'a dyn Store,
    link: AdaptorLink,
    max_keys_per_query: usize,
    alias: Option<AliasRelation>,
}

/// Deduplicate keys, keeping first-seen order
fn dedup_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(AsRef::as_ref)
        .filter(|k| seen.insert(*k))
        .map(str::to_string)
        .collect()
}

impl<'a, T: Persisted> BatchFetcher<'a, T> {
    /// Create a fetcher. A `max_keys_per_query` of 0 is treated as 1.
    pub fn new(cache: &'a KeyedCache<T>, store: &'a dyn Store, max_keys_per_query: usize) -> Self {
        Self {
            cache,
            store,
            link: Weak::new(),
            max_keys_per_query: max_keys_per_query.max(1),
            alias: None,
        }
    }

    /// Link stored on every entity this fetcher decodes
    pub fn with_link(mut self, link: AdaptorLink) -> Self {
        self.link = link;
        self
    }

    /// Enable the alias fallback of `fetch_by_names`
    pub fn with_alias(mut self, alias: AliasRelation) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn max_keys_per_query(&self) -> usize {
        self.max_keys_per_query
    }

    /// Decode rows and register them, skipping malformed records
    fn canonicalize(&self, rows: &[Row]) -> Vec<Arc<T>> {
        rows.iter()
            .filter_map(|row| match T::from_row(row, &self.link) {
                // Refusals are logged by the cache
                Ok(entity) => self.cache.insert(Arc::new(entity)).ok(),
                Err(e) => {
                    warn!("Skipping malformed {} row: {}", T::KIND, e);
                    None
                }
            })
            .collect()
    }

    /// Fetch entities by database ID.
    ///
    /// Duplicate and zero IDs are ignored. IDs that do not exist are absent
    /// from the result.
    pub fn fetch_by_ids(&self, ids: &[DbId]) -> Result<HashMap<DbId, Arc<T>>, StoreError> {
        let mut result = HashMap::new();
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        for &id in ids {
            if id == 0 || !seen.insert(id) {
                continue;
            }
            if id > MAX_STORED_ID {
                warn!("{} ID {} is out of the store's range, skipped", T::KIND, id);
                continue;
            }
            match self.cache.get_by_id(id) {
                Some(entity) => {
                    result.insert(id, entity);
                }
                None => missing.push(id),
            }
        }

        if missing.is_empty() {
            return Ok(result);
        }

        debug!(
            "Fetching {} uncached {} IDs in chunks of {}",
            missing.len(),
            T::KIND,
            self.max_keys_per_query
        );
        for chunk in missing.chunks(self.max_keys_per_query) {
            let select = Select::where_in(T::TABLE, T::COLUMNS, T::ID_COLUMN, chunk.iter().copied());
            let rows = self.store.execute(&select)?;
            for entity in self.canonicalize(&rows) {
                result.insert(entity.db_id(), entity);
            }
        }

        Ok(result)
    }

    /// Fetch entities by secondary key stored in `column`.
    ///
    /// Cached keys are served from the cache; the rest are queried in chunks.
    pub fn fetch_by_key<S: AsRef<str>>(
        &self,
        key_name: KeyName,
        column: &'static str,
        keys: &[S],
    ) -> Result<HashMap<String, Arc<T>>, StoreError> {
        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for key in dedup_keys(keys) {
            match self.cache.get_by_key(key_name, &key) {
                Some(entity) => {
                    result.insert(key, entity);
                }
                None => missing.push(key),
            }
        }
        self.query_by_key(key_name, column, &missing, &mut result)?;
        Ok(result)
    }

    fn query_by_key(
        &self,
        key_name: KeyName,
        column: &'static str,
        keys: &[String],
        result: &mut HashMap<String, Arc<T>>,
    ) -> Result<(), StoreError> {
        let requested: HashSet<&str> = keys.iter().map(String::as_str).collect();
        for chunk in keys.chunks(self.max_keys_per_query) {
            let select =
                Select::where_in(T::TABLE, T::COLUMNS, column, chunk.iter().map(String::as_str));
            let rows = self.store.execute(&select)?;
            for entity in self.canonicalize(&rows) {
                for (name, key) in entity.secondary_keys() {
                    if name != key_name || !requested.contains(key.as_str()) {
                        continue;
                    }
                    match result.get(&key) {
                        Some(existing) if !Arc::ptr_eq(existing, &entity) => warn!(
                            "{} {} '{}' is ambiguous (IDs {} and {}), keeping ID {}",
                            T::KIND,
                            key_name,
                            key,
                            existing.db_id(),
                            entity.db_id(),
                            existing.db_id()
                        ),
                        Some(_) => {}
                        None => {
                            result.insert(key, Arc::clone(&entity));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch entities by canonical name, falling back to the alias relation.
    ///
    /// Phase 1 matches the name column. Names still unresolved are retried
    /// against the alias relation (if configured); names resolved that way
    /// are registered as `synonym` keys so the next lookup is a cache hit.
    pub fn fetch_by_names<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<HashMap<String, Arc<T>>, StoreError> {
        let Some(name_column) = T::NAME_COLUMN else {
            debug!("{} has no name column, name lookup skipped", T::KIND);
            return Ok(HashMap::new());
        };

        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for name in dedup_keys(names) {
            let cached = self
                .cache
                .get_by_key(NAME_KEY, &name)
                .or_else(|| self.cache.get_by_key(SYNONYM_KEY, &name));
            match cached {
                Some(entity) => {
                    result.insert(name, entity);
                }
                None => missing.push(name),
            }
        }

        // Phase 1: canonical names
        self.query_by_key(NAME_KEY, name_column, &missing, &mut result)?;

        // Phase 2: aliases
        let Some(alias) = self.alias else {
            return Ok(result);
        };
        let unresolved: Vec<String> = missing
            .into_iter()
            .filter(|n| !result.contains_key(n))
            .collect();
        if unresolved.is_empty() {
            return Ok(result);
        }

        debug!(
            "Resolving {} {} names through {}",
            unresolved.len(),
            T::KIND,
            alias.table
        );
        let mut pairs: Vec<(String, DbId)> = Vec::new();
        for chunk in unresolved.chunks(self.max_keys_per_query) {
            let select = Select::where_in(
                alias.table,
                &[alias.alias_column, alias.target_column],
                alias.alias_column,
                chunk.iter().map(String::as_str),
            );
            for row in self.store.execute(&select)? {
                match (row.text(alias.alias_column), row.id(alias.target_column)) {
                    (Ok(name), Ok(target)) => pairs.push((name, target)),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("Skipping malformed {} row: {}", alias.table, e)
                    }
                }
            }
        }

        let targets: Vec<DbId> = pairs.iter().map(|(_, id)| *id).collect();
        let resolved = self.fetch_by_ids(&targets)?;
        for (name, target) in pairs {
            let Some(entity) = resolved.get(&target) else {
                continue;
            };
            match result.get(&name) {
                Some(existing) if existing.db_id() != target => warn!(
                    "{} alias '{}' is ambiguous (IDs {} and {}), keeping ID {}",
                    T::KIND,
                    name,
                    existing.db_id(),
                    target,
                    existing.db_id()
                ),
                Some(_) => {}
                None => {
                    self.cache.register_key(SYNONYM_KEY, name.clone(), target);
                    result.insert(name, Arc::clone(entity));
                }
            }
        }

        Ok(result)
    }

    /// Fetch every entity whose `column` matches one of `values`, chunked.
    ///
    /// Results are canonical, deduplicated and ordered by ID.
    pub fn fetch_where(
        &self,
        column: &'static str,
        values: &[Value],
    ) -> Result<Vec<Arc<T>>, StoreError> {
        let mut by_id: HashMap<DbId, Arc<T>> = HashMap::new();
        for chunk in values.chunks(self.max_keys_per_query) {
            let select = Select::where_in(T::TABLE, T::COLUMNS, column, chunk.iter().cloned());
            let rows = self.store.execute(&select)?;
            for entity in self.canonicalize(&rows) {
                by_id.entry(entity.db_id()).or_insert(entity);
            }
        }
        let mut entities: Vec<Arc<T>> = by_id.into_values().collect();
        entities.sort_unstable_by_key(|e| e.db_id());
        Ok(entities)
    }

    /// Fetch the whole table, ordered by ID
    pub fn fetch_all(&self) -> Result<Vec<Arc<T>>, StoreError> {
        let rows = self.store.execute(&Select::all(T::TABLE, T::COLUMNS))?;
        let mut entities = self.canonicalize(&rows);
        entities.sort_unstable_by_key(|e| e.db_id());
        entities.dedup_by_key(|e| e.db_id());
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::row::RowError;
    use crate::store::Filter;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Marker {
        id: DbId,
        name: String,
    }

    impl Entity for Marker {
        const KIND: EntityKind = EntityKind::Variation;

        fn db_id(&self) -> DbId {
            self.id
        }

        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }
    }

    impl Persisted for Marker {
        const TABLE: &'static str = "variation";
        const ID_COLUMN: &'static str = "variation_id";
        const NAME_COLUMN: Option<&'static str> = Some("name");
        const COLUMNS: &'static [&'static str] = &["variation_id", "name"];

        fn from_row(row: &Row, _link: &AdaptorLink) -> Result<Self, RowError> {
            Ok(Self {
                id: row.id("variation_id")?,
                name: row.text("name")?,
            })
        }
    }

    /// In-memory store recording every select it receives
    #[derive(Default)]
    struct TableStore {
        markers: Vec<(DbId, Option<String>)>,
        aliases: Vec<(String, DbId)>,
        log: Mutex<Vec<Select>>,
    }

    impl TableStore {
        fn with_markers(ids: impl IntoIterator<Item = DbId>) -> Self {
            Self {
                markers: ids
                    .into_iter()
                    .map(|id| (id, Some(format!("rs{}", id))))
                    .collect(),
                ..Default::default()
            }
        }

        fn queries(&self) -> usize {
            self.log.lock().len()
        }
    }

    impl Store for TableStore {
        fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
            self.log.lock().push(select.clone());
            let Filter::In { column, values } = &select.filter else {
                return Ok(self
                    .markers
                    .iter()
                    .map(|(id, name)| {
                        Row::new()
                            .with("variation_id", *id)
                            .with("name", name.clone())
                    })
                    .collect());
            };
            let rows = match (select.table, *column) {
                ("variation", "variation_id") => self
                    .markers
                    .iter()
                    .filter(|(id, _)| values.contains(&Value::from(*id)))
                    .map(|(id, name)| {
                        Row::new()
                            .with("variation_id", *id)
                            .with("name", name.clone())
                    })
                    .collect(),
                ("variation", "name") => self
                    .markers
                    .iter()
                    .filter(|(_, name)| values.contains(&Value::from(name.clone())))
                    .map(|(id, name)| {
                        Row::new()
                            .with("variation_id", *id)
                            .with("name", name.clone())
                    })
                    .collect(),
                ("variation_synonym", "name") => self
                    .aliases
                    .iter()
                    .filter(|(alias, _)| values.contains(&Value::from(alias.as_str())))
                    .map(|(alias, id)| {
                        Row::new()
                            .with("name", alias.as_str())
                            .with("variation_id", *id)
                    })
                    .collect(),
                _ => Vec::new(),
            };
            Ok(rows)
        }
    }

    const SYNONYMS: AliasRelation = AliasRelation {
        table: "variation_synonym",
        alias_column: "name",
        target_column: "variation_id",
    };

    #[test]
    fn test_chunking_issues_ceil_n_over_k_queries() {
        let store = TableStore::with_markers(1..=10);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 3);

        let ids: Vec<DbId> = (1..=10).collect();
        let result = fetcher.fetch_by_ids(&ids).unwrap();

        assert_eq!(store.queries(), 4);
        assert_eq!(result.len(), 10);
        assert!(store.log.lock().iter().all(|s| s.key_count() <= 3));
    }

    #[test]
    fn test_missing_ids_are_absent() {
        let store = TableStore::with_markers([1, 2, 3]);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 10);

        let result = fetcher.fetch_by_ids(&[2, 3, 40, 0]).unwrap();
        let mut keys: Vec<DbId> = result.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![2, 3]);
    }

    #[test]
    fn test_out_of_range_ids_are_not_queried() {
        let store = TableStore::with_markers([2]);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 10);

        let result = fetcher.fetch_by_ids(&[u64::MAX, 2, 1 << 63]).unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(store.queries(), 1);
        assert_eq!(store.log.lock()[0].key_count(), 1);

        assert!(fetcher.fetch_by_ids(&[u64::MAX]).unwrap().is_empty());
        assert_eq!(store.queries(), 1);
    }

    #[test]
    fn test_warm_cache_issues_no_queries() {
        let store = TableStore::with_markers([5, 7, 9]);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 2);

        let first = fetcher.fetch_by_ids(&[5, 7, 5, 9]).unwrap();
        assert_eq!(store.queries(), 2);

        let second = fetcher.fetch_by_ids(&[5, 7, 9]).unwrap();
        assert_eq!(store.queries(), 2);
        for id in [5, 7, 9] {
            assert!(Arc::ptr_eq(&first[&id], &second[&id]));
        }
    }

    #[test]
    fn test_partially_cached_request_only_queries_misses() {
        let store = TableStore::with_markers(1..=6);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 100);

        fetcher.fetch_by_ids(&[1, 2, 3]).unwrap();
        fetcher.fetch_by_ids(&[2, 3, 4, 5]).unwrap();

        let log = store.log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].key_count(), 2);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let mut store = TableStore::with_markers([1, 2, 3]);
        store.markers[1].1 = None; // name NULL for ID 2
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 10);

        let result = fetcher.fetch_by_ids(&[1, 2, 3]).unwrap();
        assert!(result.contains_key(&1));
        assert!(!result.contains_key(&2));
        assert!(result.contains_key(&3));
        assert!(!cache.contains(2));
    }

    #[test]
    fn test_fetch_by_names_with_alias_fallback() {
        let mut store = TableStore::with_markers([10, 11]);
        store.aliases = vec![("ss11".to_string(), 11), ("ss99".to_string(), 99)];
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> =
            BatchFetcher::new(&cache, &store, 10).with_alias(SYNONYMS);

        let result = fetcher.fetch_by_names(&["rs10", "ss11", "ss99", "nope"]).unwrap();
        let mut keys: Vec<&str> = result.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["rs10", "ss11"]);
        assert_eq!(result["ss11"].db_id(), 11);

        // name query, alias query, ID query for the alias target
        assert_eq!(store.queries(), 3);

        // Both the canonical name and the alias are now cache hits
        let again = fetcher.fetch_by_names(&["rs10", "ss11"]).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(store.queries(), 3);
        assert!(Arc::ptr_eq(&again["ss11"], &result["ss11"]));
    }

    #[test]
    fn test_fetch_by_names_without_alias_skips_phase_two() {
        let mut store = TableStore::with_markers([10]);
        store.aliases = vec![("ss10".to_string(), 10)];
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 10);

        let result = fetcher.fetch_by_names(&["ss10"]).unwrap();
        assert!(result.is_empty());
        assert_eq!(store.queries(), 1);
    }

    #[test]
    fn test_fetch_all_and_where() {
        let store = TableStore::with_markers([3, 1, 2]);
        let cache = KeyedCache::new();
        let fetcher: BatchFetcher<'_, Marker> = BatchFetcher::new(&cache, &store, 1);

        let all = fetcher.fetch_all().unwrap();
        let ids: Vec<DbId> = all.iter().map(|m| m.db_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let some = fetcher
            .fetch_where("variation_id", &[Value::from(2u64), Value::from(3u64)])
            .unwrap();
        assert_eq!(some.len(), 2);
        assert!(Arc::ptr_eq(&some[0], &all[1]));
    }

    #[test]
    fn test_store_failure_propagates() {
        struct Down;
        impl Store for Down {
            fn execute(&self, _select: &Select) -> Result<Vec<Row>, StoreError> {
                Err(StoreError::unavailable("connection refused"))
            }
        }

        let cache: KeyedCache<Marker> = KeyedCache::new();
        let fetcher = BatchFetcher::new(&cache, &Down, 10);
        let err = fetcher.fetch_by_ids(&[1]).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(cache.is_empty());
    }
}
