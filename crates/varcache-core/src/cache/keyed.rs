//! Keyed Identity-Map Cache
//!
//! Holds at most one shared instance per database ID, plus secondary maps
//! from alternate keys (name, short name, synonym) to IDs.
//!
//! Thread-safe via one parking_lot::Mutex around every map, so an insert is
//! either fully visible or not visible at all.

use crate::entity::{DbId, Entity, EntityKind, KeyName};
use crate::error::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Counters for one cache, reset by `reset_metrics`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// New entities registered
    pub inserts: u64,
    /// Inserts that found an existing instance for the ID
    pub collisions: u64,
    /// Secondary keys that moved from one ID to another
    pub key_conflicts: u64,
    /// Entities refused (unpersisted or malformed)
    pub rejected: u64,
    /// Entities removed by eviction or clearing
    pub evictions: u64,
}

impl CacheMetrics {
    /// Fraction of lookups answered from the cache, 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}

/// Inner state for KeyedCache (protected by Mutex)
struct CacheState<T> {
    /// ID → canonical instance
    primary: HashMap<DbId, Arc<T>>,

    /// Key name → (key → ID). Resolved through `primary`, so a secondary hit
    /// is always the same instance as the primary hit for that ID.
    secondary: HashMap<KeyName, HashMap<String, DbId>>,

    /// ID → secondary keys registered for it, for eviction
    keys_by_id: HashMap<DbId, Vec<(KeyName, String)>>,

    metrics: CacheMetrics,
}

impl<T> CacheState<T> {
    fn register_key(&mut self, kind: EntityKind, key_name: KeyName, key: String, id: DbId) {
        let map = self.secondary.entry(key_name).or_default();
        match map.insert(key.clone(), id) {
            Some(previous) if previous == id => return,
            Some(previous) => {
                warn!(
                    "{} {} '{}' was cached for ID {}, now resolves to ID {}",
                    kind, key_name, key, previous, id
                );
                self.metrics.key_conflicts += 1;
                if let Some(keys) = self.keys_by_id.get_mut(&previous) {
                    keys.retain(|(n, k)| !(*n == key_name && *k == key));
                }
            }
            None => {}
        }
        self.keys_by_id.entry(id).or_default().push((key_name, key));
    }

    fn unregister_keys(&mut self, id: DbId) {
        for (key_name, key) in self.keys_by_id.remove(&id).unwrap_or_default() {
            if let Some(map) = self.secondary.get_mut(key_name) {
                if map.get(&key) == Some(&id) {
                    map.remove(&key);
                }
            }
        }
    }
}

/// Identity-map cache for one entity kind
///
/// The first successfully inserted instance for an ID is canonical until it
/// is evicted; later inserts for the same ID hand back the canonical
/// instance and drop theirs.
pub struct KeyedCache<T> {
    state: Mutex<CacheState<T>>,
}

impl<T: Entity> Default for KeyedCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> KeyedCache<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                primary: HashMap::new(),
                secondary: HashMap::new(),
                keys_by_id: HashMap::new(),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    /// Look up by database ID
    pub fn get_by_id(&self, id: DbId) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        match state.primary.get(&id).cloned() {
            Some(entity) => {
                state.metrics.hits += 1;
                trace!("{} cache hit: {}", T::KIND, id);
                Some(entity)
            }
            None => {
                state.metrics.misses += 1;
                None
            }
        }
    }

    /// Look up by a secondary key
    pub fn get_by_key(&self, key_name: &str, key: &str) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        let found = state
            .secondary
            .get(key_name)
            .and_then(|m| m.get(key))
            .and_then(|id| state.primary.get(id))
            .cloned();
        if found.is_some() {
            state.metrics.hits += 1;
            trace!("{} cache hit: {} '{}'", T::KIND, key_name, key);
        } else {
            state.metrics.misses += 1;
        }
        found
    }

    /// Check whether an ID is cached (does not touch metrics)
    pub fn contains(&self, id: DbId) -> bool {
        self.state.lock().primary.contains_key(&id)
    }

    fn check(&self, entity: &T) -> Result<(), CacheError> {
        let id = entity.db_id();
        if id == 0 {
            return Err(CacheError::Unpersisted { kind: T::KIND });
        }
        entity.validate().map_err(|reason| CacheError::Malformed {
            kind: T::KIND,
            id,
            reason,
        })
    }

    /// Insert-or-get-canonical
    ///
    /// Registers `entity` under its ID and secondary keys. If the ID is
    /// already cached, the cached instance is returned and `entity` is
    /// dropped. Unpersisted or malformed entities are refused and logged.
    pub fn insert(&self, entity: Arc<T>) -> Result<Arc<T>, CacheError> {
        if let Err(e) = self.check(&entity) {
            warn!("Refusing to cache {}", e);
            self.state.lock().metrics.rejected += 1;
            return Err(e);
        }

        let id = entity.db_id();
        let mut state = self.state.lock();

        if let Some(existing) = state.primary.get(&id).cloned() {
            state.metrics.collisions += 1;
            debug!("{} {} already cached, keeping existing instance", T::KIND, id);
            return Ok(existing);
        }

        state.primary.insert(id, Arc::clone(&entity));
        for (key_name, key) in entity.secondary_keys() {
            state.register_key(T::KIND, key_name, key, id);
        }
        state.metrics.inserts += 1;
        Ok(entity)
    }

    /// Register an extra secondary key for an already cached ID.
    ///
    /// Returns false if the ID is not cached.
    pub fn register_key(&self, key_name: KeyName, key: impl Into<String>, id: DbId) -> bool {
        let mut state = self.state.lock();
        if !state.primary.contains_key(&id) {
            return false;
        }
        state.register_key(T::KIND, key_name, key.into(), id);
        true
    }

    /// Replace the cached snapshot for an ID.
    ///
    /// Entities are read-only once cached; an update is a new snapshot
    /// swapped in under the lock. Returns the previous snapshot, if any.
    pub fn replace(&self, entity: Arc<T>) -> Result<Option<Arc<T>>, CacheError> {
        if let Err(e) = self.check(&entity) {
            warn!("Refusing to cache {}", e);
            self.state.lock().metrics.rejected += 1;
            return Err(e);
        }

        let id = entity.db_id();
        let mut state = self.state.lock();
        state.unregister_keys(id);
        let previous = state.primary.insert(id, Arc::clone(&entity));
        for (key_name, key) in entity.secondary_keys() {
            state.register_key(T::KIND, key_name, key, id);
        }
        if previous.is_none() {
            state.metrics.inserts += 1;
        }
        debug!("Replaced {} {} snapshot", T::KIND, id);
        Ok(previous)
    }

    /// Remove an ID from every map
    ///
    /// Returns the evicted instance, if it was cached.
    pub fn evict(&self, id: DbId) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        let removed = state.primary.remove(&id)?;
        state.unregister_keys(id);
        state.metrics.evictions += 1;
        Some(removed)
    }

    /// Remove every entity. Returns the number evicted.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.primary.len();
        state.primary.clear();
        state.secondary.clear();
        state.keys_by_id.clear();
        state.metrics.evictions += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached IDs in ascending order
    pub fn ids(&self) -> Vec<DbId> {
        let mut ids: Vec<DbId> = self.state.lock().primary.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cached entities in ascending ID order
    pub fn values(&self) -> Vec<Arc<T>> {
        let state = self.state.lock();
        let mut values: Vec<Arc<T>> = state.primary.values().cloned().collect();
        values.sort_unstable_by_key(|e| e.db_id());
        values
    }

    /// Copy of the counters as of now
    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.state.lock().metrics = CacheMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NAME_KEY;

    #[derive(Debug)]
    struct Item {
        id: DbId,
        name: String,
        payload: u32,
    }

    impl Item {
        fn new(id: DbId, name: &str, payload: u32) -> Arc<Self> {
            Arc::new(Self {
                id,
                name: name.to_string(),
                payload,
            })
        }
    }

    impl Entity for Item {
        const KIND: EntityKind = EntityKind::Variation;

        fn db_id(&self) -> DbId {
            self.id
        }

        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }

        fn validate(&self) -> Result<(), String> {
            if self.name.is_empty() {
                Err("name is empty".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let cache = KeyedCache::new();
        let item = Item::new(5, "rs5", 1);
        let cached = cache.insert(Arc::clone(&item)).unwrap();

        assert!(Arc::ptr_eq(&item, &cached));
        assert!(Arc::ptr_eq(&cache.get_by_id(5).unwrap(), &item));
        assert!(Arc::ptr_eq(&cache.get_by_key(NAME_KEY, "rs5").unwrap(), &item));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = KeyedCache::new();
        let first = Item::new(5, "rs5", 1);
        let second = Item::new(5, "rs5", 2);

        cache.insert(Arc::clone(&first)).unwrap();
        let canonical = cache.insert(Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&canonical, &first));
        assert_eq!(cache.get_by_id(5).unwrap().payload, 1);
        // The discarded instance is only held by this test
        assert_eq!(Arc::strong_count(&second), 1);
        assert_eq!(cache.metrics().collisions, 1);
    }

    #[test]
    fn test_miss_has_no_side_effects() {
        let cache: KeyedCache<Item> = KeyedCache::new();
        assert!(cache.get_by_id(1).is_none());
        assert!(cache.get_by_key(NAME_KEY, "rs1").is_none());
        assert!(cache.get_by_key("no_such_key", "x").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().misses, 3);
    }

    #[test]
    fn test_rejects_unpersisted_and_malformed() {
        let cache = KeyedCache::new();
        assert_eq!(
            cache.insert(Item::new(0, "rs0", 1)).unwrap_err(),
            CacheError::Unpersisted {
                kind: EntityKind::Variation
            }
        );
        assert!(matches!(
            cache.insert(Item::new(3, "", 1)),
            Err(CacheError::Malformed { id: 3, .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().rejected, 2);
    }

    #[test]
    fn test_secondary_key_conflict_moves_to_newest() {
        let cache = KeyedCache::new();
        cache.insert(Item::new(1, "shared", 1)).unwrap();
        let newer = cache.insert(Item::new(2, "shared", 2)).unwrap();

        assert!(Arc::ptr_eq(&cache.get_by_key(NAME_KEY, "shared").unwrap(), &newer));
        assert_eq!(cache.metrics().key_conflicts, 1);

        // Evicting the old owner must not drop the key now owned by ID 2
        cache.evict(1);
        assert!(cache.get_by_key(NAME_KEY, "shared").is_some());
    }

    #[test]
    fn test_evict_removes_all_keys() {
        let cache = KeyedCache::new();
        cache.insert(Item::new(9, "rs9", 1)).unwrap();
        assert!(cache.register_key("synonym", "ss99", 9));

        let evicted = cache.evict(9).unwrap();
        assert_eq!(evicted.id, 9);
        assert!(cache.get_by_id(9).is_none());
        assert!(cache.get_by_key(NAME_KEY, "rs9").is_none());
        assert!(cache.get_by_key("synonym", "ss99").is_none());
        assert!(cache.evict(9).is_none());
    }

    #[test]
    fn test_register_key_requires_cached_id() {
        let cache: KeyedCache<Item> = KeyedCache::new();
        assert!(!cache.register_key("synonym", "ss1", 1));
    }

    #[test]
    fn test_replace_swaps_snapshot() {
        let cache = KeyedCache::new();
        cache.insert(Item::new(4, "rs4", 1)).unwrap();

        let previous = cache.replace(Item::new(4, "rs4-renamed", 2)).unwrap();
        assert_eq!(previous.unwrap().payload, 1);
        assert_eq!(cache.get_by_id(4).unwrap().payload, 2);
        assert!(cache.get_by_key(NAME_KEY, "rs4").is_none());
        assert_eq!(cache.get_by_key(NAME_KEY, "rs4-renamed").unwrap().payload, 2);
    }

    #[test]
    fn test_clear_releases_entities() {
        let cache = KeyedCache::new();
        let item = Item::new(1, "rs1", 1);
        cache.insert(Arc::clone(&item)).unwrap();
        cache.insert(Item::new(2, "rs2", 1)).unwrap();
        assert_eq!(Arc::strong_count(&item), 2);

        assert_eq!(cache.clear(), 2);
        assert_eq!(Arc::strong_count(&item), 1);
        assert!(cache.get_by_key(NAME_KEY, "rs2").is_none());
    }

    #[test]
    fn test_ids_and_values_sorted() {
        let cache = KeyedCache::new();
        for id in [7, 3, 5] {
            cache.insert(Item::new(id, &format!("rs{}", id), 0)).unwrap();
        }
        assert_eq!(cache.ids(), vec![3, 5, 7]);
        let names: Vec<String> = cache.values().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["rs3", "rs5", "rs7"]);
    }

    #[test]
    fn test_concurrent_inserts_agree_on_one_instance() {
        let cache = Arc::new(KeyedCache::new());
        let winners: Vec<Arc<Item>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = Arc::clone(&cache);
                    s.spawn(move || cache.insert(Item::new(42, "rs42", i)).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let canonical = cache.get_by_id(42).unwrap();
        assert!(winners.iter().all(|w| Arc::ptr_eq(w, &canonical)));
        assert_eq!(cache.metrics().inserts, 1);
        assert_eq!(cache.metrics().collisions, 7);
    }
}
