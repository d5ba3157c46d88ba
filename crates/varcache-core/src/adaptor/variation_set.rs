use super::{in_request_order, VariationDb};
use crate::cache::SetHierarchyResolver;
use crate::entity::{DbId, Entity, NAME_KEY, SHORT_NAME_KEY};
use crate::error::AdaptorError;
use crate::model::{Variation, VariationSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Fetches `VariationSet` entities and walks the set hierarchy
pub struct VariationSetAdaptor<'a> {
    db: &'a VariationDb,
}

impl<'a> VariationSetAdaptor<'a> {
    pub(crate) fn new(db: &'a VariationDb) -> Self {
        Self { db }
    }

    fn resolver(&self) -> SetHierarchyResolver<'a, VariationDb> {
        SetHierarchyResolver::new(self.db)
    }

    pub fn fetch_by_dbid(&self, id: DbId) -> Result<Option<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        if id == 0 {
            return Ok(None);
        }
        let mut found = self
            .db
            .fetcher(self.db.variation_set_cache())
            .fetch_by_ids(&[id])?;
        Ok(found.remove(&id))
    }

    pub fn fetch_all_by_dbid_list(
        &self,
        ids: &[DbId],
    ) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let found = self
            .db
            .fetcher(self.db.variation_set_cache())
            .fetch_by_ids(ids)?;
        Ok(in_request_order(ids, found))
    }

    pub fn fetch_by_name(&self, name: &str) -> Result<Option<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let mut found = self
            .db
            .fetcher(self.db.variation_set_cache())
            .fetch_by_key(NAME_KEY, "name", &[name])?;
        Ok(found.remove(name))
    }

    pub fn fetch_by_short_name(
        &self,
        short_name: &str,
    ) -> Result<Option<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let mut found = self
            .db
            .fetcher(self.db.variation_set_cache())
            .fetch_by_key(SHORT_NAME_KEY, "short_name", &[short_name])?;
        Ok(found.remove(short_name))
    }

    pub fn fetch_all(&self) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        Ok(self.db.fetcher(self.db.variation_set_cache()).fetch_all()?)
    }

    /// Sets that contain `set`, directly or (unless `immediate_only`)
    /// transitively, in discovery order
    pub fn fetch_all_by_sub_set(
        &self,
        set: &VariationSet,
        immediate_only: bool,
    ) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let ids = self.resolver().ascendants(set.db_id(), immediate_only)?;
        self.fetch_all_by_dbid_list(&ids)
    }

    /// Sets contained in `set`, directly or (unless `immediate_only`)
    /// transitively, in discovery order
    pub fn fetch_all_by_super_set(
        &self,
        set: &VariationSet,
        immediate_only: bool,
    ) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let ids = self.resolver().descendants(set.db_id(), immediate_only)?;
        self.fetch_all_by_dbid_list(&ids)
    }

    /// Sets containing `variation` directly, followed by all of their
    /// super-sets. Each set appears once.
    pub fn fetch_all_by_variation(
        &self,
        variation: &Variation,
    ) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        self.db.ensure_open()?;
        let direct: Vec<DbId> = self
            .db
            .sets_containing(&[variation.db_id()])?
            .into_iter()
            .map(|(_, set)| set)
            .collect();

        let mut seen = HashSet::new();
        let mut ids: Vec<DbId> = direct.iter().copied().filter(|id| seen.insert(*id)).collect();
        let resolver = self.resolver();
        for &set in &direct {
            for ascendant in resolver.ascendants(set, false)? {
                if seen.insert(ascendant) {
                    ids.push(ascendant);
                }
            }
        }
        debug!(
            "Variation {} is in {} sets ({} direct)",
            variation.db_id(),
            ids.len(),
            direct.len()
        );
        self.fetch_all_by_dbid_list(&ids)
    }

    /// IDs of the variations in `set` and every set below it, ascending
    pub fn members_flattened(&self, set: &VariationSet) -> Result<Vec<DbId>, AdaptorError> {
        self.db.ensure_open()?;
        self.resolver().members_flattened(set.db_id())
    }

    pub(crate) fn fetch_variations(
        &self,
        set: &VariationSet,
    ) -> Result<Vec<Arc<Variation>>, AdaptorError> {
        let ids = self.members_flattened(set)?;
        self.db.variations().fetch_all_by_dbid_list(&ids)
    }
}
