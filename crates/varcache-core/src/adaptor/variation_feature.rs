use super::{in_request_order, VariationDb};
use crate::entity::{DbId, Entity};
use crate::error::AdaptorError;
use crate::model::{Variation, VariationFeature};
use crate::row::Value;
use std::sync::Arc;

/// Fetches `VariationFeature` entities
pub struct VariationFeatureAdaptor<'a> {
    db: &'a VariationDb,
}

impl<'a> VariationFeatureAdaptor<'a> {
    pub(crate) fn new(db: &'a VariationDb) -> Self {
        Self { db }
    }

    pub fn fetch_by_dbid(&self, id: DbId) -> Result<Option<Arc<VariationFeature>>, AdaptorError> {
        self.db.ensure_open()?;
        if id == 0 {
            return Ok(None);
        }
        let mut found = self
            .db
            .fetcher(self.db.variation_feature_cache())
            .fetch_by_ids(&[id])?;
        Ok(found.remove(&id))
    }

    pub fn fetch_all_by_dbid_list(
        &self,
        ids: &[DbId],
    ) -> Result<Vec<Arc<VariationFeature>>, AdaptorError> {
        self.db.ensure_open()?;
        let found = self
            .db
            .fetcher(self.db.variation_feature_cache())
            .fetch_by_ids(ids)?;
        Ok(in_request_order(ids, found))
    }

    /// Every placement of `variation`, by ID.
    ///
    /// The returned features have their `variation()` attribute already set
    /// to the cached instance for `variation`'s ID, which need not be the
    /// `Arc` passed in.
    pub fn fetch_all_by_variation(
        &self,
        variation: &Variation,
    ) -> Result<Vec<Arc<VariationFeature>>, AdaptorError> {
        self.db.ensure_open()?;
        let id = variation.db_id();
        if id == 0 {
            return Ok(Vec::new());
        }
        let features = self
            .db
            .fetcher(self.db.variation_feature_cache())
            .fetch_where("variation_id", &[Value::from(id)])?;
        if features.is_empty() {
            return Ok(features);
        }

        let Some(parent) = self.db.variations().fetch_by_dbid(id)? else {
            return Ok(features);
        };
        for feature in &features {
            feature
                .variation_slot()
                .set_if_unloaded(Some(Arc::clone(&parent)));
        }
        Ok(features)
    }
}
