use super::{in_request_order, VariationDb};
use crate::entity::{DbId, Persisted};
use crate::error::AdaptorError;
use crate::model::Source;
use std::sync::Arc;
use tracing::debug;

/// Fetches `Source` entities. The source table is small and is normally
/// loaded in full when the adaptor opens.
pub struct SourceAdaptor<'a> {
    db: &'a VariationDb,
}

impl<'a> SourceAdaptor<'a> {
    pub(crate) fn new(db: &'a VariationDb) -> Self {
        Self { db }
    }

    /// Load the whole source table into the cache. Returns the number cached.
    pub fn preload(&self) -> Result<usize, AdaptorError> {
        self.db.ensure_open()?;
        let sources = self.db.fetcher(self.db.source_cache()).fetch_all()?;
        debug!("Loaded {} rows from {}", sources.len(), Source::TABLE);
        Ok(sources.len())
    }

    pub fn fetch_by_dbid(&self, id: DbId) -> Result<Option<Arc<Source>>, AdaptorError> {
        self.db.ensure_open()?;
        if id == 0 {
            return Ok(None);
        }
        let mut found = self.db.fetcher(self.db.source_cache()).fetch_by_ids(&[id])?;
        Ok(found.remove(&id))
    }

    pub fn fetch_all_by_dbid_list(&self, ids: &[DbId]) -> Result<Vec<Arc<Source>>, AdaptorError> {
        self.db.ensure_open()?;
        let found = self.db.fetcher(self.db.source_cache()).fetch_by_ids(ids)?;
        Ok(in_request_order(ids, found))
    }

    pub fn fetch_by_name(&self, name: &str) -> Result<Option<Arc<Source>>, AdaptorError> {
        self.db.ensure_open()?;
        let mut found = self
            .db
            .fetcher(self.db.source_cache())
            .fetch_by_names(&[name])?;
        Ok(found.remove(name))
    }

    /// Every source, by ID. Served from the cache when sources were preloaded.
    pub fn fetch_all(&self) -> Result<Vec<Arc<Source>>, AdaptorError> {
        self.db.ensure_open()?;
        let cache = self.db.source_cache();
        if self.db.options().preload_sources && !cache.is_empty() {
            return Ok(cache.values());
        }
        Ok(self.db.fetcher(cache).fetch_all()?)
    }
}
