use crate::adaptor::{live_adaptor, AdaptorLink};
use crate::entity::{DbId, Entity, EntityKind, KeyName, Persisted, NAME_KEY, SHORT_NAME_KEY};
use crate::error::AdaptorError;
use crate::model::Variation;
use crate::row::{Row, RowError};
use std::sync::{Arc, Weak};

/// A named group of variations. Sets can contain other sets.
#[derive(Debug)]
pub struct VariationSet {
    dbid: DbId,
    pub name: String,
    pub description: Option<String>,
    pub short_name: Option<String>,
    link: AdaptorLink,
}

impl VariationSet {
    /// An unpersisted set with no adaptor link
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            dbid: 0,
            name: name.into(),
            description: None,
            short_name: None,
            link: Weak::new(),
        }
    }

    pub fn with_dbid(mut self, dbid: DbId) -> Self {
        self.dbid = dbid;
        self
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn dbid(&self) -> DbId {
        self.dbid
    }

    /// Sets contained in this one (empty when detached)
    pub fn sub_sets(&self, immediate_only: bool) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        match live_adaptor(&self.link) {
            Some(db) => db.variation_sets().fetch_all_by_super_set(self, immediate_only),
            None => Ok(Vec::new()),
        }
    }

    /// Sets containing this one (empty when detached)
    pub fn super_sets(&self, immediate_only: bool) -> Result<Vec<Arc<VariationSet>>, AdaptorError> {
        match live_adaptor(&self.link) {
            Some(db) => db.variation_sets().fetch_all_by_sub_set(self, immediate_only),
            None => Ok(Vec::new()),
        }
    }

    /// Every variation in this set or any set below it, by ID
    pub fn variations(&self) -> Result<Vec<Arc<Variation>>, AdaptorError> {
        match live_adaptor(&self.link) {
            Some(db) => db.variation_sets().fetch_variations(self),
            None => Ok(Vec::new()),
        }
    }
}

impl Entity for VariationSet {
    const KIND: EntityKind = EntityKind::VariationSet;

    fn db_id(&self) -> DbId {
        self.dbid
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn secondary_keys(&self) -> Vec<(KeyName, String)> {
        let mut keys = vec![(NAME_KEY, self.name.clone())];
        if let Some(short_name) = &self.short_name {
            keys.push((SHORT_NAME_KEY, short_name.clone()));
        }
        keys
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("variation set name is empty".to_string());
        }
        Ok(())
    }
}

impl Persisted for VariationSet {
    const TABLE: &'static str = "variation_set";
    const ID_COLUMN: &'static str = "variation_set_id";
    const NAME_COLUMN: Option<&'static str> = Some("name");
    const COLUMNS: &'static [&'static str] =
        &["variation_set_id", "name", "description", "short_name"];

    fn from_row(row: &Row, link: &AdaptorLink) -> Result<Self, RowError> {
        Ok(Self {
            dbid: row.id("variation_set_id")?,
            name: row.text("name")?,
            description: row.opt_text("description")?,
            short_name: row.opt_text("short_name")?,
            link: link.clone(),
        })
    }
}
