use crate::adaptor::AdaptorLink;
use crate::entity::{DbId, Entity, EntityKind, Persisted};
use crate::row::{Row, RowError};

/// An alternative (usually historical) name of a variation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synonym {
    dbid: DbId,
    pub variation_id: DbId,
    pub name: String,
    pub source_id: Option<DbId>,
}

impl Synonym {
    pub fn new(variation_id: DbId, name: impl Into<String>) -> Self {
        Self {
            dbid: 0,
            variation_id,
            name: name.into(),
            source_id: None,
        }
    }

    pub fn with_dbid(mut self, dbid: DbId) -> Self {
        self.dbid = dbid;
        self
    }

    pub fn dbid(&self) -> DbId {
        self.dbid
    }
}

impl Entity for Synonym {
    const KIND: EntityKind = EntityKind::Synonym;

    fn db_id(&self) -> DbId {
        self.dbid
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    // Synonym names are not unique across variations
    fn secondary_keys(&self) -> Vec<(crate::entity::KeyName, String)> {
        Vec::new()
    }

    fn validate(&self) -> Result<(), String> {
        if self.variation_id == 0 {
            return Err("synonym has no variation".to_string());
        }
        if self.name.is_empty() {
            return Err("synonym name is empty".to_string());
        }
        Ok(())
    }
}

impl Persisted for Synonym {
    const TABLE: &'static str = "variation_synonym";
    const ID_COLUMN: &'static str = "variation_synonym_id";
    const COLUMNS: &'static [&'static str] =
        &["variation_synonym_id", "variation_id", "source_id", "name"];

    fn from_row(row: &Row, _link: &AdaptorLink) -> Result<Self, RowError> {
        Ok(Self {
            dbid: row.id("variation_synonym_id")?,
            variation_id: row.opt_id("variation_id")?.unwrap_or(0),
            name: row.text("name")?,
            source_id: row.opt_id("source_id")?,
        })
    }
}
