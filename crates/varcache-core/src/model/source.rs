use crate::adaptor::AdaptorLink;
use crate::entity::{DbId, Entity, EntityKind, Persisted};
use crate::row::{Row, RowError};

/// A data source (dbSNP, ClinVar, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    dbid: DbId,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub somatic_status: Option<String>,
}

impl Source {
    /// An unpersisted source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            dbid: 0,
            name: name.into(),
            version: None,
            description: None,
            url: None,
            somatic_status: None,
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

impl Entity for Source {
    const KIND: EntityKind = EntityKind::Source;

    fn db_id(&self) -> DbId {
        self.dbid
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("source name is empty".to_string());
        }
        Ok(())
    }
}

impl Persisted for Source {
    const TABLE: &'static str = "source";
    const ID_COLUMN: &'static str = "source_id";
    const NAME_COLUMN: Option<&'static str> = Some("name");
    const COLUMNS: &'static [&'static str] = &[
        "source_id",
        "name",
        "version",
        "description",
        "url",
        "somatic_status",
    ];

    fn from_row(row: &Row, _link: &AdaptorLink) -> Result<Self, RowError> {
        Ok(Self {
            dbid: row.id("source_id")?,
            name: row.text("name")?,
            version: row.opt_text("version")?,
            description: row.opt_text("description")?,
            url: row.opt_text("url")?,
            somatic_status: row.opt_text("somatic_status")?,
        })
    }
}
