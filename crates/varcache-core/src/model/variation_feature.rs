use crate::adaptor::{load_lazy, AdaptorLink};
use crate::cache::LazyAttribute;
use crate::entity::{DbId, Entity, EntityKind, KeyName, Persisted};
use crate::error::AdaptorError;
use crate::model::Variation;
use crate::row::{Row, RowError};
use std::sync::{Arc, Weak};

/// The placement of a variation on a sequence region
#[derive(Debug)]
pub struct VariationFeature {
    dbid: DbId,
    pub variation_id: DbId,
    pub variation_name: Option<String>,
    pub seq_region_id: DbId,
    pub seq_region_start: i64,
    pub seq_region_end: i64,
    pub seq_region_strand: i8,
    pub allele_string: Option<String>,
    pub map_weight: Option<i64>,
    pub source_id: Option<DbId>,
    pub consequence_types: Vec<String>,
    link: AdaptorLink,
    variation: LazyAttribute<Option<Arc<Variation>>>,
}

impl VariationFeature {
    /// An unpersisted feature with no adaptor link
    pub fn new(variation_id: DbId, seq_region_id: DbId, start: i64, end: i64, strand: i8) -> Self {
        Self {
            dbid: 0,
            variation_id,
            variation_name: None,
            seq_region_id,
            seq_region_start: start,
            seq_region_end: end,
            seq_region_strand: strand,
            allele_string: None,
            map_weight: None,
            source_id: None,
            consequence_types: Vec::new(),
            link: Weak::new(),
            variation: LazyAttribute::new(),
        }
    }

    pub fn with_dbid(mut self, dbid: DbId) -> Self {
        self.dbid = dbid;
        self
    }

    pub fn dbid(&self) -> DbId {
        self.dbid
    }

    /// Length on the sequence region (0 for insertions, where end = start - 1)
    pub fn length(&self) -> i64 {
        self.seq_region_end - self.seq_region_start + 1
    }

    /// The parent variation, resolved through the variation cache
    pub fn variation(&self) -> Result<Option<Arc<Variation>>, AdaptorError> {
        let variation_id = self.variation_id;
        load_lazy(&self.link, Self::KIND, self.dbid, "variation", &self.variation, |db| {
            db.variations().fetch_by_dbid(variation_id)
        })
    }

    pub(crate) fn variation_slot(&self) -> &LazyAttribute<Option<Arc<Variation>>> {
        &self.variation
    }
}

impl Entity for VariationFeature {
    const KIND: EntityKind = EntityKind::VariationFeature;

    fn db_id(&self) -> DbId {
        self.dbid
    }

    fn name(&self) -> Option<&str> {
        self.variation_name.as_deref()
    }

    // Several features share a variation name
    fn secondary_keys(&self) -> Vec<(KeyName, String)> {
        Vec::new()
    }

    fn validate(&self) -> Result<(), String> {
        if self.variation_id == 0 {
            return Err("variation feature has no variation".to_string());
        }
        if self.seq_region_start > self.seq_region_end + 1 {
            return Err(format!(
                "start {} is after end {}",
                self.seq_region_start, self.seq_region_end
            ));
        }
        Ok(())
    }
}

impl Persisted for VariationFeature {
    const TABLE: &'static str = "variation_feature";
    const ID_COLUMN: &'static str = "variation_feature_id";
    const COLUMNS: &'static [&'static str] = &[
        "variation_feature_id",
        "variation_id",
        "variation_name",
        "seq_region_id",
        "seq_region_start",
        "seq_region_end",
        "seq_region_strand",
        "allele_string",
        "map_weight",
        "source_id",
        "consequence_types",
    ];

    fn from_row(row: &Row, link: &AdaptorLink) -> Result<Self, RowError> {
        let strand = match row.int("seq_region_strand")? {
            1 => 1,
            -1 => -1,
            other => {
                return Err(RowError::Invalid {
                    column: "seq_region_strand".to_string(),
                    reason: format!("strand must be 1 or -1, got {}", other),
                })
            }
        };
        let mut feature = Self::new(
            row.opt_id("variation_id")?.unwrap_or(0),
            row.id("seq_region_id")?,
            row.int("seq_region_start")?,
            row.int("seq_region_end")?,
            strand,
        );
        feature.dbid = row.id("variation_feature_id")?;
        feature.variation_name = row.opt_text("variation_name")?;
        feature.allele_string = row.opt_text("allele_string")?;
        feature.map_weight = row.opt_int("map_weight")?;
        feature.source_id = row.opt_id("source_id")?;
        feature.consequence_types = row
            .opt_text("consequence_types")?
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        feature.link = link.clone();
        Ok(feature)
    }
}
