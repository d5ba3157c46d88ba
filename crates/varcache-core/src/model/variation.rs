use crate::adaptor::{live_adaptor, load_lazy, AdaptorLink};
use crate::cache::LazyAttribute;
use crate::entity::{DbId, Entity, EntityKind, KeyName, Persisted, NAME_KEY};
use crate::error::AdaptorError;
use crate::model::{Source, Synonym};
use crate::row::{Row, RowError};
use std::sync::{Arc, Weak};

/// One observed allele of a variation, optionally per population
#[derive(Debug, Clone, PartialEq)]
pub struct Allele {
    pub dbid: DbId,
    pub variation_id: DbId,
    pub allele: String,
    pub population_id: Option<DbId>,
    pub frequency: Option<f64>,
    pub count: Option<i64>,
}

impl Allele {
    pub const TABLE: &'static str = "allele";
    pub const COLUMNS: &'static [&'static str] = &[
        "allele_id",
        "variation_id",
        "allele",
        "population_id",
        "frequency",
        "count",
    ];

    pub(crate) fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            dbid: row.id("allele_id")?,
            variation_id: row.id("variation_id")?,
            allele: row.text("allele")?,
            population_id: row.opt_id("population_id")?,
            frequency: row.opt_real("frequency")?,
            count: row.opt_int("count")?,
        })
    }
}

/// Genomic sequence either side of a variation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlankingSequence {
    pub up_seq: Option<String>,
    pub down_seq: Option<String>,
}

/// A sequence variation (SNP, indel, ...) identified by name, e.g. "rs699"
#[derive(Debug)]
pub struct Variation {
    dbid: DbId,
    pub name: String,
    pub source_id: DbId,
    pub class: Option<String>,
    pub ancestral_allele: Option<String>,
    pub minor_allele: Option<String>,
    pub minor_allele_freq: Option<f64>,
    pub minor_allele_count: Option<i64>,
    pub somatic: bool,
    pub flipped: bool,
    pub display: bool,
    link: AdaptorLink,
    alleles: LazyAttribute<Vec<Allele>>,
    synonyms: LazyAttribute<Vec<Arc<Synonym>>>,
    failed_descriptions: LazyAttribute<Vec<String>>,
    flanking: LazyAttribute<Option<FlankingSequence>>,
}

impl Variation {
    /// An unpersisted variation with no adaptor link
    pub fn new(name: impl Into<String>, source_id: DbId) -> Self {
        Self {
            dbid: 0,
            name: name.into(),
            source_id,
            class: None,
            ancestral_allele: None,
            minor_allele: None,
            minor_allele_freq: None,
            minor_allele_count: None,
            somatic: false,
            flipped: false,
            display: true,
            link: Weak::new(),
            alleles: LazyAttribute::new(),
            synonyms: LazyAttribute::new(),
            failed_descriptions: LazyAttribute::new(),
            flanking: LazyAttribute::new(),
        }
    }

    pub fn with_dbid(mut self, dbid: DbId) -> Self {
        self.dbid = dbid;
        self
    }

    pub fn dbid(&self) -> DbId {
        self.dbid
    }

    /// Copy of this variation for use as a replacement snapshot.
    ///
    /// Keeps the adaptor link and every lazy attribute already loaded.
    pub fn snapshot(&self) -> Self {
        Self {
            dbid: self.dbid,
            name: self.name.clone(),
            source_id: self.source_id,
            class: self.class.clone(),
            ancestral_allele: self.ancestral_allele.clone(),
            minor_allele: self.minor_allele.clone(),
            minor_allele_freq: self.minor_allele_freq,
            minor_allele_count: self.minor_allele_count,
            somatic: self.somatic,
            flipped: self.flipped,
            display: self.display,
            link: self.link.clone(),
            alleles: carry_slot(&self.alleles),
            synonyms: carry_slot(&self.synonyms),
            failed_descriptions: carry_slot(&self.failed_descriptions),
            flanking: carry_slot(&self.flanking),
        }
    }

    /// Alleles, loaded on first access
    pub fn alleles(&self) -> Result<Vec<Allele>, AdaptorError> {
        load_lazy(&self.link, Self::KIND, self.dbid, "alleles", &self.alleles, |db| {
            db.variations().load_alleles(self.dbid)
        })
    }

    pub(crate) fn alleles_slot(&self) -> &LazyAttribute<Vec<Allele>> {
        &self.alleles
    }

    /// Synonyms, loaded on first access
    pub fn synonyms(&self) -> Result<Vec<Arc<Synonym>>, AdaptorError> {
        load_lazy(&self.link, Self::KIND, self.dbid, "synonyms", &self.synonyms, |db| {
            db.variations().load_synonyms(self.dbid)
        })
    }

    /// Synonym names, sorted
    pub fn synonym_names(&self) -> Result<Vec<String>, AdaptorError> {
        let mut names: Vec<String> = self.synonyms()?.iter().map(|s| s.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    /// Reasons this variation failed quality control (empty if it passed)
    pub fn failed_descriptions(&self) -> Result<Vec<String>, AdaptorError> {
        load_lazy(
            &self.link,
            Self::KIND,
            self.dbid,
            "failed_descriptions",
            &self.failed_descriptions,
            |db| db.variations().load_failed_descriptions(self.dbid),
        )
    }

    pub fn is_failed(&self) -> Result<bool, AdaptorError> {
        Ok(!self.failed_descriptions()?.is_empty())
    }

    pub fn flanking_sequence(&self) -> Result<Option<FlankingSequence>, AdaptorError> {
        load_lazy(
            &self.link,
            Self::KIND,
            self.dbid,
            "flanking_sequence",
            &self.flanking,
            |db| db.variations().load_flanking_sequence(self.dbid),
        )
    }

    /// The source this variation comes from, through the source cache
    /// (`None` once detached)
    pub fn source(&self) -> Result<Option<Arc<Source>>, AdaptorError> {
        match live_adaptor(&self.link) {
            Some(db) => db.sources().fetch_by_dbid(self.source_id),
            None => Ok(None),
        }
    }
}

fn carry_slot<T: Clone>(slot: &LazyAttribute<T>) -> LazyAttribute<T> {
    match slot.get() {
        Some(value) => LazyAttribute::loaded(value),
        None => LazyAttribute::new(),
    }
}

impl Entity for Variation {
    const KIND: EntityKind = EntityKind::Variation;

    fn db_id(&self) -> DbId {
        self.dbid
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn secondary_keys(&self) -> Vec<(KeyName, String)> {
        vec![(NAME_KEY, self.name.clone())]
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("variation name is empty".to_string());
        }
        if self.source_id == 0 {
            return Err("variation has no source".to_string());
        }
        Ok(())
    }
}

impl Persisted for Variation {
    const TABLE: &'static str = "variation";
    const ID_COLUMN: &'static str = "variation_id";
    const NAME_COLUMN: Option<&'static str> = Some("name");
    const COLUMNS: &'static [&'static str] = &[
        "variation_id",
        "source_id",
        "name",
        "class",
        "ancestral_allele",
        "minor_allele",
        "minor_allele_freq",
        "minor_allele_count",
        "somatic",
        "flipped",
        "display",
    ];

    fn from_row(row: &Row, link: &AdaptorLink) -> Result<Self, RowError> {
        let mut variation = Self::new(row.text("name")?, row.opt_id("source_id")?.unwrap_or(0));
        variation.dbid = row.id("variation_id")?;
        variation.class = row.opt_text("class")?;
        variation.ancestral_allele = row.opt_text("ancestral_allele")?;
        variation.minor_allele = row.opt_text("minor_allele")?;
        variation.minor_allele_freq = row.opt_real("minor_allele_freq")?;
        variation.minor_allele_count = row.opt_int("minor_allele_count")?;
        variation.somatic = row.flag("somatic")?;
        variation.flipped = row.flag("flipped")?;
        variation.display = row.opt_int("display")?.map_or(true, |v| v != 0);
        variation.link = link.clone();
        Ok(variation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LoadState;

    fn row() -> Row {
        Row::new()
            .with("variation_id", 699u64)
            .with("source_id", 1u64)
            .with("name", "rs699")
            .with("class", "SNV")
            .with("ancestral_allele", "A")
            .with("minor_allele", "G")
            .with("minor_allele_freq", 0.29)
            .with("minor_allele_count", 1452i64)
            .with("somatic", false)
            .with("flipped", 0i64)
            .with("display", None::<i64>)
    }

    #[test]
    fn test_from_row() {
        let v = Variation::from_row(&row(), &Weak::new()).unwrap();
        assert_eq!(v.dbid(), 699);
        assert_eq!(v.name, "rs699");
        assert_eq!(v.minor_allele_freq, Some(0.29));
        assert!(!v.somatic);
        assert!(v.display);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let v = Variation::new("rs1", 0).with_dbid(1);
        assert!(v.validate().unwrap_err().contains("source"));
    }

    #[test]
    fn test_detached_lazy_attributes_yield_empty() {
        let v = Variation::from_row(&row(), &Weak::new()).unwrap();
        assert!(v.alleles().unwrap().is_empty());
        assert!(v.synonyms().unwrap().is_empty());
        assert!(!v.is_failed().unwrap());
        assert_eq!(v.flanking_sequence().unwrap(), None);
        assert!(v.source().unwrap().is_none());
        // The sentinel is not stored
        assert_eq!(v.alleles_slot().state(), LoadState::Unloaded);
    }

    #[test]
    fn test_snapshot_carries_loaded_attributes() {
        let v = Variation::new("rs1", 1).with_dbid(1);
        v.alleles_slot().set_if_unloaded(vec![Allele {
            dbid: 1,
            variation_id: 1,
            allele: "T".to_string(),
            population_id: None,
            frequency: Some(0.5),
            count: None,
        }]);

        let copy = v.snapshot();
        assert_eq!(copy.alleles().unwrap().len(), 1);
        assert!(!copy.failed_descriptions.is_loaded());
    }
}
