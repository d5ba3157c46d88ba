use super::{in_request_order, VariationDb};
use crate::cache::AliasRelation;
use crate::entity::{DbId, Entity};
use crate::error::AdaptorError;
use crate::model::{Allele, FlankingSequence, Source, Synonym, Variation};
use crate::row::Value;
use crate::store::{Select, Store};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Historical variation names, resolved when a name lookup misses
const VARIATION_SYNONYMS: AliasRelation = AliasRelation {
    table: "variation_synonym",
    alias_column: "name",
    target_column: "variation_id",
};

const FAILED_VARIATION_TABLE: &str = "failed_variation";
const FAILED_DESCRIPTION_TABLE: &str = "failed_description";
const FLANKING_TABLE: &str = "flanking_sequence";

/// Fetches `Variation` entities and their lazy attributes
pub struct VariationAdaptor<'a> {
    db: &'a VariationDb,
}

impl<'a> VariationAdaptor<'a> {
    pub(crate) fn new(db: &'a VariationDb) -> Self {
        Self { db }
    }

    pub fn fetch_by_dbid(&self, id: DbId) -> Result<Option<Arc<Variation>>, AdaptorError> {
        self.db.ensure_open()?;
        if id == 0 {
            return Ok(None);
        }
        let mut found = self
            .db
            .fetcher(self.db.variation_cache())
            .fetch_by_ids(&[id])?;
        Ok(found.remove(&id))
    }

    /// Variations for `ids`, in request order; unknown IDs are left out
    pub fn fetch_all_by_dbid_list(
        &self,
        ids: &[DbId],
    ) -> Result<Vec<Arc<Variation>>, AdaptorError> {
        self.db.ensure_open()?;
        let found = self
            .db
            .fetcher(self.db.variation_cache())
            .fetch_by_ids(ids)?;
        Ok(in_request_order(ids, found))
    }

    /// Look up a variation by name, falling back to its synonyms
    pub fn fetch_by_name(&self, name: &str) -> Result<Option<Arc<Variation>>, AdaptorError> {
        let mut found = self.fetch_all_by_name_list(&[name])?;
        Ok(found.remove(name))
    }

    /// Look up variations by name, falling back to synonyms for names with
    /// no direct match. Unresolved names are absent from the map.
    pub fn fetch_all_by_name_list<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<HashMap<String, Arc<Variation>>, AdaptorError> {
        self.db.ensure_open()?;
        let found = self
            .db
            .fetcher(self.db.variation_cache())
            .with_alias(VARIATION_SYNONYMS)
            .fetch_by_names(names)?;
        Ok(found)
    }

    /// Every variation from one source, by ID
    pub fn fetch_all_by_source(&self, source: &Source) -> Result<Vec<Arc<Variation>>, AdaptorError> {
        self.db.ensure_open()?;
        if source.db_id() == 0 {
            return Ok(Vec::new());
        }
        let found = self
            .db
            .fetcher(self.db.variation_cache())
            .fetch_where("source_id", &[Value::from(source.db_id())])?;
        Ok(found)
    }

    /// Load the alleles of many variations with one query per chunk.
    ///
    /// Variations whose alleles are already loaded (or being loaded) are
    /// skipped. Returns the number of slots filled.
    pub fn preload_alleles(&self, variations: &[Arc<Variation>]) -> Result<usize, AdaptorError> {
        self.db.ensure_open()?;
        let pending: Vec<&Arc<Variation>> = variations
            .iter()
            .filter(|v| v.db_id() != 0 && !v.alleles_slot().is_loaded())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let ids: Vec<DbId> = pending.iter().map(|v| v.db_id()).collect();
        let rows = self
            .db
            .select_chunked(Allele::TABLE, Allele::COLUMNS, "variation_id", &ids)?;

        let mut by_variation: HashMap<DbId, Vec<Allele>> = HashMap::new();
        for row in &rows {
            match Allele::from_row(row) {
                Ok(allele) => by_variation.entry(allele.variation_id).or_default().push(allele),
                Err(e) => warn!("Skipping malformed {} row: {}", Allele::TABLE, e),
            }
        }

        let mut filled = 0;
        for variation in pending {
            let mut alleles = by_variation.remove(&variation.db_id()).unwrap_or_default();
            alleles.sort_unstable_by_key(|a| a.dbid);
            if variation.alleles_slot().set_if_unloaded(alleles) {
                filled += 1;
            }
        }
        debug!("Preloaded alleles for {} variations", filled);
        Ok(filled)
    }

    /// Swap in a new snapshot of a cached variation.
    ///
    /// Build `variation` from `Variation::snapshot` of the cached instance
    /// to keep its adaptor link. Returns the replaced snapshot.
    pub fn update_snapshot(
        &self,
        variation: Variation,
    ) -> Result<Option<Arc<Variation>>, AdaptorError> {
        self.db.ensure_open()?;
        Ok(self.db.variation_cache().replace(Arc::new(variation))?)
    }

    pub(crate) fn load_alleles(&self, id: DbId) -> Result<Vec<Allele>, AdaptorError> {
        let select = Select::where_in(Allele::TABLE, Allele::COLUMNS, "variation_id", [id]);
        let mut alleles: Vec<Allele> = self
            .db
            .execute(&select)?
            .iter()
            .filter_map(|row| match Allele::from_row(row) {
                Ok(allele) => Some(allele),
                Err(e) => {
                    warn!("Skipping malformed {} row: {}", Allele::TABLE, e);
                    None
                }
            })
            .collect();
        alleles.sort_unstable_by_key(|a| a.dbid);
        Ok(alleles)
    }

    pub(crate) fn load_synonyms(&self, id: DbId) -> Result<Vec<Arc<Synonym>>, AdaptorError> {
        let synonyms = self
            .db
            .fetcher(self.db.synonym_cache())
            .fetch_where("variation_id", &[Value::from(id)])?;
        Ok(synonyms)
    }

    pub(crate) fn load_failed_descriptions(&self, id: DbId) -> Result<Vec<String>, AdaptorError> {
        let select = Select::where_in(
            FAILED_VARIATION_TABLE,
            &["variation_id", "failed_description_id"],
            "variation_id",
            [id],
        );
        let description_ids: BTreeSet<DbId> = self
            .db
            .execute(&select)?
            .iter()
            .filter_map(|row| row.id("failed_description_id").ok())
            .collect();
        if description_ids.is_empty() {
            return Ok(Vec::new());
        }

        let unknown: Vec<DbId> = description_ids
            .iter()
            .copied()
            .filter(|d| self.db.failed_description(*d).is_none())
            .collect();
        if !unknown.is_empty() {
            let rows = self.db.select_chunked(
                FAILED_DESCRIPTION_TABLE,
                &["failed_description_id", "description"],
                "failed_description_id",
                &unknown,
            )?;
            for row in &rows {
                match (row.id("failed_description_id"), row.text("description")) {
                    (Ok(d), Ok(text)) => self.db.remember_failed_description(d, text),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("Skipping malformed {} row: {}", FAILED_DESCRIPTION_TABLE, e)
                    }
                }
            }
        }

        Ok(description_ids
            .into_iter()
            .filter_map(|d| self.db.failed_description(d))
            .collect())
    }

    pub(crate) fn load_flanking_sequence(
        &self,
        id: DbId,
    ) -> Result<Option<FlankingSequence>, AdaptorError> {
        let select = Select::where_in(
            FLANKING_TABLE,
            &["variation_id", "up_seq", "down_seq"],
            "variation_id",
            [id],
        );
        let rows = self.db.execute(&select)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        match (row.opt_text("up_seq"), row.opt_text("down_seq")) {
            (Ok(up_seq), Ok(down_seq)) => Ok(Some(FlankingSequence { up_seq, down_seq })),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Skipping malformed {} row: {}", FLANKING_TABLE, e);
                Ok(None)
            }
        }
    }
}
