//! Common test utilities for integration tests.
//!
//! Provides a seeded in-memory SQLite store and store wrappers that fail
//! or stall on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use varcache_core::{
    AdaptorOptions, DbId, Row, Select, SqliteStore, Store, StoreError, VariationDb,
};

// ============================================================================
// Fixture data
// ============================================================================

/// Variations 1..=12 are well formed; 13 has an empty name
pub const VALID_VARIATIONS: u64 = 12;
pub const MALFORMED_VARIATION: DbId = 13;

/// Set hierarchy (super → sub):
///
/// ```text
/// 1 All ─┬─ 2 1000 Genomes ── 3 1000 Genomes - EUR
///        └─ 4 Clinical
/// 5 Cycle A ⇄ 6 Cycle B
/// 7 Diamond ─┬─ 8 ─┐
///            └─ 9 ─┴─ 10
/// ```
pub const SET_STRUCTURE: &[(DbId, DbId)] = &[
    (1, 2),
    (2, 3),
    (1, 4),
    (5, 6),
    (6, 5),
    (7, 8),
    (7, 9),
    (8, 10),
    (9, 10),
];

/// (set, variation)
pub const SET_MEMBERS: &[(DbId, DbId)] = &[
    (2, 5),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
    (4, 4),
    (5, 7),
    (6, 8),
];

fn insert(store: &SqliteStore, table: &'static str, rows: Vec<Row>) {
    store.insert_rows(table, &rows).expect("Failed to seed table");
}

/// In-memory store holding the fixture data set
pub fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("Failed to create store");

    insert(
        &store,
        "source",
        vec![
            Row::new()
                .with("source_id", 1u64)
                .with("name", "dbSNP")
                .with("version", "156")
                .with("url", "https://www.ncbi.nlm.nih.gov/snp"),
            Row::new()
                .with("source_id", 2u64)
                .with("name", "ClinVar")
                .with("somatic_status", "mixed"),
        ],
    );

    let mut variations: Vec<Row> = (1..=VALID_VARIATIONS)
        .map(|id| {
            Row::new()
                .with("variation_id", id)
                .with("source_id", if id % 4 == 0 { 2u64 } else { 1u64 })
                .with("name", format!("rs{}", id))
                .with("class", "SNV")
                .with("minor_allele_freq", 0.05 * id as f64)
        })
        .collect();
    variations.push(
        Row::new()
            .with("variation_id", MALFORMED_VARIATION)
            .with("source_id", 1u64)
            .with("name", ""),
    );
    insert(&store, "variation", variations);

    insert(
        &store,
        "variation_synonym",
        vec![
            synonym(1, 5, "ss5"),
            synonym(2, 7, "ss7a"),
            synonym(3, 7, "ss7b"),
        ],
    );

    insert(
        &store,
        "allele",
        vec![
            allele(1, 5, "A", Some(0.7)),
            allele(2, 5, "G", Some(0.3)),
            allele(3, 7, "C", None),
        ],
    );

    insert(
        &store,
        "flanking_sequence",
        vec![Row::new()
            .with("variation_id", 5u64)
            .with("up_seq", "ACGTTGCA")
            .with("down_seq", "TTGACCAG")],
    );

    insert(
        &store,
        "failed_description",
        vec![
            Row::new()
                .with("failed_description_id", 1u64)
                .with("description", "Variant maps to more than 3 different locations"),
            Row::new()
                .with("failed_description_id", 2u64)
                .with(
                    "description",
                    "None of the variant alleles match the reference allele",
                ),
        ],
    );
    insert(
        &store,
        "failed_variation",
        vec![
            Row::new()
                .with("failed_variation_id", 1u64)
                .with("variation_id", 9u64)
                .with("failed_description_id", 1u64),
            Row::new()
                .with("failed_variation_id", 2u64)
                .with("variation_id", 9u64)
                .with("failed_description_id", 2u64),
            Row::new()
                .with("failed_variation_id", 3u64)
                .with("variation_id", 10u64)
                .with("failed_description_id", 1u64),
        ],
    );

    insert(
        &store,
        "variation_feature",
        vec![
            feature(1, 5, 1, 1_000, 1),
            feature(2, 5, 2, 2_000, -1),
            feature(3, 7, 1, 3_000, 1),
        ],
    );

    let set_names = [
        (1u64, "All", None),
        (2, "1000 Genomes", Some("1kg")),
        (3, "1000 Genomes - EUR", Some("1kg_eur")),
        (4, "Clinical", Some("clin")),
        (5, "Cycle A", None),
        (6, "Cycle B", None),
        (7, "Diamond", None),
        (8, "Diamond left", None),
        (9, "Diamond right", None),
        (10, "Diamond bottom", None),
    ];
    insert(
        &store,
        "variation_set",
        set_names
            .iter()
            .map(|(id, name, short_name)| {
                Row::new()
                    .with("variation_set_id", *id)
                    .with("name", *name)
                    .with("short_name", *short_name)
            })
            .collect(),
    );
    insert(
        &store,
        "variation_set_structure",
        SET_STRUCTURE
            .iter()
            .map(|(sup, sub)| {
                Row::new()
                    .with("variation_set_super", *sup)
                    .with("variation_set_sub", *sub)
            })
            .collect(),
    );
    insert(
        &store,
        "variation_set_variation",
        SET_MEMBERS
            .iter()
            .map(|(set, variation)| {
                Row::new()
                    .with("variation_set_id", *set)
                    .with("variation_id", *variation)
            })
            .collect(),
    );

    store
}

fn synonym(id: DbId, variation_id: DbId, name: &str) -> Row {
    Row::new()
        .with("variation_synonym_id", id)
        .with("variation_id", variation_id)
        .with("source_id", 1u64)
        .with("name", name)
}

fn allele(id: DbId, variation_id: DbId, allele: &str, frequency: Option<f64>) -> Row {
    Row::new()
        .with("allele_id", id)
        .with("variation_id", variation_id)
        .with("allele", allele)
        .with("frequency", frequency)
}

fn feature(id: DbId, variation_id: DbId, seq_region_id: DbId, start: i64, strand: i64) -> Row {
    Row::new()
        .with("variation_feature_id", id)
        .with("variation_id", variation_id)
        .with("variation_name", format!("rs{}", variation_id))
        .with("seq_region_id", seq_region_id)
        .with("seq_region_start", start)
        .with("seq_region_end", start)
        .with("seq_region_strand", strand)
        .with("allele_string", "A/G")
        .with("source_id", 1u64)
        .with("consequence_types", "missense_variant")
}

// ============================================================================
// Adaptor helpers
// ============================================================================

pub fn options(max_keys_per_query: usize) -> AdaptorOptions {
    AdaptorOptions {
        max_keys_per_query,
        preload_sources: false,
        lazy_wait_timeout: None,
    }
}

/// Adaptor over a fresh seeded store, without source preloading
pub fn open_seeded(max_keys_per_query: usize) -> Arc<VariationDb> {
    VariationDb::open(Arc::new(seeded_store()), options(max_keys_per_query))
        .expect("Failed to open adaptor")
}

// ============================================================================
// Store wrappers
// ============================================================================

/// Fails every query against `table` (or every query, if None) while failing
pub struct FlakyStore {
    inner: SqliteStore,
    table: Option<&'static str>,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore, table: Option<&'static str>) -> Self {
        Self {
            inner,
            table,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Store for FlakyStore {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        let targeted = self.table.map_or(true, |t| t == select.table);
        if targeted && self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(format!(
                "connection lost while reading {}",
                select.table
            )));
        }
        self.inner.execute(select)
    }
}

/// Sleeps before every query against `table`
pub struct SlowStore {
    inner: SqliteStore,
    table: &'static str,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: SqliteStore, table: &'static str, delay: Duration) -> Self {
        Self {
            inner,
            table,
            delay,
        }
    }
}

impl Store for SlowStore {
    fn execute(&self, select: &Select) -> Result<Vec<Row>, StoreError> {
        if select.table == self.table {
            std::thread::sleep(self.delay);
        }
        self.inner.execute(select)
    }
}
