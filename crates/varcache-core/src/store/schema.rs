//! SQLite Schema Definitions for Variation Storage
//!
//! Table and column names follow the variation database layout. The adaptor
//! layer only ever reads through `Select`; these statements are used when a
//! store is created and seeded.

/// Schema version recorded in the `meta` table
pub const STORE_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the entity tables
pub const SCHEMA_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    meta_key TEXT PRIMARY KEY NOT NULL,
    meta_value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source (
    source_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    version TEXT,
    description TEXT,
    url TEXT,
    somatic_status TEXT
);

CREATE TABLE IF NOT EXISTS variation (
    variation_id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    class TEXT,
    ancestral_allele TEXT,
    minor_allele TEXT,
    minor_allele_freq REAL,
    minor_allele_count INTEGER,
    somatic INTEGER NOT NULL DEFAULT 0,
    flipped INTEGER NOT NULL DEFAULT 0,
    display INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS variation_synonym (
    variation_synonym_id INTEGER PRIMARY KEY,
    variation_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS variation_feature (
    variation_feature_id INTEGER PRIMARY KEY,
    variation_id INTEGER NOT NULL,
    variation_name TEXT,
    seq_region_id INTEGER NOT NULL,
    seq_region_start INTEGER NOT NULL,
    seq_region_end INTEGER NOT NULL,
    seq_region_strand INTEGER NOT NULL,
    allele_string TEXT,
    map_weight INTEGER NOT NULL DEFAULT 1,
    source_id INTEGER NOT NULL,
    consequence_types TEXT
);

CREATE TABLE IF NOT EXISTS variation_set (
    variation_set_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    short_name TEXT
);

CREATE TABLE IF NOT EXISTS variation_set_structure (
    variation_set_super INTEGER NOT NULL,
    variation_set_sub INTEGER NOT NULL,
    PRIMARY KEY (variation_set_super, variation_set_sub)
);

CREATE TABLE IF NOT EXISTS variation_set_variation (
    variation_id INTEGER NOT NULL,
    variation_set_id INTEGER NOT NULL,
    PRIMARY KEY (variation_id, variation_set_id)
);

CREATE TABLE IF NOT EXISTS allele (
    allele_id INTEGER PRIMARY KEY,
    variation_id INTEGER NOT NULL,
    allele TEXT NOT NULL,
    population_id INTEGER,
    frequency REAL,
    count INTEGER
);

CREATE TABLE IF NOT EXISTS flanking_sequence (
    variation_id INTEGER PRIMARY KEY,
    up_seq TEXT,
    down_seq TEXT
);

CREATE TABLE IF NOT EXISTS failed_description (
    failed_description_id INTEGER PRIMARY KEY,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS failed_variation (
    failed_variation_id INTEGER PRIMARY KEY,
    variation_id INTEGER NOT NULL,
    failed_description_id INTEGER NOT NULL
)
"#;

/// SQL to create indexes for the natural-key and join lookups
pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_source_name ON source(name);
CREATE INDEX IF NOT EXISTS idx_variation_name ON variation(name);
CREATE INDEX IF NOT EXISTS idx_variation_source ON variation(source_id);
CREATE INDEX IF NOT EXISTS idx_synonym_name ON variation_synonym(name);
CREATE INDEX IF NOT EXISTS idx_synonym_variation ON variation_synonym(variation_id);
CREATE INDEX IF NOT EXISTS idx_vf_variation ON variation_feature(variation_id);
CREATE INDEX IF NOT EXISTS idx_set_name ON variation_set(name);
CREATE INDEX IF NOT EXISTS idx_set_short_name ON variation_set(short_name);
CREATE INDEX IF NOT EXISTS idx_set_structure_sub ON variation_set_structure(variation_set_sub);
CREATE INDEX IF NOT EXISTS idx_set_variation_set ON variation_set_variation(variation_set_id);
CREATE INDEX IF NOT EXISTS idx_allele_variation ON allele(variation_id);
CREATE INDEX IF NOT EXISTS idx_failed_variation ON failed_variation(variation_id)
"#;

/// Tables the store knows about, used to reject selects against anything else
pub const KNOWN_TABLES: &[&str] = &[
    "meta",
    "source",
    "variation",
    "variation_synonym",
    "variation_feature",
    "variation_set",
    "variation_set_structure",
    "variation_set_variation",
    "allele",
    "flanking_sequence",
    "failed_description",
    "failed_variation",
];
