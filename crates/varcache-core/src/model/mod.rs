//! Cached entity types.
//!
//! Once cached, entities are shared read-only snapshots. Fields that are
//! expensive or rarely needed live in `LazyAttribute` slots and are fetched
//! through the entity's link to its `VariationDb` on first access.

pub mod source;
pub mod synonym;
pub mod variation;
pub mod variation_feature;
pub mod variation_set;

pub use source::Source;
pub use synonym::Synonym;
pub use variation::{Allele, FlankingSequence, Variation};
pub use variation_feature::VariationFeature;
pub use variation_set::VariationSet;
