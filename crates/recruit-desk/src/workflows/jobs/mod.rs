//! Job-side configuration consumed by the application workflow: criterion weights and the
//! cached job catalog.

mod catalog;
mod scoring;

pub mod router;

pub use catalog::{CatalogError, JobCatalog, JobCatalogCache, JobSummary};
pub use router::job_router;
pub use scoring::{
    validate_weights, JobConfigError, JobConfigStore, JobScoringService, ScoreWeightSet,
    ScoringCriterion, ScoringError, WeightValidation, MAX_WEIGHT, WEIGHT_TOTAL,
};
