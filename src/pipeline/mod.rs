//! Source processing pipeline
//!
//! Orders the sources of a registry, evaluates each one against the
//! configuration tree and collects the resulting percentile records.

mod custom_percentile;
mod executor;
pub mod ordering;
mod summary;

pub use custom_percentile::{substitute_custom_band, CustomPercentiles, Substitution};
pub use executor::{
    execution_order, run_pipeline, validate_record, PipelineConfig, PipelineExecutor,
    PipelineOutput, RunStats, SourceFailure,
};
pub use ordering::{lint, OrderingViolation, ViolationKind};
pub use summary::{PercentileSummary, PipelineSummary, DEFAULT_DISCOUNT_RATE};
