//! Energy Finance - percentile-aware source processing for power project financials
//!
//! This library provides:
//! - A source registry of direct, indirect, and virtual financial sources
//! - Extraction of Monte-Carlo percentile results from a scenario configuration tree
//! - Multipliers (escalation, scaling) and built-in transformers (totals, debt, events)
//! - Custom percentile selection through a synthetic band 0
//! - Per-source audit trails and headline metrics (NPV, IRR, DSCR)

pub mod audit;
pub mod error;
pub mod export;
pub mod finance;
pub mod multipliers;
pub mod pipeline;
pub mod references;
pub mod registry;
pub mod scenario;
pub mod series;
pub mod transformers;

// Re-export commonly used types
pub use pipeline::{
    run_pipeline, CustomPercentiles, PipelineConfig, PipelineExecutor, PipelineOutput,
};
pub use references::{ConfigTree, ReferenceResolver};
pub use registry::SourceRegistry;
pub use scenario::ScenarioRunner;
pub use series::{PercentileSeries, SourceRecord};
