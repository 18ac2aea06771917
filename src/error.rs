//! Error types for the source processing pipeline
//!
//! Every stage of a run has its own error enum so the executor can decide,
//! per stage, whether a failure skips the whole source or only one step.

use thiserror::Error;

/// Raw data could not be pulled out of the configuration tree
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("path `{path}` did not resolve to a value")]
    Unresolved { path: String },

    #[error("value at `{path}` has an unsupported shape: {reason}")]
    UnsupportedShape { path: String, reason: String },
}

/// A transformer failed; the executor drops the whole source
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("missing required reference `{0}`")]
    MissingReference(String),

    #[error("reference `{name}` is invalid: {reason}")]
    InvalidReference { name: String, reason: String },

    #[error("dependency `{0}` has not been processed yet")]
    MissingDependency(String),

    #[error("calculation failed: {0}")]
    Calculation(String),
}

/// The multiplier stage failed as a whole (as opposed to a single
/// unresolvable multiplier, which is only dropped)
#[derive(Debug, Error)]
pub enum MultiplierError {
    #[error("multiplier `{id}` produced a non-finite value at year {year} (P{percentile})")]
    NonFinite { id: String, year: i32, percentile: u32 },
}

/// Final shape check on an assembled source record
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("record has no percentile bands")]
    EmptyBands,

    #[error("percentile {0} appears more than once")]
    DuplicatePercentile(u32),

    #[error("percentile {0} is not part of the effective percentile set")]
    UnexpectedPercentile(u32),

    #[error("non-finite value at year {year} (P{percentile})")]
    NonFinite { percentile: u32, year: i32 },
}

/// Why one source was dropped from a run
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("definition does not match its `{0}` source type")]
    InvalidDefinition(&'static str),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Multiplier(#[from] MultiplierError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SourceError {
    /// Pipeline stage the error came from
    pub fn stage(&self) -> &'static str {
        match self {
            SourceError::InvalidDefinition(_) => "definition",
            SourceError::Extraction(_) => "extraction",
            SourceError::Transform(_) => "transformer",
            SourceError::Multiplier(_) => "multiplier",
            SourceError::Validation(_) => "validation",
        }
    }
}

/// Loading or checking a source registry failed
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate source id `{0}`")]
    DuplicateSource(String),
}

/// Loading a scenario configuration tree failed
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writing pipeline output failed
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
