//! Percentile time series and the pure helpers that combine them

mod types;
pub mod helpers;

pub use types::{
    DataPoint, Percentile, PercentileSeries, SourceData, SourceRecord, CUSTOM_PERCENTILE,
};
pub(crate) use types::json_kind;
pub use helpers::{
    adjust_values, aggregate, band_for, extract_band, filter_sources, negate, normalize,
    trim_values, AggregateOperation, AggregateOptions, SourceFilter, MEDIAN_PERCENTILE,
};
