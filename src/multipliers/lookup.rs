//! Multiplier value lookup strategies
//!
//! The strategy is picked once per multiplier from the shape of whatever
//! supplies the value, so the per-point loop is a plain map lookup.

use std::collections::HashMap;

use crate::references::{RefValue, Reference};
use crate::series::{
    DataPoint, PercentileSeries, SourceRecord, CUSTOM_PERCENTILE, MEDIAN_PERCENTILE,
};

/// Where a multiplier's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MultiplierOrigin {
    Source,
    Reference,
}

#[derive(Debug, Clone)]
pub enum MultiplierLookup {
    /// Same value for every point
    Constant(f64),
    /// Value varies by year only
    ByYear(HashMap<i32, f64>),
    /// Value varies by percentile and year
    ByPercentile {
        bands: HashMap<u32, HashMap<i32, f64>>,
        /// Percentile read for band 0 when the supplier has no band 0
        alias: Option<u32>,
    },
}

fn year_map(points: &[DataPoint]) -> HashMap<i32, f64> {
    points.iter().map(|p| (p.year, p.value)).collect()
}

fn band_maps(bands: &[PercentileSeries]) -> HashMap<u32, HashMap<i32, f64>> {
    bands
        .iter()
        .map(|b| (b.percentile.value, year_map(&b.data)))
        .collect()
}

impl MultiplierLookup {
    /// Year + percentile keyed lookup over a processed source
    pub fn from_record(record: &SourceRecord, alias: Option<u32>) -> Self {
        MultiplierLookup::ByPercentile {
            bands: band_maps(&record.bands),
            alias,
        }
    }

    /// Lookup over a resolved reference; `None` if it holds no numbers
    pub fn from_reference(reference: &Reference, alias: Option<u32>) -> Option<Self> {
        match &reference.value {
            RefValue::Scalar(v) => Some(MultiplierLookup::Constant(*v)),
            RefValue::Series(points) => Some(MultiplierLookup::ByYear(year_map(points))),
            RefValue::Percentiles(bands) => Some(MultiplierLookup::ByPercentile {
                bands: band_maps(bands),
                alias,
            }),
            RefValue::Other => None,
        }
    }

    /// Value to apply at `(year, percentile)`, if the supplier covers it
    pub fn value(&self, year: i32, percentile: u32) -> Option<f64> {
        match self {
            MultiplierLookup::Constant(v) => Some(*v),
            MultiplierLookup::ByYear(values) => values.get(&year).copied(),
            MultiplierLookup::ByPercentile { bands, alias } => {
                // Same chain as `band_for`: own band 0, alias, median
                let band = if percentile == CUSTOM_PERCENTILE {
                    bands
                        .get(&CUSTOM_PERCENTILE)
                        .or_else(|| alias.and_then(|p| bands.get(&p)))
                        .or_else(|| bands.get(&MEDIAN_PERCENTILE))
                } else {
                    bands.get(&percentile)
                };
                band.and_then(|values| values.get(&year)).copied()
            }
        }
    }
}
