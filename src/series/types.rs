//! Time series data structures shared by every pipeline stage

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::audit::SourceAudit;
use crate::error::ExtractionError;
use crate::registry::SourceMetadata;

/// Percentile reserved for the synthetic custom-percentile band
pub const CUSTOM_PERCENTILE: u32 = 0;

/// One sample of a time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub year: i32,
    pub value: f64,
}

impl DataPoint {
    pub fn new(year: i32, value: f64) -> Self {
        Self { year, value }
    }
}

/// Confidence level of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Percentile {
    pub value: u32,
}

impl Percentile {
    pub fn new(value: u32) -> Self {
        Self { value }
    }
}

/// One confidence band of one named series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileSeries {
    #[serde(default)]
    pub name: String,
    pub data: Vec<DataPoint>,
    pub percentile: Percentile,
}

impl PercentileSeries {
    pub fn new(name: impl Into<String>, percentile: u32, data: Vec<DataPoint>) -> Self {
        Self {
            name: name.into(),
            data,
            percentile: Percentile::new(percentile),
        }
    }

    /// Build a band from a year-ordered map
    pub fn from_year_map(
        name: impl Into<String>,
        percentile: u32,
        values: &BTreeMap<i32, f64>,
    ) -> Self {
        let data = values
            .iter()
            .map(|(&year, &value)| DataPoint::new(year, value))
            .collect();
        Self::new(name, percentile, data)
    }

    /// Value at a given year, if present
    pub fn value_at(&self, year: i32) -> Option<f64> {
        self.data.iter().find(|p| p.year == year).map(|p| p.value)
    }

    /// Sum of every value in the band
    pub fn total(&self) -> f64 {
        self.data.iter().map(|p| p.value).sum()
    }

    /// Index the band by year
    pub fn year_map(&self) -> BTreeMap<i32, f64> {
        self.data.iter().map(|p| (p.year, p.value)).collect()
    }
}

/// The finished output of one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub bands: Vec<PercentileSeries>,
    pub metadata: SourceMetadata,
    #[serde(default)]
    pub audit: SourceAudit,
}

impl SourceRecord {
    /// Band for one percentile, if the record carries it
    pub fn band(&self, percentile: u32) -> Option<&PercentileSeries> {
        self.bands.iter().find(|b| b.percentile.value == percentile)
    }

    /// Percentiles present on this record, in band order
    pub fn percentiles(&self) -> Vec<u32> {
        self.bands.iter().map(|b| b.percentile.value).collect()
    }
}

/// Every data shape the helpers accept, decided once at the data boundary
#[derive(Debug, Clone)]
pub enum SourceData {
    /// A complete record (bands plus lineage)
    Record(SourceRecord),
    /// Percentile bands without a record around them
    Bands(Vec<PercentileSeries>),
    /// A single series without percentile variation
    Flat(Vec<DataPoint>),
}

impl SourceData {
    /// Classify a raw configuration value.
    ///
    /// Accepted shapes:
    /// - an array of `{name?, data, percentile: {value}}` objects
    /// - an array of `{year, value}` objects
    /// - an object keyed by percentile (`{"10": [{year, value}], ...}`)
    pub fn from_json(value: &Value, name: &str, path: &str) -> Result<Self, ExtractionError> {
        let unsupported = |reason: String| ExtractionError::UnsupportedShape {
            path: path.to_string(),
            reason,
        };

        match value {
            Value::Array(items) => {
                let Some(first) = items.first() else {
                    return Ok(SourceData::Flat(Vec::new()));
                };

                if first.get("percentile").is_some() {
                    let mut bands: Vec<PercentileSeries> = serde_json::from_value(value.clone())
                        .map_err(|e| unsupported(e.to_string()))?;
                    for band in &mut bands {
                        if band.name.is_empty() {
                            band.name = name.to_string();
                        }
                    }
                    Ok(SourceData::Bands(bands))
                } else if first.get("year").is_some() {
                    let points: Vec<DataPoint> = serde_json::from_value(value.clone())
                        .map_err(|e| unsupported(e.to_string()))?;
                    Ok(SourceData::Flat(points))
                } else {
                    Err(unsupported("array elements are neither bands nor data points".into()))
                }
            }
            Value::Object(map) => {
                let mut bands = Vec::with_capacity(map.len());
                for (key, series) in map {
                    let percentile: u32 = key
                        .parse()
                        .map_err(|_| unsupported(format!("key `{}` is not a percentile", key)))?;
                    let data: Vec<DataPoint> = serde_json::from_value(series.clone())
                        .map_err(|e| unsupported(e.to_string()))?;
                    bands.push(PercentileSeries::new(name, percentile, data));
                }
                bands.sort_by_key(|b| b.percentile.value);
                Ok(SourceData::Bands(bands))
            }
            other => Err(unsupported(format!(
                "expected array or object, found {}",
                json_kind(other)
            ))),
        }
    }

    /// Borrow the percentile bands, if this shape has any
    pub fn bands(&self) -> Option<&[PercentileSeries]> {
        match self {
            SourceData::Record(record) => Some(&record.bands),
            SourceData::Bands(bands) => Some(bands),
            SourceData::Flat(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SourceData::Record(record) => record.bands.is_empty(),
            SourceData::Bands(bands) => bands.is_empty(),
            SourceData::Flat(points) => points.is_empty(),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
