//! Multiplier specifications and their arithmetic

use serde::{Deserialize, Serialize};

/// How a multiplier value combines with the running series value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplierOperation {
    /// value × m
    Multiply,
    /// value × (1 + m)^(year − base)
    Compound,
    /// value × (1 + m × (year − base))
    Simple,
    /// value + m
    Summation,
}

impl MultiplierOperation {
    pub fn apply(self, value: f64, m: f64, year: i32, base_year: i32) -> f64 {
        let elapsed = year - base_year;
        match self {
            MultiplierOperation::Multiply => value * m,
            MultiplierOperation::Compound => value * (1.0 + m).powi(elapsed),
            MultiplierOperation::Simple => value * (1.0 + m * elapsed as f64),
            MultiplierOperation::Summation => value + m,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MultiplierOperation::Multiply => "multiply",
            MultiplierOperation::Compound => "compound",
            MultiplierOperation::Simple => "simple",
            MultiplierOperation::Summation => "summation",
        }
    }
}

/// Restricts which points a multiplier touches; every set bound must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplierFilter {
    #[serde(default)]
    pub from_year: Option<i32>,
    #[serde(default)]
    pub to_year: Option<i32>,
    #[serde(default)]
    pub percentiles: Option<Vec<u32>>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl MultiplierFilter {
    /// Inclusive year window
    pub fn years(from_year: i32, to_year: i32) -> Self {
        Self {
            from_year: Some(from_year),
            to_year: Some(to_year),
            ..Default::default()
        }
    }

    pub fn matches(&self, year: i32, value: f64, percentile: u32) -> bool {
        self.from_year.map_or(true, |from| year >= from)
            && self.to_year.map_or(true, |to| year <= to)
            && self.percentiles.as_ref().map_or(true, |ps| ps.contains(&percentile))
            && self.min_value.map_or(true, |min| value >= min)
            && self.max_value.map_or(true, |max| value <= max)
    }
}

/// One entry of a source's ordered multiplier list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplierSpec {
    /// Processed source id or reference name supplying the value
    pub id: String,
    pub operation: MultiplierOperation,
    /// Defaults to the first year of each band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MultiplierFilter>,
}

impl MultiplierSpec {
    pub fn new(id: &str, operation: MultiplierOperation) -> Self {
        Self {
            id: id.to_string(),
            operation,
            base_year: None,
            filter: None,
        }
    }

    pub fn with_base_year(mut self, base_year: i32) -> Self {
        self.base_year = Some(base_year);
        self
    }

    pub fn with_filter(mut self, filter: MultiplierFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}
