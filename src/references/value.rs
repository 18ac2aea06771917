//! Resolved reference values, classified once when they enter the pipeline

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use crate::series::{DataPoint, PercentileSeries};

/// Shape of a resolved reference
#[derive(Debug, Clone, PartialEq)]
pub enum RefValue {
    /// A single number (numeric strings included)
    Scalar(f64),
    /// A flat `{year, value}` series
    Series(Vec<DataPoint>),
    /// Percentile bands
    Percentiles(Vec<PercentileSeries>),
    /// Anything else (text, flags, event tables); read through `raw`
    Other,
}

impl RefValue {
    /// Decide the shape of a raw value
    pub fn classify(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => n.as_f64().map(RefValue::Scalar).unwrap_or(RefValue::Other),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(RefValue::Scalar)
                .unwrap_or(RefValue::Other),
            Value::Array(items) => {
                let Some(first) = items.first() else {
                    return RefValue::Other;
                };
                if first.get("percentile").is_some() && first.get("data").is_some() {
                    serde_json::from_value(raw.clone())
                        .map(RefValue::Percentiles)
                        .unwrap_or(RefValue::Other)
                } else if first.get("year").is_some() && first.get("value").is_some() {
                    serde_json::from_value(raw.clone())
                        .map(RefValue::Series)
                        .unwrap_or(RefValue::Other)
                } else {
                    RefValue::Other
                }
            }
            _ => RefValue::Other,
        }
    }
}

/// One named, resolved reference
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub raw: Value,
    pub value: RefValue,
}

impl Reference {
    pub fn new(name: &str, raw: Value) -> Self {
        let value = RefValue::classify(&raw);
        Self {
            name: name.to_string(),
            raw,
            value,
        }
    }
}

/// Named references visible to one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct References {
    entries: HashMap<String, Reference>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a reference
    pub fn insert(&mut self, name: &str, raw: Value) {
        self.entries.insert(name.to_string(), Reference::new(name, raw));
    }

    /// Merge `local` over `self`; local entries win on name collision
    pub fn merged_with(&self, local: &References) -> References {
        let mut merged = self.clone();
        for (name, reference) in &local.entries {
            merged.entries.insert(name.clone(), reference.clone());
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&Reference> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted reference names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Scalar value of a reference
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)?.value {
            RefValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn number_or(&self, name: &str, default: f64) -> f64 {
        self.number(name).unwrap_or(default)
    }

    /// Text value of a reference
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)?.raw.as_str()
    }

    /// Deserialize a structured reference; `Ok(None)` when absent
    pub fn typed<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        match self.get(name) {
            Some(reference) => serde_json::from_value(reference.raw.clone()).map(Some),
            None => Ok(None),
        }
    }
}
