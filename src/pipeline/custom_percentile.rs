//! Custom percentile substitution
//!
//! A caller may ask for one source to be read at a specific percentile. That
//! band is copied into the reserved percentile-0 slot so downstream
//! calculations can follow "the custom scenario" without knowing which
//! percentile it is for each source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::series::{PercentileSeries, SourceData, CUSTOM_PERCENTILE};

/// Map of source id to the percentile its band 0 should alias
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomPercentiles(BTreeMap<String, u32>);

impl CustomPercentiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_id: &str, percentile: u32) -> Self {
        self.insert(source_id, percentile);
        self
    }

    pub fn insert(&mut self, source_id: &str, percentile: u32) {
        self.0.insert(source_id.to_string(), percentile);
    }

    pub fn get(&self, source_id: &str) -> Option<u32> {
        self.0.get(source_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(id, &p)| (id.as_str(), p))
    }

    /// Declared percentiles, deduplicated in declaration order, plus band 0
    /// whenever any custom entry exists
    pub fn effective_percentiles(&self, declared: &[u32]) -> Vec<u32> {
        let mut effective: Vec<u32> = Vec::with_capacity(declared.len() + 1);
        for &p in declared {
            if p != CUSTOM_PERCENTILE && !effective.contains(&p) {
                effective.push(p);
            }
        }
        if !self.is_empty() {
            effective.push(CUSTOM_PERCENTILE);
        }
        effective
    }
}

impl FromIterator<(String, u32)> for CustomPercentiles {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a substitution did to the raw data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// The aliased band was copied into band 0
    Copied,
    /// Flat data: band 0 will be produced by normalization
    Broadcast,
    /// The aliased band does not exist upstream; nothing changed
    MissingBand,
}

fn substitute_bands(bands: &mut Vec<PercentileSeries>, percentile: u32) -> Substitution {
    let Some(source) = bands.iter().find(|b| b.percentile.value == percentile) else {
        return Substitution::MissingBand;
    };
    let mut custom = source.clone();
    custom.percentile.value = CUSTOM_PERCENTILE;

    bands.retain(|b| b.percentile.value != CUSTOM_PERCENTILE);
    bands.push(custom);
    Substitution::Copied
}

/// Copy the band at `percentile` into band 0, replacing any existing band 0.
///
/// Applying the same substitution twice leaves the data unchanged.
pub fn substitute_custom_band(data: SourceData, percentile: u32) -> (SourceData, Substitution) {
    match data {
        SourceData::Record(mut record) => {
            let outcome = substitute_bands(&mut record.bands, percentile);
            if outcome == Substitution::Copied {
                record.metadata.custom_percentile = Some(percentile);
            }
            (SourceData::Record(record), outcome)
        }
        SourceData::Bands(mut bands) => {
            let outcome = substitute_bands(&mut bands, percentile);
            (SourceData::Bands(bands), outcome)
        }
        flat @ SourceData::Flat(_) => (flat, Substitution::Broadcast),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::DataPoint;

    fn bands() -> Vec<PercentileSeries> {
        [10, 50, 75, 90]
            .iter()
            .map(|&p| {
                let point = DataPoint::new(1, p as f64 * 10.0);
                PercentileSeries::new("energyRevenue", p, vec![point])
            })
            .collect()
    }

    #[test]
    fn test_effective_percentiles() {
        let none = CustomPercentiles::new();
        assert_eq!(none.effective_percentiles(&[10, 50, 90, 50]), vec![10, 50, 90]);

        let some = CustomPercentiles::new().with("energyRevenue", 75);
        assert_eq!(some.effective_percentiles(&[10, 50, 90]), vec![10, 50, 90, 0]);
        assert_eq!(some.effective_percentiles(&[0, 10]), vec![10, 0]);
    }

    #[test]
    fn test_substitution_copies_band() {
        let (data, outcome) = substitute_custom_band(SourceData::Bands(bands()), 75);
        assert_eq!(outcome, Substitution::Copied);
        let bands = data.bands().unwrap();
        let custom = bands.iter().find(|b| b.percentile.value == 0).unwrap();
        assert_eq!(custom.data[0].value, 750.0);
        assert_eq!(custom.name, "energyRevenue");
    }

    #[test]
    fn test_substitution_is_idempotent() {
        let (once, _) = substitute_custom_band(SourceData::Bands(bands()), 75);
        let once = once.bands().unwrap().to_vec();
        let (twice, outcome) = substitute_custom_band(SourceData::Bands(once.clone()), 75);
        assert_eq!(outcome, Substitution::Copied);
        assert_eq!(twice.bands().unwrap(), once.as_slice());
    }

    #[test]
    fn test_missing_band_leaves_data_alone() {
        let (data, outcome) = substitute_custom_band(SourceData::Bands(bands()), 25);
        assert_eq!(outcome, Substitution::MissingBand);
        assert_eq!(data.bands().unwrap().len(), 4);

        let (_, flat) = substitute_custom_band(SourceData::Flat(vec![DataPoint::new(1, 1.0)]), 75);
        assert_eq!(flat, Substitution::Broadcast);
    }

    #[test]
    fn test_deserializes_from_plain_map() {
        let custom: CustomPercentiles = serde_json::from_str(r#"{"energyRevenue": 75}"#).unwrap();
        assert_eq!(custom.get("energyRevenue"), Some(75));
        assert_eq!(custom.get("omCost"), None);
        assert_eq!(custom.len(), 1);
    }
}
