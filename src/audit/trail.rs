//! Per-source audit trail with post-hoc step timing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::multipliers::AppliedMultiplier;
use crate::series::{DataPoint, PercentileSeries, SourceData};

/// Kind of work an audit entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditEntryType {
    Initialization,
    Reference,
    Extraction,
    CustomPercentile,
    Transformation,
    Multiplier,
    Validation,
    Completion,
    Error,
}

/// Representative slice of data attached to an entry for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSample {
    /// Band the sample was taken from (`None` for flat data)
    pub percentile: Option<u32>,
    pub points: Vec<DataPoint>,
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub details: String,
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sample: Option<DataSample>,
    #[serde(rename = "type")]
    pub entry_type: AuditEntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_operation: Option<String>,
    /// Milliseconds between the first and last entry of this step
    #[serde(default)]
    pub duration_ms: i64,
}

/// Audit settings shared by every trail of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Attach data samples to entries
    pub sample_data: bool,

    /// Band preferred when sampling
    pub default_percentile: u32,

    /// Maximum points per sample
    pub sample_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sample_data: false,
            default_percentile: 50,
            sample_size: 5,
        }
    }
}

/// Lineage attached to a finished record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAudit {
    pub trail: Vec<AuditEntry>,
    pub applied_multipliers: Vec<AppliedMultiplier>,
    /// Names of the references visible to the source
    pub references: Vec<String>,
}

/// Audit recorder for one source evaluation
#[derive(Debug, Clone)]
pub struct AuditTrail {
    source_id: String,
    config: AuditConfig,
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new(source_id: &str, config: AuditConfig) -> Self {
        Self {
            source_id: source_id.to_string(),
            config,
            entries: Vec::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Append an entry stamped with the current time
    pub fn add_entry(
        &mut self,
        step: &str,
        details: impl Into<String>,
        dependencies: Vec<String>,
        data_sample: Option<DataSample>,
        entry_type: AuditEntryType,
        type_operation: Option<&str>,
    ) {
        self.add_entry_at(
            Utc::now(),
            step,
            details,
            dependencies,
            data_sample,
            entry_type,
            type_operation,
        );
    }

    /// Append an entry with an explicit timestamp
    #[allow(clippy::too_many_arguments)]
    pub fn add_entry_at(
        &mut self,
        timestamp: DateTime<Utc>,
        step: &str,
        details: impl Into<String>,
        dependencies: Vec<String>,
        data_sample: Option<DataSample>,
        entry_type: AuditEntryType,
        type_operation: Option<&str>,
    ) {
        self.entries.push(AuditEntry {
            timestamp,
            step: step.to_string(),
            details: details.into(),
            dependencies,
            data_sample,
            entry_type,
            type_operation: type_operation.map(str::to_string),
            duration_ms: 0,
        });
    }

    /// Raw entries in insertion order, without durations
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order with step durations stamped.
    ///
    /// Entries are grouped by step name; a step entered more than once gets
    /// `last - first` on every entry of the group, single entries get 0.
    pub fn get_trail(&self) -> Vec<AuditEntry> {
        let mut bounds: HashMap<&str, (DateTime<Utc>, DateTime<Utc>, usize)> = HashMap::new();
        for entry in &self.entries {
            bounds
                .entry(entry.step.as_str())
                .and_modify(|(_, last, count)| {
                    *last = entry.timestamp;
                    *count += 1;
                })
                .or_insert((entry.timestamp, entry.timestamp, 1));
        }

        self.entries
            .iter()
            .map(|entry| {
                let mut entry = entry.clone();
                entry.duration_ms = match bounds.get(entry.step.as_str()) {
                    Some(&(first, last, count)) if count > 1 => (last - first).num_milliseconds(),
                    _ => 0,
                };
                entry
            })
            .collect()
    }

    /// Sample a set of bands, if sampling is enabled
    pub fn sample_bands(&self, bands: &[PercentileSeries]) -> Option<DataSample> {
        if !self.config.sample_data {
            return None;
        }
        let band = bands
            .iter()
            .find(|b| b.percentile.value == self.config.default_percentile)
            .or_else(|| bands.first())?;
        Some(DataSample {
            percentile: Some(band.percentile.value),
            points: band.data.iter().take(self.config.sample_size).copied().collect(),
        })
    }

    /// Sample any data shape, if sampling is enabled
    pub fn sample_data(&self, data: &SourceData) -> Option<DataSample> {
        match data {
            SourceData::Flat(points) if self.config.sample_data => Some(DataSample {
                percentile: None,
                points: points.iter().take(self.config.sample_size).copied().collect(),
            }),
            SourceData::Flat(_) => None,
            SourceData::Record(record) => self.sample_bands(&record.bands),
            SourceData::Bands(bands) => self.sample_bands(bands),
        }
    }

    /// Consume the trail into record lineage
    pub fn into_source_audit(
        self,
        applied_multipliers: Vec<AppliedMultiplier>,
        references: Vec<String>,
    ) -> SourceAudit {
        SourceAudit {
            trail: self.get_trail(),
            applied_multipliers,
            references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_duration_spans_repeated_steps() {
        let mut trail = AuditTrail::new("omCost", AuditConfig::default());
        let multiplier = AuditEntryType::Multiplier;
        let extraction = AuditEntryType::Extraction;
        trail.add_entry_at(at(0), "extract", "start", vec![], None, extraction, None);
        trail.add_entry_at(
            at(5),
            "multiplier",
            "escalationRate",
            vec!["escalationRate".into()],
            None,
            multiplier,
            Some("compound"),
        );
        let multiply = Some("multiply");
        trail.add_entry_at(at(12), "multiplier", "leaseShare", vec![], None, multiplier, multiply);
        trail.add_entry_at(at(40), "multiplier", "done", vec![], None, multiplier, None);

        let entries = trail.get_trail();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].duration_ms, 0);
        for entry in &entries[1..] {
            assert_eq!(entry.duration_ms, 35);
        }
        // Raw entries are untouched
        assert!(trail.entries().iter().all(|e| e.duration_ms == 0));
    }

    #[test]
    fn test_add_entry_uses_wall_clock() {
        let before = Utc::now() - Duration::seconds(1);
        let mut trail = AuditTrail::new("x", AuditConfig::default());
        trail.add_entry("step", "details", vec![], None, AuditEntryType::Initialization, None);
        assert!(trail.entries()[0].timestamp >= before);
        assert_eq!(trail.source_id(), "x");
    }

    #[test]
    fn test_sampling_prefers_default_percentile() {
        let config = AuditConfig {
            sample_data: true,
            default_percentile: 50,
            sample_size: 2,
        };
        let trail = AuditTrail::new("x", config);
        let points = vec![DataPoint::new(1, 1.0), DataPoint::new(2, 2.0), DataPoint::new(3, 3.0)];
        let bands = vec![
            PercentileSeries::new("x", 10, points.clone()),
            PercentileSeries::new("x", 50, points.clone()),
        ];

        let sample = trail.sample_bands(&bands).unwrap();
        assert_eq!(sample.percentile, Some(50));
        assert_eq!(sample.points.len(), 2);

        let fallback = trail.sample_bands(&bands[..1]).unwrap();
        assert_eq!(fallback.percentile, Some(10));

        assert!(trail.sample_bands(&[]).is_none());
        let flat = trail.sample_data(&SourceData::Flat(points)).unwrap();
        assert_eq!(flat.percentile, None);
    }

    #[test]
    fn test_sampling_disabled_by_default() {
        let trail = AuditTrail::new("x", AuditConfig::default());
        let bands = vec![PercentileSeries::new("x", 50, vec![DataPoint::new(1, 1.0)])];
        assert!(trail.sample_bands(&bands).is_none());
    }
}
