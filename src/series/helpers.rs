//! Aggregation and utility helpers over percentile time series
//!
//! These are pure functions: they never look at references or at the run
//! state, and every transformer builds on them.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{DataPoint, PercentileSeries, SourceData, SourceRecord, CUSTOM_PERCENTILE};
use crate::registry::{AccountingClass, CashflowType, ProjectPhase, SourceMetadata, SourceType};

/// Percentile used for the custom band when neither the record nor the
/// caller names an alias
pub const MEDIAN_PERCENTILE: u32 = 50;

/// Predicate selection over processed sources
///
/// All set fields must match. `id` also matches fan-out children
/// (`componentFailures` matches `componentFailures.gearbox`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFilter {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub cashflow_type: Option<CashflowType>,
    #[serde(default)]
    pub accounting_classes: Option<Vec<AccountingClass>>,
    #[serde(default)]
    pub project_phase: Option<ProjectPhase>,
}

impl SourceFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn by_class(classes: &[AccountingClass]) -> Self {
        Self {
            accounting_classes: Some(classes.to_vec()),
            ..Default::default()
        }
    }

    pub fn with_cashflow(mut self, cashflow_type: CashflowType) -> Self {
        self.cashflow_type = Some(cashflow_type);
        self
    }

    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude_ids.push(id.into());
        self
    }

    /// Check a source id and its metadata against the filter
    pub fn matches(&self, id: &str, metadata: &SourceMetadata) -> bool {
        if self.exclude_ids.iter().any(|excluded| id_matches(excluded, id)) {
            return false;
        }
        if let Some(wanted) = &self.id {
            if !id_matches(wanted, id) {
                return false;
            }
        }
        if let Some(wanted) = &self.ids {
            if !wanted.iter().any(|w| id_matches(w, id)) {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if metadata.source_type != source_type {
                return false;
            }
        }
        if let Some(cashflow_type) = self.cashflow_type {
            if metadata.cashflow_type != cashflow_type {
                return false;
            }
        }
        if let Some(classes) = &self.accounting_classes {
            if !classes.contains(&metadata.accounting_class) {
                return false;
            }
        }
        if let Some(phase) = self.project_phase {
            if metadata.project_phase != phase {
                return false;
            }
        }
        true
    }
}

fn id_matches(wanted: &str, id: &str) -> bool {
    id == wanted
        || id
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Select processed sources matching a filter, preserving processing order
pub fn filter_sources<'a>(
    records: &'a [SourceRecord],
    filter: &SourceFilter,
) -> Vec<&'a SourceRecord> {
    records
        .iter()
        .filter(|r| filter.matches(&r.id, &r.metadata))
        .collect()
}

/// Reduction applied across sources in [`aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateOperation {
    Sum,
    Subtract,
    Multiply,
    Divide,
}

/// Options for [`aggregate`]
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub operation: AggregateOperation,
    /// Name given to the output bands
    pub name: String,
    /// Percentile that band 0 aliases for records without their own band 0
    pub custom_percentile: Option<u32>,
}

impl AggregateOptions {
    pub fn sum(name: impl Into<String>) -> Self {
        Self {
            operation: AggregateOperation::Sum,
            name: name.into(),
            custom_percentile: None,
        }
    }

    pub fn with_custom_percentile(mut self, custom_percentile: Option<u32>) -> Self {
        self.custom_percentile = custom_percentile;
        self
    }
}

/// Band used for `percentile` when reading `record`.
///
/// Band 0 resolves to the record's own band 0, then its band at `alias`,
/// then its median band. The alias band is often gone already, since only
/// effective percentiles survive normalization.
pub fn band_for(
    record: &SourceRecord,
    percentile: u32,
    alias: Option<u32>,
) -> Option<&PercentileSeries> {
    if percentile == CUSTOM_PERCENTILE {
        record
            .band(CUSTOM_PERCENTILE)
            .or_else(|| alias.and_then(|p| record.band(p)))
            .or_else(|| record.band(MEDIAN_PERCENTILE))
    } else {
        record.band(percentile)
    }
}

/// Per-percentile, year-aligned reduction across several sources.
///
/// Every operation seeds a year's accumulator with the first value observed
/// for that year, then folds the following sources into it. Dividing by zero
/// drops the year from the output.
pub fn aggregate(
    records: &[&SourceRecord],
    percentiles: &[u32],
    options: &AggregateOptions,
) -> Vec<PercentileSeries> {
    let mut output = Vec::with_capacity(percentiles.len());

    for &percentile in percentiles {
        if percentile == CUSTOM_PERCENTILE
            && options.custom_percentile.is_none()
            && !records.iter().any(|r| r.band(CUSTOM_PERCENTILE).is_some())
        {
            continue;
        }

        let mut acc: BTreeMap<i32, f64> = BTreeMap::new();
        let mut dropped: BTreeSet<i32> = BTreeSet::new();
        let mut contributed = false;

        for record in records {
            let Some(band) = band_for(record, percentile, options.custom_percentile) else {
                continue;
            };
            contributed = true;

            for point in &band.data {
                if dropped.contains(&point.year) {
                    continue;
                }
                match acc.entry(point.year) {
                    Entry::Vacant(slot) => {
                        slot.insert(point.value);
                    }
                    Entry::Occupied(mut slot) => match options.operation {
                        AggregateOperation::Sum => *slot.get_mut() += point.value,
                        AggregateOperation::Subtract => *slot.get_mut() -= point.value,
                        AggregateOperation::Multiply => *slot.get_mut() *= point.value,
                        AggregateOperation::Divide => {
                            if point.value == 0.0 {
                                slot.remove();
                                dropped.insert(point.year);
                            } else {
                                *slot.get_mut() /= point.value;
                            }
                        }
                    },
                }
            }
        }

        if contributed {
            output.push(PercentileSeries::from_year_map(&options.name, percentile, &acc));
        }
    }

    output
}

/// Map every value of any supported shape.
///
/// The callback receives `(percentile, year, value, previous)`, where
/// `previous` is the value this call produced for the preceding point of the
/// same band (`None` for the first point). Flat data has no percentile.
pub fn adjust_values<F>(data: SourceData, mut adjust: F) -> SourceData
where
    F: FnMut(Option<u32>, i32, f64, Option<f64>) -> f64,
{
    fn adjust_points<F>(points: &mut [DataPoint], percentile: Option<u32>, adjust: &mut F)
    where
        F: FnMut(Option<u32>, i32, f64, Option<f64>) -> f64,
    {
        let mut previous = None;
        for point in points.iter_mut() {
            point.value = adjust(percentile, point.year, point.value, previous);
            previous = Some(point.value);
        }
    }

    match data {
        SourceData::Record(mut record) => {
            for band in &mut record.bands {
                adjust_points(&mut band.data, Some(band.percentile.value), &mut adjust);
            }
            SourceData::Record(record)
        }
        SourceData::Bands(mut bands) => {
            for band in &mut bands {
                adjust_points(&mut band.data, Some(band.percentile.value), &mut adjust);
            }
            SourceData::Bands(bands)
        }
        SourceData::Flat(mut points) => {
            adjust_points(&mut points, None, &mut adjust);
            SourceData::Flat(points)
        }
    }
}

/// Negate every value in a set of bands
pub fn negate(bands: &[PercentileSeries]) -> Vec<PercentileSeries> {
    bands
        .iter()
        .cloned()
        .map(|mut band| {
            band.data.iter_mut().for_each(|p| p.value = -p.value);
            band
        })
        .collect()
}

/// Broadcast one flat series into an identical band per percentile.
///
/// Percentile 0 is only produced when `custom_percentile` is set, whether or
/// not it appears in `percentiles`.
pub fn normalize(
    points: &[DataPoint],
    percentiles: &[u32],
    name: &str,
    custom_percentile: Option<u32>,
) -> Vec<PercentileSeries> {
    let mut bands: Vec<PercentileSeries> = percentiles
        .iter()
        .filter(|&&p| p != CUSTOM_PERCENTILE || custom_percentile.is_some())
        .map(|&p| PercentileSeries::new(name, p, points.to_vec()))
        .collect();

    if custom_percentile.is_some() && !percentiles.contains(&CUSTOM_PERCENTILE) {
        bands.push(PercentileSeries::new(name, CUSTOM_PERCENTILE, points.to_vec()));
    }

    bands
}

/// Data points for one percentile; empty when the band is absent
pub fn extract_band(bands: &[PercentileSeries], percentile: u32) -> &[DataPoint] {
    bands
        .iter()
        .find(|b| b.percentile.value == percentile)
        .map(|b| b.data.as_slice())
        .unwrap_or(&[])
}

/// Remove every point for which `predicate(year, value, options)` holds
pub fn trim_values<O, P>(data: SourceData, predicate: P, options: &O) -> SourceData
where
    P: Fn(i32, f64, &O) -> bool,
{
    let keep =
        |points: &mut Vec<DataPoint>| points.retain(|p| !predicate(p.year, p.value, options));

    match data {
        SourceData::Record(mut record) => {
            record.bands.iter_mut().for_each(|b| keep(&mut b.data));
            SourceData::Record(record)
        }
        SourceData::Bands(mut bands) => {
            bands.iter_mut().for_each(|b| keep(&mut b.data));
            SourceData::Bands(bands)
        }
        SourceData::Flat(mut points) => {
            keep(&mut points);
            SourceData::Flat(points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceMetadata;

    fn record(id: &str, metadata: SourceMetadata, bands: Vec<PercentileSeries>) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            bands,
            metadata,
            audit: Default::default(),
        }
    }

    fn points(values: &[(i32, f64)]) -> Vec<DataPoint> {
        values.iter().map(|&(y, v)| DataPoint::new(y, v)).collect()
    }

    #[test]
    fn test_sum_with_negation_is_zero() {
        let a = normalize(&points(&[(1, 10.0), (2, -3.5), (3, 1e6)]), &[10, 50, 90], "a", None);
        let b = negate(&a);
        let ra = record("a", SourceMetadata::revenue("A"), a);
        let rb = record("b", SourceMetadata::opex("B"), b);

        let result = aggregate(&[&ra, &rb], &[10, 50, 90], &AggregateOptions::sum("net"));
        assert_eq!(result.len(), 3);
        for band in &result {
            for point in &band.data {
                assert_eq!(point.value, 0.0);
            }
        }
    }

    #[test]
    fn test_aggregate_sums_year_aligned() {
        let a_band = PercentileSeries::new("a", 50, points(&[(1, 100.0), (2, 10.0)]));
        let b_band = PercentileSeries::new("b", 50, points(&[(2, 5.0), (1, 50.0)]));
        let a = record("a", SourceMetadata::revenue("A"), vec![a_band]);
        let b = record("b", SourceMetadata::revenue("B"), vec![b_band]);

        let result = aggregate(&[&a, &b], &[50], &AggregateOptions::sum("total"));
        assert_eq!(result[0].data, points(&[(1, 150.0), (2, 15.0)]));
        assert_eq!(result[0].name, "total");
    }

    #[test]
    fn test_aggregate_seeds_with_first_value() {
        let band = |v: f64| vec![PercentileSeries::new("x", 50, points(&[(1, v)]))];
        let a = record("a", SourceMetadata::metric("A"), band(2.0));
        let b = record("b", SourceMetadata::metric("B"), band(3.0));
        let c = record("c", SourceMetadata::metric("C"), band(4.0));

        let mut options = AggregateOptions::sum("x");
        options.operation = AggregateOperation::Multiply;
        let product = aggregate(&[&a, &b, &c], &[50], &options);
        assert_eq!(product[0].data[0].value, 24.0);

        options.operation = AggregateOperation::Divide;
        let quotient = aggregate(&[&c, &a], &[50], &options);
        assert_eq!(quotient[0].data[0].value, 2.0);

        options.operation = AggregateOperation::Subtract;
        let difference = aggregate(&[&c, &a, &b], &[50], &options);
        assert_eq!(difference[0].data[0].value, -1.0);
    }

    #[test]
    fn test_divide_by_zero_drops_year() {
        let a_band = PercentileSeries::new("a", 50, points(&[(1, 4.0), (2, 4.0)]));
        let b_band = PercentileSeries::new("b", 50, points(&[(1, 0.0), (2, 2.0)]));
        let a = record("a", SourceMetadata::metric("A"), vec![a_band]);
        let b = record("b", SourceMetadata::metric("B"), vec![b_band]);
        let mut options = AggregateOptions::sum("ratio");
        options.operation = AggregateOperation::Divide;

        let result = aggregate(&[&a, &b], &[50], &options);
        assert_eq!(result[0].data, points(&[(2, 2.0)]));
    }

    #[test]
    fn test_aggregate_custom_band_uses_alias() {
        let with_custom = record(
            "a",
            SourceMetadata::revenue("A"),
            vec![
                PercentileSeries::new("a", 50, points(&[(1, 10.0)])),
                PercentileSeries::new("a", 0, points(&[(1, 12.0)])),
            ],
        );
        let without = record(
            "b",
            SourceMetadata::revenue("B"),
            vec![
                PercentileSeries::new("b", 50, points(&[(1, 1.0)])),
                PercentileSeries::new("b", 90, points(&[(1, 2.0)])),
            ],
        );

        let default_alias = aggregate(&[&with_custom, &without], &[0], &AggregateOptions::sum("t"));
        assert_eq!(default_alias[0].data[0].value, 13.0);

        let options = AggregateOptions::sum("t").with_custom_percentile(Some(90));
        let explicit = aggregate(&[&with_custom, &without], &[0], &options);
        assert_eq!(explicit[0].data[0].value, 14.0);

        // Alias band missing on the record: the median stands in
        let options = AggregateOptions::sum("t").with_custom_percentile(Some(75));
        let fallback = aggregate(&[&without], &[0], &options);
        assert_eq!(fallback[0].data[0].value, 1.0);

        // No band 0 anywhere and no alias requested: no custom band
        let none = aggregate(&[&without], &[0, 50], &AggregateOptions::sum("t"));
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].percentile.value, 50);
    }

    #[test]
    fn test_normalize_extract_round_trip() {
        let input = points(&[(3, 1.0), (1, 2.0), (2, 3.0)]);
        let bands = normalize(&input, &[10, 50, 90], "flat", None);
        for p in [10, 50, 90] {
            assert_eq!(extract_band(&bands, p), input.as_slice());
        }
        assert!(extract_band(&bands, 75).is_empty());
    }

    #[test]
    fn test_normalize_adds_custom_band_only_when_requested() {
        let input = points(&[(1, 1.0)]);
        assert_eq!(normalize(&input, &[0, 50], "x", None).len(), 1);
        let with_custom = normalize(&input, &[50], "x", Some(50));
        assert_eq!(with_custom.len(), 2);
        assert_eq!(extract_band(&with_custom, 0), input.as_slice());
    }

    #[test]
    fn test_adjust_values_exposes_previous() {
        let data = SourceData::Flat(points(&[(1, 1.0), (2, 2.0), (3, 3.0)]));
        let cumulative =
            adjust_values(data, |_, _, value, previous| value + previous.unwrap_or(0.0));
        match cumulative {
            SourceData::Flat(p) => assert_eq!(p, points(&[(1, 1.0), (2, 3.0), (3, 6.0)])),
            other => panic!("shape changed: {:?}", other),
        }
    }

    #[test]
    fn test_adjust_values_resets_previous_per_band() {
        let bands = vec![
            PercentileSeries::new("x", 10, points(&[(1, 1.0), (2, 1.0)])),
            PercentileSeries::new("x", 90, points(&[(1, 5.0), (2, 5.0)])),
        ];
        let adjusted = adjust_values(SourceData::Bands(bands), |p, _, value, previous| {
            assert!(p.is_some());
            value + previous.unwrap_or(0.0)
        });
        let bands = adjusted.bands().unwrap();
        assert_eq!(bands[0].data[1].value, 2.0);
        assert_eq!(bands[1].data[0].value, 5.0);
        assert_eq!(bands[1].data[1].value, 10.0);
    }

    #[test]
    fn test_trim_values_with_options() {
        let window = (2, 3);
        let band =
            PercentileSeries::new("x", 50, points(&[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]));
        let outside = |year: i32, _: f64, &(start, end): &(i32, i32)| year < start || year > end;
        let trimmed = trim_values(SourceData::Bands(vec![band]), outside, &window);
        assert_eq!(trimmed.bands().unwrap()[0].data, points(&[(2, 2.0), (3, 3.0)]));
    }

    #[test]
    fn test_filter_sources_by_metadata_and_fan_out_id() {
        let records = vec![
            record("energyRevenue", SourceMetadata::revenue("Energy"), vec![]),
            record("omCost", SourceMetadata::opex("O&M"), vec![]),
            record("componentFailures.gearbox", SourceMetadata::opex("Gearbox"), vec![]),
        ];

        let inflow_filter = SourceFilter::default().with_cashflow(CashflowType::Inflow);
        let inflows = filter_sources(&records, &inflow_filter);
        assert_eq!(inflows.len(), 1);
        assert_eq!(inflows[0].id, "energyRevenue");

        let failures = filter_sources(&records, &SourceFilter::by_id("componentFailures"));
        assert_eq!(failures.len(), 1);

        let opex_filter = SourceFilter::by_class(&[AccountingClass::Opex]).excluding("omCost");
        let opex = filter_sources(&records, &opex_filter);
        assert_eq!(opex.len(), 1);
        assert_eq!(opex[0].id, "componentFailures.gearbox");

        assert!(filter_sources(&records, &SourceFilter::by_id("omCos")).is_empty());
    }
}
