//! Headline metrics per percentile, computed from a finished run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::finance::{calculate_irr, npv};
use crate::references::References;
use crate::series::{band_for, PercentileSeries, SourceRecord};

/// Discount rate used when the `discountRate` reference is absent
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.08;

/// Metrics for one percentile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileSummary {
    pub percentile: u32,
    pub total_revenue: Option<f64>,
    pub total_cost: Option<f64>,
    /// NPV of net cash flow less capex, discounted to the first project year
    pub npv: Option<f64>,
    pub irr: Option<f64>,
    pub min_dscr: Option<f64>,
    pub avg_dscr: Option<f64>,
}

/// Metrics for every percentile of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub discount_rate: f64,
    pub percentiles: Vec<PercentileSummary>,
}

/// Band of `id` for `percentile`; band 0 falls back to the median when the
/// record has no custom band of its own
fn band<'r>(
    records: &'r [SourceRecord],
    id: &str,
    percentile: u32,
) -> Option<&'r PercentileSeries> {
    let record = records.iter().find(|r| r.id == id)?;
    band_for(record, percentile, None)
}

fn band_total(records: &[SourceRecord], id: &str, percentile: u32) -> Option<f64> {
    Some(band(records, id, percentile)?.total())
}

/// Annual project cash flow: net cash flow less capex, with every year from
/// the first to the last present
fn project_cashflows(records: &[SourceRecord], percentile: u32) -> Option<Vec<f64>> {
    let net = band(records, "netCashflow", percentile)?;
    let capex = band(records, "totalCapex", percentile);

    let mut by_year: BTreeMap<i32, f64> = net.year_map();
    if let Some(capex) = capex {
        for point in &capex.data {
            *by_year.entry(point.year).or_insert(0.0) -= point.value;
        }
    }

    let first = *by_year.keys().next()?;
    let last = *by_year.keys().next_back()?;
    Some((first..=last).map(|year| by_year.get(&year).copied().unwrap_or(0.0)).collect())
}

fn dscr_stats(records: &[SourceRecord], percentile: u32) -> (Option<f64>, Option<f64>) {
    let Some(ratios) = band(records, "dscr", percentile) else {
        return (None, None);
    };
    if ratios.data.is_empty() {
        return (None, None);
    }

    let min = ratios.data.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
    let avg = ratios.total() / ratios.data.len() as f64;
    (Some(min), Some(avg))
}

impl PipelineSummary {
    pub fn from_records(
        records: &[SourceRecord],
        percentiles: &[u32],
        references: &References,
    ) -> Self {
        let discount_rate = references.number_or("discountRate", DEFAULT_DISCOUNT_RATE);

        let percentiles = percentiles
            .iter()
            .map(|&percentile| {
                let cashflows = project_cashflows(records, percentile);
                let (min_dscr, avg_dscr) = dscr_stats(records, percentile);
                PercentileSummary {
                    percentile,
                    total_revenue: band_total(records, "totalRevenue", percentile),
                    total_cost: band_total(records, "totalCost", percentile),
                    npv: cashflows.as_deref().map(|cf| npv(discount_rate, cf)),
                    irr: cashflows.as_deref().and_then(calculate_irr),
                    min_dscr,
                    avg_dscr,
                }
            })
            .collect();

        Self {
            discount_rate,
            percentiles,
        }
    }

    pub fn for_percentile(&self, percentile: u32) -> Option<&PercentileSummary> {
        self.percentiles.iter().find(|s| s.percentile == percentile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceMetadata;
    use crate::series::{DataPoint, PercentileSeries};
    use serde_json::json;

    fn record(id: &str, points: &[(i32, f64)]) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            bands: vec![PercentileSeries::new(
                id,
                50,
                points.iter().map(|&(y, v)| DataPoint::new(y, v)).collect(),
            )],
            metadata: SourceMetadata::total(id),
            audit: Default::default(),
        }
    }

    #[test]
    fn test_summary_metrics() {
        let records = vec![
            record("totalCapex", &[(0, 1000.0)]),
            record("totalRevenue", &[(1, 800.0), (2, 800.0)]),
            record("netCashflow", &[(1, 550.0), (2, 550.0)]),
            record("dscr", &[(1, 1.2), (2, 1.6)]),
        ];
        let mut refs = References::new();
        refs.insert("discountRate", json!(0.05));

        let summary = PipelineSummary::from_records(&records, &[50, 90], &refs);
        assert_eq!(summary.discount_rate, 0.05);

        let p50 = summary.for_percentile(50).unwrap();
        assert_eq!(p50.total_revenue, Some(1600.0));
        assert_eq!(p50.total_cost, None);
        let expected_npv = -1000.0 + 550.0 / 1.05 + 550.0 / 1.05_f64.powi(2);
        assert!((p50.npv.unwrap() - expected_npv).abs() < 1e-9);
        assert!(p50.irr.unwrap() > 0.06 && p50.irr.unwrap() < 0.07);
        assert_eq!(p50.min_dscr, Some(1.2));
        assert!((p50.avg_dscr.unwrap() - 1.4).abs() < 1e-12);

        let p90 = summary.for_percentile(90).unwrap();
        assert_eq!(p90.npv, None);
        assert_eq!(p90.irr, None);
    }

    #[test]
    fn test_custom_band_reads_median_capex() {
        let mut net = record("netCashflow", &[(1, 600.0)]);
        net.bands.push(PercentileSeries::new("netCashflow", 0, vec![DataPoint::new(1, 700.0)]));
        let records = vec![record("totalCapex", &[(0, 500.0)]), net];

        let summary = PipelineSummary::from_records(&records, &[0], &References::new());
        let custom = summary.for_percentile(0).unwrap();
        assert_eq!(summary.discount_rate, DEFAULT_DISCOUNT_RATE);
        assert!((custom.npv.unwrap() - (-500.0 + 700.0 / 1.08)).abs() < 1e-9);
    }

    #[test]
    fn test_gaps_are_zero_years() {
        let records = vec![record("netCashflow", &[(1, -100.0), (3, 121.0)])];
        let cashflows = project_cashflows(&records, 50).unwrap();
        assert_eq!(cashflows, vec![-100.0, 0.0, 121.0]);
    }
}
