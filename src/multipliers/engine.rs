//! Folds an ordered multiplier list over the bands of an indirect source

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::lookup::{MultiplierLookup, MultiplierOrigin};
use super::spec::{MultiplierOperation, MultiplierSpec};
use crate::audit::{AuditEntryType, AuditTrail};
use crate::error::MultiplierError;
use crate::references::References;
use crate::series::{PercentileSeries, SourceRecord};

/// What a multiplier can see while it is being resolved
#[derive(Debug, Clone, Copy)]
pub struct MultiplierContext<'a> {
    /// Sources already appended to the run
    pub processed: &'a [SourceRecord],
    /// Merged global and local references
    pub references: &'a References,
    /// Custom percentile configured for the source being built
    pub alias: Option<u32>,
}

/// Lineage of one multiplier that was folded in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMultiplier {
    pub id: String,
    pub operation: MultiplierOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_year: Option<i32>,
    pub origin: MultiplierOrigin,
    /// Points whose value changed
    pub points_adjusted: usize,
}

/// Bands after the fold, plus what was applied and what was dropped
#[derive(Debug, Clone)]
pub struct MultiplierOutcome {
    pub bands: Vec<PercentileSeries>,
    pub applied: Vec<AppliedMultiplier>,
    /// Ids of multipliers whose value could not be resolved
    pub skipped: Vec<String>,
}

/// Find the value supplier for a multiplier: processed sources first, then
/// references
pub fn resolve_lookup(
    spec: &MultiplierSpec,
    ctx: &MultiplierContext<'_>,
) -> Option<(MultiplierLookup, MultiplierOrigin)> {
    if let Some(record) = ctx.processed.iter().find(|r| r.id == spec.id) {
        return Some((MultiplierLookup::from_record(record, ctx.alias), MultiplierOrigin::Source));
    }
    let reference = ctx.references.get(&spec.id)?;
    MultiplierLookup::from_reference(reference, ctx.alias)
        .map(|lookup| (lookup, MultiplierOrigin::Reference))
}

/// Apply `multipliers` strictly in order, each consuming the previous output.
///
/// A multiplier that cannot be resolved is dropped on its own; a non-finite
/// result fails the whole stage.
pub fn apply_multipliers(
    mut bands: Vec<PercentileSeries>,
    multipliers: &[MultiplierSpec],
    ctx: &MultiplierContext<'_>,
    audit: &mut AuditTrail,
) -> Result<MultiplierOutcome, MultiplierError> {
    let mut applied = Vec::with_capacity(multipliers.len());
    let mut skipped = Vec::new();

    for spec in multipliers {
        let Some((lookup, origin)) = resolve_lookup(spec, ctx) else {
            warn!(
                "multiplier `{}` for `{}` did not resolve to a number; skipping it",
                spec.id,
                audit.source_id()
            );
            audit.add_entry(
                "multiplier",
                format!("skipped unresolved multiplier `{}`", spec.id),
                vec![spec.id.clone()],
                None,
                AuditEntryType::Error,
                Some(spec.operation.as_str()),
            );
            skipped.push(spec.id.clone());
            continue;
        };

        let mut points_adjusted = 0;
        for band in &mut bands {
            let percentile = band.percentile.value;
            let first_year = || band.data.iter().map(|p| p.year).min();
            let Some(base_year) = spec.base_year.or_else(first_year) else {
                continue;
            };

            for point in &mut band.data {
                if let Some(filter) = &spec.filter {
                    if !filter.matches(point.year, point.value, percentile) {
                        continue;
                    }
                }
                let Some(m) = lookup.value(point.year, percentile) else {
                    continue;
                };

                let adjusted = spec.operation.apply(point.value, m, point.year, base_year);
                if !adjusted.is_finite() {
                    return Err(MultiplierError::NonFinite {
                        id: spec.id.clone(),
                        year: point.year,
                        percentile,
                    });
                }
                point.value = adjusted;
                points_adjusted += 1;
            }
        }

        debug!(
            "applied {} multiplier `{}` to `{}` ({} points)",
            spec.operation.as_str(),
            spec.id,
            audit.source_id(),
            points_adjusted
        );
        let sample = audit.sample_bands(&bands);
        audit.add_entry(
            "multiplier",
            format!("applied `{}` from {:?} to {} points", spec.id, origin, points_adjusted),
            vec![spec.id.clone()],
            sample,
            AuditEntryType::Multiplier,
            Some(spec.operation.as_str()),
        );
        applied.push(AppliedMultiplier {
            id: spec.id.clone(),
            operation: spec.operation,
            base_year: spec.base_year,
            origin,
            points_adjusted,
        });
    }

    Ok(MultiplierOutcome { bands, applied, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditConfig;
    use crate::multipliers::MultiplierFilter;
    use crate::registry::SourceMetadata;
    use crate::series::DataPoint;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn constant_bands(value: f64, years: std::ops::RangeInclusive<i32>) -> Vec<PercentileSeries> {
        [10, 50, 90]
            .iter()
            .map(|&p| {
                let data = years.clone().map(|y| DataPoint::new(y, value)).collect();
                PercentileSeries::new("x", p, data)
            })
            .collect()
    }

    fn run(
        bands: Vec<PercentileSeries>,
        multipliers: &[MultiplierSpec],
        processed: &[SourceRecord],
        references: &References,
    ) -> Result<MultiplierOutcome, MultiplierError> {
        let ctx = MultiplierContext {
            processed,
            references,
            alias: None,
        };
        let mut audit = AuditTrail::new("test", AuditConfig::default());
        apply_multipliers(bands, multipliers, &ctx, &mut audit)
    }

    #[test]
    fn test_compound_growth_from_base_year() {
        let mut refs = References::new();
        refs.insert("escalationRate", json!(0.03));
        let spec =
            MultiplierSpec::new("escalationRate", MultiplierOperation::Compound).with_base_year(2);

        let outcome = run(constant_bands(250.0, 2..=12), &[spec], &[], &refs).unwrap();
        for band in &outcome.bands {
            for point in &band.data {
                let expected = 250.0 * 1.03_f64.powi(point.year - 2);
                assert_relative_eq!(point.value, expected, max_relative = 1e-12);
            }
        }
        assert_eq!(outcome.applied[0].points_adjusted, 33);
        assert_eq!(outcome.applied[0].origin, MultiplierOrigin::Reference);
    }

    #[test]
    fn test_base_year_defaults_to_first_year() {
        let mut refs = References::new();
        refs.insert("g", json!(0.1));
        let spec = MultiplierSpec::new("g", MultiplierOperation::Simple);

        let outcome = run(constant_bands(100.0, 5..=7), &[spec], &[], &refs).unwrap();
        let values: Vec<f64> = outcome.bands[0].data.iter().map(|p| p.value).collect();
        assert_relative_eq!(values[0], 100.0);
        assert_relative_eq!(values[1], 110.0, max_relative = 1e-12);
        assert_relative_eq!(values[2], 120.0, max_relative = 1e-12);
    }

    #[test]
    fn test_multipliers_apply_in_order() {
        let mut refs = References::new();
        refs.insert("double", json!(2.0));
        refs.insert("plusTen", json!(10.0));

        let multiply_then_add = [
            MultiplierSpec::new("double", MultiplierOperation::Multiply),
            MultiplierSpec::new("plusTen", MultiplierOperation::Summation),
        ];
        let add_then_multiply = [multiply_then_add[1].clone(), multiply_then_add[0].clone()];

        let a = run(constant_bands(1.0, 1..=1), &multiply_then_add, &[], &refs).unwrap();
        let b = run(constant_bands(1.0, 1..=1), &add_then_multiply, &[], &refs).unwrap();
        assert_eq!(a.bands[0].data[0].value, 12.0);
        assert_eq!(b.bands[0].data[0].value, 22.0);
    }

    #[test]
    fn test_unresolved_multiplier_is_skipped_alone() {
        let mut refs = References::new();
        refs.insert("double", json!(2.0));
        refs.insert("label", json!("not a number"));

        let specs = [
            MultiplierSpec::new("missing", MultiplierOperation::Multiply),
            MultiplierSpec::new("label", MultiplierOperation::Multiply),
            MultiplierSpec::new("double", MultiplierOperation::Multiply),
        ];
        let outcome = run(constant_bands(3.0, 1..=2), &specs, &[], &refs).unwrap();
        assert_eq!(outcome.skipped, vec!["missing".to_string(), "label".to_string()]);
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.bands.iter().flat_map(|b| &b.data).all(|p| p.value == 6.0));
    }

    #[test]
    fn test_processed_source_wins_over_reference() {
        let mut refs = References::new();
        refs.insert("availability", json!(0.5));
        let record = SourceRecord {
            id: "availability".into(),
            bands: vec![
                PercentileSeries::new("a", 10, vec![DataPoint::new(1, 0.9)]),
                PercentileSeries::new("a", 50, vec![DataPoint::new(1, 0.95)]),
            ],
            metadata: SourceMetadata::metric("Availability"),
            audit: Default::default(),
        };

        let spec = MultiplierSpec::new("availability", MultiplierOperation::Multiply);
        let outcome = run(constant_bands(100.0, 1..=1), &[spec], &[record], &refs).unwrap();
        assert_relative_eq!(outcome.bands[0].data[0].value, 90.0, max_relative = 1e-12);
        assert_relative_eq!(outcome.bands[1].data[0].value, 95.0, max_relative = 1e-12);
        // P90 has no supplier band and passes through unchanged
        assert_eq!(outcome.bands[2].data[0].value, 100.0);
        assert_eq!(outcome.applied[0].origin, MultiplierOrigin::Source);
    }

    #[test]
    fn test_filter_limits_touched_points() {
        let mut refs = References::new();
        refs.insert("bump", json!(5.0));
        let spec = MultiplierSpec::new("bump", MultiplierOperation::Summation)
            .with_filter(MultiplierFilter::years(2, 3));

        let outcome = run(constant_bands(1.0, 1..=4), &[spec], &[], &refs).unwrap();
        let values: Vec<f64> = outcome.bands[0].data.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 6.0, 6.0, 1.0]);
    }

    #[test]
    fn test_non_finite_result_fails_stage() {
        let mut refs = References::new();
        refs.insert("collapse", json!(-1.0));
        let spec = MultiplierSpec::new("collapse", MultiplierOperation::Compound).with_base_year(5);

        let err = run(constant_bands(1.0, 1..=2), &[spec], &[], &refs).unwrap_err();
        assert!(matches!(err, MultiplierError::NonFinite { year: 1, .. }));
    }
}
