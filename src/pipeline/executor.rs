//! Pipeline executor: evaluates every source of a registry in order
//!
//! A run is single-threaded and append-only. Each source sees the records
//! appended before it and nothing else; a source that fails at any stage is
//! left out of the output and counted, and the run carries on.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::custom_percentile::{substitute_custom_band, CustomPercentiles, Substitution};
use super::summary::PipelineSummary;
use crate::audit::{AuditConfig, AuditEntry, AuditEntryType, AuditTrail};
use crate::error::{ExtractionError, SourceError, ValidationError};
use crate::multipliers::{apply_multipliers, AppliedMultiplier, MultiplierContext};
use crate::references::{load_references, ReferenceResolver, References};
use crate::registry::{SourceDefinition, SourceMetadata, SourceRegistry};
use crate::series::{normalize, PercentileSeries, SourceData, SourceRecord, CUSTOM_PERCENTILE};
use crate::transformers::{ErosionModel, RainErosionModel, TransformContext, TransformerOutput};

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Percentiles every source is evaluated at
    pub percentiles: Vec<u32>,

    /// Sources whose band 0 should alias a specific percentile
    #[serde(default)]
    pub custom_percentiles: CustomPercentiles,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            percentiles: vec![10, 50, 90],
            custom_percentiles: CustomPercentiles::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_percentiles(mut self, percentiles: Vec<u32>) -> Self {
        self.percentiles = percentiles;
        self
    }

    pub fn with_custom_percentiles(mut self, custom_percentiles: CustomPercentiles) -> Self {
        self.custom_percentiles = custom_percentiles;
        self
    }

    /// Declared percentiles plus band 0 when any custom percentile is set
    pub fn effective_percentiles(&self) -> Vec<u32> {
        self.custom_percentiles.effective_percentiles(&self.percentiles)
    }
}

/// A source (or fan-out record) left out of the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source_id: String,
    pub stage: String,
    pub message: String,
    /// Audit trail up to the failure
    pub trail: Vec<AuditEntry>,
}

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Records appended to the output
    pub processed: usize,
    /// Sources or fan-out records skipped
    pub errors: usize,
    /// References (global and local) that did not resolve
    pub reference_errors: usize,
    /// Individual multipliers dropped because their value did not resolve
    pub skipped_multipliers: usize,
    pub failures: Vec<SourceFailure>,
    pub elapsed_ms: u64,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub sources: Vec<SourceRecord>,
    pub stats: RunStats,
    pub summary: PipelineSummary,
}

impl PipelineOutput {
    pub fn source(&self, id: &str) -> Option<&SourceRecord> {
        self.sources.iter().find(|s| s.id == id)
    }
}

/// Sources in processing order: direct, then indirect, then virtual, each
/// bucket by ascending priority with ties kept in declaration order
pub fn execution_order(sources: &[SourceDefinition]) -> Vec<&SourceDefinition> {
    let mut order: Vec<&SourceDefinition> = sources.iter().collect();
    order.sort_by_key(|s| (s.metadata.source_type.bucket(), s.priority));
    order
}

/// Final shape check of an assembled record
pub fn validate_record(
    record: &SourceRecord,
    effective_percentiles: &[u32],
) -> Result<(), ValidationError> {
    if record.bands.is_empty() {
        return Err(ValidationError::EmptyBands);
    }

    let mut seen = Vec::with_capacity(record.bands.len());
    for band in &record.bands {
        let percentile = band.percentile.value;
        if seen.contains(&percentile) {
            return Err(ValidationError::DuplicatePercentile(percentile));
        }
        if !effective_percentiles.contains(&percentile) {
            return Err(ValidationError::UnexpectedPercentile(percentile));
        }
        if let Some(point) = band.data.iter().find(|p| !p.value.is_finite()) {
            return Err(ValidationError::NonFinite {
                percentile,
                year: point.year,
            });
        }
        seen.push(percentile);
    }
    Ok(())
}

/// Records of one source before validation, plus its lineage
struct Evaluation {
    records: Vec<SourceRecord>,
    applied: Vec<AppliedMultiplier>,
    skipped_multipliers: usize,
}

/// Read-only state shared by every source of a run
struct RunInputs<'r> {
    resolver: &'r dyn ReferenceResolver,
    effective: Vec<u32>,
    custom: &'r CustomPercentiles,
}

/// Evaluates a registry against a configuration tree
#[derive(Clone)]
pub struct PipelineExecutor {
    registry: SourceRegistry,
    erosion_model: Arc<dyn ErosionModel>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("sources", &self.registry.sources.len())
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            erosion_model: Arc::new(RainErosionModel::default()),
        }
    }

    /// Replace the physical model behind `erosionLoss`
    pub fn with_erosion_model(mut self, model: Arc<dyn ErosionModel>) -> Self {
        self.erosion_model = model;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run every source once
    pub fn execute(
        &self,
        resolver: &dyn ReferenceResolver,
        config: &PipelineConfig,
    ) -> PipelineOutput {
        let started = Instant::now();
        let mut stats = RunStats::default();

        let globals = load_references(&self.registry.references, resolver);
        stats.reference_errors += globals.missing.len();
        let globals = globals.references;

        let inputs = RunInputs {
            resolver,
            effective: config.effective_percentiles(),
            custom: &config.custom_percentiles,
        };
        info!(
            "running {} sources at percentiles {:?} ({} global references)",
            self.registry.sources.len(),
            inputs.effective,
            globals.len()
        );

        let mut processed: Vec<SourceRecord> = Vec::with_capacity(self.registry.sources.len());

        for definition in execution_order(&self.registry.sources) {
            let mut audit = AuditTrail::new(&definition.id, config.audit.clone());
            audit.add_entry(
                "initialize",
                format!(
                    "{} source, priority {}",
                    definition.metadata.source_type.as_str(),
                    definition.priority
                ),
                Vec::new(),
                None,
                AuditEntryType::Initialization,
                None,
            );

            let local = load_references(&definition.local_references, resolver);
            stats.reference_errors += local.missing.len();
            let references = globals.merged_with(&local.references);
            audit.add_entry(
                "references",
                format!("{} visible, {} local missing", references.len(), local.missing.len()),
                local.missing.clone(),
                None,
                AuditEntryType::Reference,
                None,
            );

            let evaluated = self.evaluate(definition, &inputs, &references, &processed, &mut audit);
            let evaluation = match evaluated {
                Ok(evaluation) => evaluation,
                Err(err) => {
                    match &err {
                        SourceError::Transform(_) => {
                            error!("source `{}` failed: {}", definition.id, err)
                        }
                        _ => warn!("skipping source `{}`: {}", definition.id, err),
                    }
                    record_failure(&mut stats, &definition.id, &err, audit);
                    continue;
                }
            };
            stats.skipped_multipliers += evaluation.skipped_multipliers;

            let reference_names = references.names();
            for mut record in evaluation.records {
                let mut trail = audit.clone();
                if let Err(err) = validate_record(&record, &inputs.effective) {
                    let err = SourceError::from(err);
                    warn!("skipping source `{}`: {}", record.id, err);
                    record_failure(&mut stats, &record.id, &err, trail);
                    continue;
                }

                trail.add_entry(
                    "validate",
                    format!("{} bands", record.bands.len()),
                    Vec::new(),
                    None,
                    AuditEntryType::Validation,
                    None,
                );
                trail.add_entry(
                    "complete",
                    format!("appended as record {}", processed.len()),
                    Vec::new(),
                    trail.sample_bands(&record.bands),
                    AuditEntryType::Completion,
                    None,
                );
                record.audit =
                    trail.into_source_audit(evaluation.applied.clone(), reference_names.clone());

                debug!("processed `{}` ({} bands)", record.id, record.bands.len());
                processed.push(record);
                stats.processed += 1;
            }
        }

        let summary = PipelineSummary::from_records(&processed, &inputs.effective, &globals);
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "pipeline finished: {} processed, {} errors, {} reference errors in {} ms",
            stats.processed, stats.errors, stats.reference_errors, stats.elapsed_ms
        );

        PipelineOutput {
            sources: processed,
            stats,
            summary,
        }
    }

    /// Extract, substitute, transform and fold multipliers for one source
    fn evaluate(
        &self,
        definition: &SourceDefinition,
        inputs: &RunInputs<'_>,
        references: &References,
        processed: &[SourceRecord],
        audit: &mut AuditTrail,
    ) -> Result<Evaluation, SourceError> {
        if !definition.is_valid_source_type() {
            return Err(SourceError::InvalidDefinition(definition.metadata.source_type.as_str()));
        }

        let display_name = if definition.metadata.name.is_empty() {
            definition.id.as_str()
        } else {
            definition.metadata.name.as_str()
        };
        let alias = inputs.custom.get(&definition.id);

        let mut data = match &definition.path {
            Some(path) => Some(extract(definition, path, display_name, inputs.resolver, audit)?),
            None => None,
        };

        // Band 0 for this source and the percentile it stands for
        let mut custom_percentile = None;
        if let Some(percentile) = alias {
            match data.take() {
                Some(raw) => {
                    let (substituted, outcome) = substitute_custom_band(raw, percentile);
                    data = Some(substituted);
                    match outcome {
                        Substitution::Copied | Substitution::Broadcast => {
                            custom_percentile = Some(percentile);
                            let operation = if outcome == Substitution::Copied {
                                "copy"
                            } else {
                                "broadcast"
                            };
                            audit.add_entry(
                                "customPercentile",
                                format!("band 0 aliases P{}", percentile),
                                Vec::new(),
                                None,
                                AuditEntryType::CustomPercentile,
                                Some(operation),
                            );
                        }
                        Substitution::MissingBand => {
                            warn!(
                                "source `{}` has no P{} band to use as its custom percentile",
                                definition.id, percentile
                            );
                            audit.add_entry(
                                "customPercentile",
                                format!("no P{} band upstream; substitution skipped", percentile),
                                Vec::new(),
                                None,
                                AuditEntryType::Error,
                                None,
                            );
                        }
                    }
                }
                // Transformers read the alias themselves
                None => custom_percentile = Some(percentile),
            }
        }

        let output = match definition.transformer {
            Some(transformer) => {
                let mut ctx = TransformContext {
                    source_id: &definition.id,
                    processed,
                    percentiles: &inputs.effective,
                    references,
                    custom_percentiles: inputs.custom,
                    erosion_model: self.erosion_model.as_ref(),
                    audit: &mut *audit,
                };
                let output = transformer.apply(data.as_ref(), &mut ctx)?;
                audit.add_entry(
                    "transform",
                    format!("applied `{}`", transformer.as_str()),
                    Vec::new(),
                    None,
                    AuditEntryType::Transformation,
                    Some(transformer.as_str()),
                );
                output
            }
            None => {
                // A valid definition without a transformer always has a path
                let raw = data.ok_or_else(|| ExtractionError::Unresolved {
                    path: definition.path_label().unwrap_or_default(),
                })?;
                let keep_custom = custom_percentile.is_some();
                TransformerOutput::Bands(into_bands(
                    raw,
                    &inputs.effective,
                    display_name,
                    keep_custom,
                    custom_percentile,
                ))
            }
        };

        let mut applied = Vec::new();
        let mut skipped_multipliers = 0;
        let multipliers = definition.multipliers.as_deref().unwrap_or_default();
        let context = MultiplierContext {
            processed,
            references,
            alias,
        };
        let mut fold =
            |bands: Vec<PercentileSeries>| -> Result<Vec<PercentileSeries>, SourceError> {
                if multipliers.is_empty() {
                    return Ok(bands);
                }
                let outcome = apply_multipliers(bands, multipliers, &context, audit)?;
                skipped_multipliers += outcome.skipped.len();
                applied.extend(outcome.applied);
                Ok(outcome.bands)
            };

        let mut metadata = definition.metadata.clone();
        metadata.custom_percentile = custom_percentile;

        let records = match output {
            TransformerOutput::Bands(bands) => vec![SourceRecord {
                id: definition.id.clone(),
                bands: fold(bands)?,
                metadata,
                audit: Default::default(),
            }],
            TransformerOutput::FanOut(children) => {
                let mut records = Vec::with_capacity(children.len());
                for child in children {
                    records.push(SourceRecord {
                        id: format!("{}.{}", definition.id, child.key),
                        bands: fold(child.bands)?,
                        metadata: fan_out_metadata(&metadata, &child.key, &child.name),
                        audit: Default::default(),
                    });
                }
                records
            }
        };

        Ok(Evaluation {
            records,
            applied,
            skipped_multipliers,
        })
    }
}

fn fan_out_metadata(parent: &SourceMetadata, key: &str, name: &str) -> SourceMetadata {
    let mut metadata = parent.clone();
    metadata.component = Some(key.to_string());
    metadata.name = if parent.name.is_empty() {
        name.to_string()
    } else {
        format!("{}: {}", parent.name, name)
    };
    metadata
}

/// Pull raw data through the resolver and classify it once
fn extract(
    definition: &SourceDefinition,
    path: &[String],
    name: &str,
    resolver: &dyn ReferenceResolver,
    audit: &mut AuditTrail,
) -> Result<SourceData, ExtractionError> {
    let label = path.join("/");
    let raw = resolver
        .resolve(path)
        .ok_or_else(|| ExtractionError::Unresolved { path: label.clone() })?;
    let data = SourceData::from_json(&raw, name, &label)?;

    match (&data, definition.has_percentiles) {
        (SourceData::Flat(_), true) => {
            return Err(ExtractionError::UnsupportedShape {
                path: label,
                reason: "expected percentile bands, found a flat series".into(),
            })
        }
        (SourceData::Bands(_), false) => {
            return Err(ExtractionError::UnsupportedShape {
                path: label,
                reason: "expected a flat series, found percentile bands".into(),
            })
        }
        _ => {}
    }

    let sample = audit.sample_data(&data);
    audit.add_entry(
        "extract",
        format!("read {}", label),
        vec![label.clone()],
        sample,
        AuditEntryType::Extraction,
        None,
    );
    Ok(data)
}

/// Bands of an extract restricted to the effective percentiles. Band 0 is
/// kept only when it was produced for this source.
fn into_bands(
    data: SourceData,
    effective: &[u32],
    name: &str,
    keep_custom: bool,
    custom_percentile: Option<u32>,
) -> Vec<PercentileSeries> {
    let bands = match data {
        SourceData::Flat(points) => return normalize(&points, effective, name, custom_percentile),
        SourceData::Record(record) => record.bands,
        SourceData::Bands(bands) => bands,
    };

    bands
        .into_iter()
        .filter(|b| match b.percentile.value {
            CUSTOM_PERCENTILE => keep_custom,
            p => effective.contains(&p),
        })
        .collect()
}

fn record_failure(stats: &mut RunStats, source_id: &str, err: &SourceError, mut audit: AuditTrail) {
    audit.add_entry(err.stage(), err.to_string(), Vec::new(), None, AuditEntryType::Error, None);
    stats.errors += 1;
    stats.failures.push(SourceFailure {
        source_id: source_id.to_string(),
        stage: err.stage().to_string(),
        message: err.to_string(),
        trail: audit.get_trail(),
    });
}

/// Run a registry once with a fresh executor
pub fn run_pipeline(
    registry: &SourceRegistry,
    resolver: &dyn ReferenceResolver,
    config: &PipelineConfig,
) -> PipelineOutput {
    PipelineExecutor::new(registry.clone()).execute(resolver, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipliers::{MultiplierOperation, MultiplierSpec};
    use crate::references::ConfigTree;
    use crate::registry::{AccountingClass, SourceType};
    use crate::transformers::TransformerId;
    use serde_json::{json, Value};

    fn band_json(base: f64, years: std::ops::RangeInclusive<i32>, percentiles: &[u32]) -> Value {
        Value::Array(
            percentiles
                .iter()
                .map(|&p| {
                    let data: Vec<Value> = years
                        .clone()
                        .map(|y| json!({"year": y, "value": base * (1.0 + p as f64 / 100.0)}))
                        .collect();
                    json!({"percentile": {"value": p}, "data": data})
                })
                .collect(),
        )
    }

    fn scenario() -> ConfigTree {
        ConfigTree::new(json!({
            "settings": {
                "general": {"projectLife": 5, "operationsStartYear": 1},
                "financing": {
                    "loanDuration": 3,
                    "interestRate": 0.05,
                    "amortizationType": "amortizing",
                    "debtAmount": 1000.0
                },
                "costs": {"escalationRate": 0.02}
            },
            "results": {
                "energyRevenue": band_json(1000.0, 1..=5, &[10, 50, 75, 90]),
                "omCost": band_json(200.0, 1..=5, &[10, 50, 75, 90])
            }
        }))
    }

    fn registry() -> SourceRegistry {
        use crate::references::ReferenceDeclaration;

        let references = vec![
            ReferenceDeclaration::new("projectLife", &["settings", "general", "projectLife"]),
            ReferenceDeclaration::new("interestRate", &["settings", "financing", "interestRate"]),
            ReferenceDeclaration::new("loanDuration", &["settings", "financing", "loanDuration"]),
            ReferenceDeclaration::new("debtAmount", &["settings", "financing", "debtAmount"]),
            ReferenceDeclaration::new("escalationRate", &["settings", "costs", "escalationRate"]),
        ];
        // Declared out of processing order on purpose
        let sources = vec![
            SourceDefinition::derived(
                "netCashflow",
                20,
                TransformerId::NetCashflow,
                SourceMetadata::total("Net"),
            ),
            SourceDefinition::derived(
                "totalRevenue",
                10,
                TransformerId::TotalRevenue,
                SourceMetadata::total("Revenue"),
            ),
            SourceDefinition::derived(
                "totalCost",
                10,
                TransformerId::TotalCost,
                SourceMetadata::total("Cost"),
            ),
            SourceDefinition::indirect(
                "omCost",
                1,
                &["results", "omCost"],
                vec![
                    MultiplierSpec::new("escalationRate", MultiplierOperation::Compound)
                        .with_base_year(1),
                ],
                SourceMetadata::opex("O&M"),
            )
            .with_percentiles(),
            SourceDefinition::direct(
                "energyRevenue",
                1,
                &["results", "energyRevenue"],
                SourceMetadata::revenue("Energy"),
            )
            .with_percentiles(),
        ];
        SourceRegistry::new(references, sources)
    }

    #[test]
    fn test_virtual_sources_run_last() {
        let registry = registry();
        let order: Vec<&str> =
            execution_order(&registry.sources).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            order,
            vec!["energyRevenue", "omCost", "totalRevenue", "totalCost", "netCashflow"]
        );

        let output = run_pipeline(&registry, &scenario(), &PipelineConfig::default());
        let ids: Vec<&str> = output.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, order);
        assert_eq!(output.stats.processed, 5);
        assert_eq!(output.stats.errors, 0);
    }

    #[test]
    fn test_net_cashflow_values() {
        let output = run_pipeline(&registry(), &scenario(), &PipelineConfig::default());
        let net = output.source("netCashflow").unwrap();
        let p50 = net.band(50).unwrap();

        // Revenue 1500, O&M 300 escalated 2% a year from year 1
        let expected_year_3 = 1500.0 - 300.0 * 1.02_f64.powi(2);
        assert!((p50.value_at(3).unwrap() - expected_year_3).abs() < 1e-9);
        assert_eq!(net.metadata.source_type, SourceType::Virtual);
    }

    #[test]
    fn test_custom_percentile_band_zero() {
        let config = PipelineConfig::default()
            .with_custom_percentiles(CustomPercentiles::new().with("energyRevenue", 75));
        let output = run_pipeline(&registry(), &scenario(), &config);

        let revenue = output.source("energyRevenue").unwrap();
        assert_eq!(revenue.percentiles(), vec![10, 50, 90, 0]);
        assert_eq!(revenue.band(0).unwrap().data, revenue_p75());
        assert_eq!(revenue.metadata.custom_percentile, Some(75));

        // No custom entry for omCost: no band 0 of its own
        let om = output.source("omCost").unwrap();
        assert_eq!(om.percentiles(), vec![10, 50, 90]);

        // Totals carry band 0: revenue at P75, costs at their median
        let total = output.source("totalRevenue").unwrap();
        assert_eq!(total.band(0).unwrap().value_at(1), Some(1750.0));
        let net = output.source("netCashflow").unwrap();
        let expected = 1750.0 - 300.0;
        assert!((net.band(0).unwrap().value_at(1).unwrap() - expected).abs() < 1e-9);
    }

    fn revenue_p75() -> Vec<crate::series::DataPoint> {
        (1..=5).map(|y| crate::series::DataPoint::new(y, 1750.0)).collect()
    }

    #[test]
    fn test_runs_are_idempotent() {
        let config = PipelineConfig::default()
            .with_custom_percentiles(CustomPercentiles::new().with("energyRevenue", 75));
        let first = run_pipeline(&registry(), &scenario(), &config);
        let second = run_pipeline(&registry(), &scenario(), &config);

        assert_eq!(first.sources.len(), second.sources.len());
        for (a, b) in first.sources.iter().zip(&second.sources) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.bands, b.bands);
        }
    }

    #[test]
    fn test_failing_source_does_not_abort_run() {
        let mut registry = registry();
        registry.sources.push(
            SourceDefinition::direct(
                "missing",
                2,
                &["results", "nowhere"],
                SourceMetadata::revenue("Missing"),
            )
            .with_percentiles(),
        );
        // Virtual shape with a path is invalid
        let mut broken = SourceDefinition::derived(
            "broken",
            1,
            TransformerId::TotalCost,
            SourceMetadata::total("Broken"),
        );
        broken.path = Some(vec!["results".into()]);
        registry.sources.push(broken);

        let output = run_pipeline(&registry, &scenario(), &PipelineConfig::default());
        assert_eq!(output.stats.processed, 5);
        assert_eq!(output.stats.errors, 2);
        let stages: Vec<&str> = output.stats.failures.iter().map(|f| f.stage.as_str()).collect();
        assert_eq!(stages, vec!["extraction", "definition"]);
        assert!(output.source("missing").is_none());
        assert!(!output.stats.failures[0].trail.is_empty());
    }

    #[test]
    fn test_missing_multiplier_keeps_source() {
        let mut registry = registry();
        if let Some(om) = registry.sources.iter_mut().find(|s| s.id == "omCost") {
            om.multipliers
                .get_or_insert_with(Vec::new)
                .push(MultiplierSpec::new("notConfigured", MultiplierOperation::Multiply));
        }

        let output = run_pipeline(&registry, &scenario(), &PipelineConfig::default());
        let om = output.source("omCost").unwrap();
        assert_eq!(output.stats.skipped_multipliers, 1);
        assert_eq!(om.audit.applied_multipliers.len(), 1);
        assert_eq!(om.audit.applied_multipliers[0].id, "escalationRate");
    }

    #[test]
    fn test_custom_band_takes_source_multiplier() {
        let tree = ConfigTree::new(json!({
            "results": {
                "priceIndex": band_json(100.0, 1..=2, &[10, 50, 75, 90]),
                "omCost": band_json(1000.0, 1..=2, &[10, 50, 75, 90])
            }
        }));
        let registry = SourceRegistry::new(
            Vec::new(),
            vec![
                SourceDefinition::direct(
                    "priceIndex",
                    1,
                    &["results", "priceIndex"],
                    SourceMetadata::metric("Index"),
                )
                .with_percentiles(),
                SourceDefinition::indirect(
                    "omCost",
                    1,
                    &["results", "omCost"],
                    vec![MultiplierSpec::new("priceIndex", MultiplierOperation::Multiply)],
                    SourceMetadata::opex("O&M"),
                )
                .with_percentiles(),
            ],
        );
        let custom = CustomPercentiles::new().with("omCost", 75);
        let config = PipelineConfig::default().with_custom_percentiles(custom);

        let output = run_pipeline(&registry, &tree, &config);
        let om = output.source("omCost").unwrap();
        assert_eq!(om.percentiles(), vec![10, 50, 90, 0]);
        assert_eq!(output.stats.skipped_multipliers, 0);

        // priceIndex carries no P75 after normalization, so band 0 is scaled
        // by its median: raw P75 1750 times index P50 150
        let custom = om.band(0).unwrap();
        assert!(custom.data.iter().all(|p| (p.value - 1750.0 * 150.0).abs() < 1e-6));
        let p50 = om.band(50).unwrap();
        assert!(p50.data.iter().all(|p| (p.value - 1500.0 * 150.0).abs() < 1e-6));
    }

    #[test]
    fn test_shape_mismatch_is_an_extraction_error() {
        let mut registry = registry();
        registry.sources.push(SourceDefinition::direct(
            "flatRevenue",
            3,
            &["results", "energyRevenue"],
            SourceMetadata::revenue("Flat").with_class(AccountingClass::Revenue),
        ));

        let output = run_pipeline(&registry, &scenario(), &PipelineConfig::default());
        assert!(output.source("flatRevenue").is_none());
        assert_eq!(output.stats.failures[0].stage, "extraction");
    }

    #[test]
    fn test_flat_extract_is_broadcast() {
        let tree = ConfigTree::new(json!({
            "schedule": [{"year": 1, "value": 10.0}, {"year": 2, "value": 12.0}]
        }));
        let registry = SourceRegistry::new(
            Vec::new(),
            vec![SourceDefinition::direct(
                "insurance",
                1,
                &["schedule"],
                SourceMetadata::opex("Insurance"),
            )],
        );
        let custom = CustomPercentiles::new().with("insurance", 90);
        let config = PipelineConfig::default().with_custom_percentiles(custom);

        let output = run_pipeline(&registry, &tree, &config);
        let record = output.source("insurance").unwrap();
        assert_eq!(record.percentiles(), vec![10, 50, 90, 0]);
        assert!(record.bands.iter().all(|b| b.data == record.bands[0].data));
    }

    #[test]
    fn test_validate_record() {
        let mut record = SourceRecord {
            id: "x".into(),
            bands: Vec::new(),
            metadata: SourceMetadata::metric("x"),
            audit: Default::default(),
        };
        assert_eq!(validate_record(&record, &[50]), Err(ValidationError::EmptyBands));

        record.bands = vec![
            PercentileSeries::new("x", 50, vec![]),
            PercentileSeries::new("x", 50, vec![]),
        ];
        assert_eq!(validate_record(&record, &[50]), Err(ValidationError::DuplicatePercentile(50)));

        record.bands = vec![PercentileSeries::new("x", 0, vec![])];
        assert_eq!(validate_record(&record, &[50]), Err(ValidationError::UnexpectedPercentile(0)));

        record.bands = vec![PercentileSeries::new(
            "x",
            50,
            vec![crate::series::DataPoint::new(3, f64::NAN)],
        )];
        assert_eq!(
            validate_record(&record, &[50]),
            Err(ValidationError::NonFinite { percentile: 50, year: 3 })
        );
    }
}
