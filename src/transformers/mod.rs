//! Transformer library
//!
//! Named financial derivations that turn previously processed sources and
//! references into new percentile bands. Each transformer is a plain function
//! with the [`TransformerFn`] signature; [`TransformerId`] maps registry names
//! onto them with an exhaustive `match`, so an unknown name fails when the
//! registry is parsed rather than during a run.

mod debt;
mod erosion;
mod events;
mod failures;
mod totals;

pub use debt::{AmortizationKind, DebtSchedule, LoanTerms};
pub use erosion::{ErosionModel, RainErosionModel, PRECIPITATION_SOURCE, WIND_SPEED_SOURCE};
pub use events::{ContractFee, DrawdownStep, RepairEvent, ReserveFund};
pub use failures::ComponentFailure;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntryType, AuditTrail};
use crate::error::TransformError;
use crate::pipeline::CustomPercentiles;
use crate::references::References;
use crate::registry::{AccountingClass, CashflowType};
use crate::series::{
    band_for, filter_sources, normalize, DataPoint, PercentileSeries, SourceData, SourceFilter,
    SourceRecord, CUSTOM_PERCENTILE,
};

/// Signature shared by every transformer
pub type TransformerFn =
    fn(Option<&SourceData>, &mut TransformContext<'_>) -> Result<TransformerOutput, TransformError>;

/// Registry name of a transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformerId {
    TotalRevenue,
    TotalCost,
    TotalCapex,
    TotalDebt,
    NetCashflow,
    ConstructionInterest,
    OperationalPrincipal,
    OperationalInterest,
    DebtService,
    Dscr,
    ContractFees,
    MajorRepairs,
    ReserveFunds,
    CapexDrawdown,
    DebtDrawdown,
    ComponentFailures,
    ErosionLoss,
}

/// Something a transformer reads from the processed sources
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// A source that must have been processed
    Source(&'static str),
    /// A source that is read when present; a reference can stand in for it
    Optional(&'static str),
    /// Every source selected by the filter
    Matching(SourceFilter),
}

impl TransformerId {
    pub const ALL: [TransformerId; 17] = [
        TransformerId::TotalRevenue,
        TransformerId::TotalCost,
        TransformerId::TotalCapex,
        TransformerId::TotalDebt,
        TransformerId::NetCashflow,
        TransformerId::ConstructionInterest,
        TransformerId::OperationalPrincipal,
        TransformerId::OperationalInterest,
        TransformerId::DebtService,
        TransformerId::Dscr,
        TransformerId::ContractFees,
        TransformerId::MajorRepairs,
        TransformerId::ReserveFunds,
        TransformerId::CapexDrawdown,
        TransformerId::DebtDrawdown,
        TransformerId::ComponentFailures,
        TransformerId::ErosionLoss,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransformerId::TotalRevenue => "totalRevenue",
            TransformerId::TotalCost => "totalCost",
            TransformerId::TotalCapex => "totalCapex",
            TransformerId::TotalDebt => "totalDebt",
            TransformerId::NetCashflow => "netCashflow",
            TransformerId::ConstructionInterest => "constructionInterest",
            TransformerId::OperationalPrincipal => "operationalPrincipal",
            TransformerId::OperationalInterest => "operationalInterest",
            TransformerId::DebtService => "debtService",
            TransformerId::Dscr => "dscr",
            TransformerId::ContractFees => "contractFees",
            TransformerId::MajorRepairs => "majorRepairs",
            TransformerId::ReserveFunds => "reserveFunds",
            TransformerId::CapexDrawdown => "capexDrawdown",
            TransformerId::DebtDrawdown => "debtDrawdown",
            TransformerId::ComponentFailures => "componentFailures",
            TransformerId::ErosionLoss => "erosionLoss",
        }
    }

    /// The function implementing this transformer
    pub fn function(self) -> TransformerFn {
        match self {
            TransformerId::TotalRevenue => totals::total_revenue,
            TransformerId::TotalCost => totals::total_cost,
            TransformerId::TotalCapex => totals::total_capex,
            TransformerId::TotalDebt => totals::total_debt,
            TransformerId::NetCashflow => totals::net_cashflow,
            TransformerId::ConstructionInterest => debt::construction_interest,
            TransformerId::OperationalPrincipal => debt::operational_principal,
            TransformerId::OperationalInterest => debt::operational_interest,
            TransformerId::DebtService => totals::debt_service,
            TransformerId::Dscr => debt::dscr,
            TransformerId::ContractFees => events::contract_fees,
            TransformerId::MajorRepairs => events::major_repairs,
            TransformerId::ReserveFunds => events::reserve_funds,
            TransformerId::CapexDrawdown => events::capex_drawdown,
            TransformerId::DebtDrawdown => events::debt_drawdown,
            TransformerId::ComponentFailures => failures::component_failures,
            TransformerId::ErosionLoss => erosion::erosion_loss,
        }
    }

    pub fn apply(
        self,
        data: Option<&SourceData>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformerOutput, TransformError> {
        (self.function())(data, ctx)
    }

    /// Processed sources this transformer reads
    pub fn dependencies(self) -> Vec<Dependency> {
        match self {
            TransformerId::TotalRevenue => vec![Dependency::Matching(totals::revenue_filter())],
            TransformerId::TotalCost => vec![Dependency::Matching(totals::cost_filter())],
            TransformerId::TotalCapex => vec![Dependency::Matching(totals::capex_filter())],
            TransformerId::TotalDebt => vec![Dependency::Matching(totals::debt_filter())],
            TransformerId::NetCashflow => {
                vec![Dependency::Source("totalRevenue"), Dependency::Source("totalCost")]
            }
            TransformerId::ConstructionInterest => vec![Dependency::Source("totalDebt")],
            TransformerId::OperationalPrincipal | TransformerId::OperationalInterest => {
                vec![Dependency::Optional("totalDebt")]
            }
            TransformerId::DebtService => vec![
                Dependency::Source("operationalInterest"),
                Dependency::Source("operationalPrincipal"),
            ],
            TransformerId::Dscr => {
                vec![Dependency::Source("netCashflow"), Dependency::Source("debtService")]
            }
            TransformerId::CapexDrawdown => vec![Dependency::Source("totalCapex")],
            TransformerId::DebtDrawdown => vec![Dependency::Source("capexDrawdown")],
            TransformerId::ErosionLoss => vec![
                Dependency::Source(PRECIPITATION_SOURCE),
                Dependency::Source(WIND_SPEED_SOURCE),
            ],
            TransformerId::ContractFees
            | TransformerId::MajorRepairs
            | TransformerId::ReserveFunds
            | TransformerId::ComponentFailures => Vec::new(),
        }
    }
}

/// One record of a fan-out transformer, keyed by component
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutRecord {
    pub key: String,
    pub name: String,
    pub bands: Vec<PercentileSeries>,
}

/// What a transformer produced
#[derive(Debug, Clone, PartialEq)]
pub enum TransformerOutput {
    /// Bands of the source itself
    Bands(Vec<PercentileSeries>),
    /// One record per component instead of the source itself
    FanOut(Vec<FanOutRecord>),
}

/// Everything a transformer may read, plus the audit trail it writes to
pub struct TransformContext<'a> {
    pub source_id: &'a str,
    /// Records appended so far in this run, read-only
    pub processed: &'a [SourceRecord],
    /// Effective percentiles of the run (band 0 included when any custom
    /// percentile is configured)
    pub percentiles: &'a [u32],
    /// Global references merged with the source's local ones
    pub references: &'a References,
    pub custom_percentiles: &'a CustomPercentiles,
    pub erosion_model: &'a dyn ErosionModel,
    pub audit: &'a mut AuditTrail,
}

impl<'a> TransformContext<'a> {
    pub fn add_audit_entry(
        &mut self,
        step: &str,
        details: impl Into<String>,
        dependencies: Vec<String>,
        entry_type: AuditEntryType,
        type_operation: Option<&str>,
    ) {
        self.audit
            .add_entry(step, details, dependencies, None, entry_type, type_operation);
    }

    /// Custom percentile configured for the source being built
    pub fn alias(&self) -> Option<u32> {
        self.custom_percentiles.get(self.source_id)
    }

    pub fn find(&self, id: &str) -> Option<&'a SourceRecord> {
        self.processed.iter().find(|r| r.id == id)
    }

    /// Like [`find`](Self::find), but a missing source is an error
    pub fn require(&self, id: &str) -> Result<&'a SourceRecord, TransformError> {
        self.find(id)
            .ok_or_else(|| TransformError::MissingDependency(id.to_string()))
    }

    /// Processed sources matching a filter, never the source itself
    pub fn select(&self, filter: &SourceFilter) -> Vec<&'a SourceRecord> {
        let filter = filter.clone().excluding(self.source_id);
        filter_sources(self.processed, &filter)
    }

    /// Percentiles a reference-driven transformer emits: band 0 only when
    /// this source has a custom percentile of its own
    pub fn output_percentiles(&self) -> Vec<u32> {
        let alias = self.alias();
        self.percentiles
            .iter()
            .copied()
            .filter(|&p| p != CUSTOM_PERCENTILE || alias.is_some())
            .collect()
    }

    /// Band of an input record to read for `percentile`.
    ///
    /// Band 0 comes from the input's own band 0, or from the alias band when
    /// this source has a custom percentile; otherwise it is not produced.
    pub fn input_band<'r>(
        &self,
        record: &'r SourceRecord,
        percentile: u32,
    ) -> Option<&'r PercentileSeries> {
        let alias = self.alias();
        let own_custom = record.band(CUSTOM_PERCENTILE).is_some();
        if percentile == CUSTOM_PERCENTILE && alias.is_none() && !own_custom {
            return None;
        }
        band_for(record, percentile, alias)
    }

    /// Same points in every output band
    pub fn broadcast(&self, points: &[DataPoint]) -> Vec<PercentileSeries> {
        let percentiles = self.output_percentiles();
        normalize(points, &percentiles, self.source_id, self.alias())
    }

    /// Required numeric reference
    pub fn number(&self, name: &str) -> Result<f64, TransformError> {
        self.references
            .number(name)
            .ok_or_else(|| TransformError::MissingReference(name.to_string()))
    }

    /// Required whole-year reference (a duration, a year index)
    pub fn years(&self, name: &str) -> Result<i32, TransformError> {
        whole_years(name, self.number(name)?)
    }

    /// Optional whole-year reference with a default
    pub fn years_or(&self, name: &str, default: i32) -> Result<i32, TransformError> {
        match self.references.number(name) {
            Some(value) => whole_years(name, value),
            None => Ok(default),
        }
    }

    /// Structured reference deserialized into `T`; `None` when absent
    pub fn typed<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, TransformError> {
        self.references
            .typed(name)
            .map_err(|e| TransformError::InvalidReference {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Largest year index or duration, in either direction, a reference may carry
pub(super) const YEAR_LIMIT: i32 = 10_000;

fn whole_years(name: &str, value: f64) -> Result<i32, TransformError> {
    if value.fract() != 0.0 || value.abs() > f64::from(YEAR_LIMIT) {
        return Err(TransformError::InvalidReference {
            name: name.to_string(),
            reason: format!("expected a whole number of years, found {}", value),
        });
    }
    Ok(value as i32)
}

/// Revenue and cost classes used by the totals, exposed for callers building
/// their own filters
pub fn class_filter(
    cashflow_type: Option<CashflowType>,
    classes: &[AccountingClass],
) -> SourceFilter {
    let filter = SourceFilter::by_class(classes);
    match cashflow_type {
        Some(cashflow_type) => filter.with_cashflow(cashflow_type),
        None => filter,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for transformer tests

    use super::*;
    use crate::audit::AuditConfig;
    use crate::registry::SourceMetadata;

    pub fn record(
        id: &str,
        metadata: SourceMetadata,
        bands: &[(u32, &[(i32, f64)])],
    ) -> SourceRecord {
        SourceRecord {
            id: id.to_string(),
            bands: bands
                .iter()
                .map(|(p, points)| {
                    let data = points.iter().map(|&(y, v)| DataPoint::new(y, v)).collect();
                    PercentileSeries::new(id, *p, data)
                })
                .collect(),
            metadata,
            audit: Default::default(),
        }
    }

    /// Run one transformer against a snapshot
    pub fn run(
        id: TransformerId,
        source_id: &str,
        processed: &[SourceRecord],
        percentiles: &[u32],
        references: &References,
        custom: &CustomPercentiles,
    ) -> Result<TransformerOutput, TransformError> {
        let model = RainErosionModel::default();
        let mut audit = AuditTrail::new(source_id, AuditConfig::default());
        let mut ctx = TransformContext {
            source_id,
            processed,
            percentiles,
            references,
            custom_percentiles: custom,
            erosion_model: &model,
            audit: &mut audit,
        };
        id.apply(None, &mut ctx)
    }

    pub fn bands(output: TransformerOutput) -> Vec<PercentileSeries> {
        match output {
            TransformerOutput::Bands(bands) => bands,
            TransformerOutput::FanOut(_) => panic!("expected bands, got a fan-out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for id in TransformerId::ALL {
            let json = serde_json::to_value(id).unwrap();
            assert_eq!(json, serde_json::Value::String(id.as_str().to_string()));
        }
    }

    #[test]
    fn test_input_band_band_zero_rules() {
        use crate::audit::AuditConfig;
        use crate::registry::SourceMetadata;

        let input = test_support::record(
            "x",
            SourceMetadata::metric("x"),
            &[(50, &[(1, 5.0)]), (90, &[(1, 9.0)])],
        );
        let references = References::new();
        let model = RainErosionModel::default();
        let mut audit = AuditTrail::new("y", AuditConfig::default());

        let none = CustomPercentiles::new().with("other", 90);
        let ctx = TransformContext {
            source_id: "y",
            processed: &[],
            percentiles: &[50, 90, 0],
            references: &references,
            custom_percentiles: &none,
            erosion_model: &model,
            audit: &mut audit,
        };
        assert!(ctx.input_band(&input, 0).is_none());
        assert_eq!(ctx.output_percentiles(), vec![50, 90]);

        let aliased = CustomPercentiles::new().with("y", 90);
        let mut audit = AuditTrail::new("y", AuditConfig::default());
        let ctx = TransformContext {
            custom_percentiles: &aliased,
            audit: &mut audit,
            ..ctx
        };
        assert_eq!(ctx.input_band(&input, 0).unwrap().value_at(1), Some(9.0));
        assert_eq!(ctx.output_percentiles(), vec![50, 90, 0]);
    }

    #[test]
    fn test_whole_years() {
        assert_eq!(whole_years("loanDuration", 10.0).unwrap(), 10);
        assert!(whole_years("loanDuration", 10.5).is_err());
    }
}
