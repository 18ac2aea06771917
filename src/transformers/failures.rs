//! Expected annual failure cost per component
//!
//! Each enabled component becomes its own record, so component costs stay
//! visible individually instead of being folded into one total.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FanOutRecord, TransformContext, TransformerOutput};
use crate::audit::AuditEntryType;
use crate::error::TransformError;
use crate::series::{DataPoint, SourceData};

fn enabled_by_default() -> bool {
    true
}

/// Failure economics of one component type, keyed by component in the
/// `failureRates` reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFailure {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Expected failures per year
    pub failure_rate: f64,
    #[serde(default)]
    pub replacement_cost: f64,
    #[serde(default)]
    pub crane_mobilization: f64,
    #[serde(default)]
    pub crane_daily_rate: f64,
    #[serde(default)]
    pub repair_days: f64,
    #[serde(default)]
    pub labor_cost: f64,
    /// Lost revenue per day out of service
    #[serde(default)]
    pub downtime_per_day: f64,
}

impl ComponentFailure {
    /// Cost of one failure event
    pub fn event_cost(&self) -> f64 {
        self.replacement_cost
            + self.crane_mobilization
            + self.crane_daily_rate * self.repair_days
            + self.labor_cost
            + self.downtime_per_day * self.repair_days
    }

    pub fn expected_annual_cost(&self) -> f64 {
        self.failure_rate * self.event_cost()
    }
}

pub(super) fn component_failures(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let components: BTreeMap<String, ComponentFailure> =
        ctx.typed("failureRates")?.unwrap_or_default();
    let start = ctx.years_or("operationsStartYear", 1)?;
    let project_life = ctx.years("projectLife")?;

    let mut records = Vec::new();
    for (key, component) in components.iter().filter(|(_, c)| c.enabled) {
        if component.failure_rate < 0.0 {
            return Err(TransformError::InvalidReference {
                name: "failureRates".into(),
                reason: format!("component `{}` has a negative failure rate", key),
            });
        }

        let annual = component.expected_annual_cost();
        let points: Vec<DataPoint> = (start..start + project_life)
            .map(|year| DataPoint::new(year, annual))
            .collect();
        records.push(FanOutRecord {
            key: key.clone(),
            name: component.name.clone().unwrap_or_else(|| key.clone()),
            bands: ctx.broadcast(&points),
        });
    }

    ctx.add_audit_entry(
        "components",
        format!("{} of {} components enabled", records.len(), components.len()),
        vec!["failureRates".into(), "projectLife".into()],
        AuditEntryType::Transformation,
        Some("fanOut"),
    );
    Ok(TransformerOutput::FanOut(records))
}
