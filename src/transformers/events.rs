//! Event-to-series conversions
//!
//! Fee windows, repair events and reserve targets are configured as lists and
//! converted into annual, probability-weighted cost series. Drawdown
//! schedules spread a total over construction years by percentage.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{TransformContext, TransformerOutput, YEAR_LIMIT};
use crate::audit::AuditEntryType;
use crate::error::TransformError;
use crate::series::{DataPoint, PercentileSeries, SourceData};

fn default_probability() -> f64 {
    1.0
}

/// A recurring fee paid every year of a window, escalated from its first year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFee {
    #[serde(default)]
    pub name: Option<String>,
    pub start_year: i32,
    pub end_year: i32,
    /// Annual amount in the first year of the window
    pub amount: f64,
    /// Falls back to the `escalationRate` reference, then to none
    #[serde(default)]
    pub escalation: Option<f64>,
}

/// A one-off repair that happens with some probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairEvent {
    #[serde(default)]
    pub name: Option<String>,
    pub year: i32,
    pub cost: f64,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

/// A reserve target funded evenly over a range of years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveFund {
    #[serde(default)]
    pub name: Option<String>,
    pub target: f64,
    #[serde(default = "default_probability")]
    pub probability: f64,
    pub start_year: i32,
    pub end_year: i32,
}

/// Share of a total disbursed in one year, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownStep {
    pub year: i32,
    pub percentage: f64,
}

fn invalid(name: &str, reason: String) -> TransformError {
    TransformError::InvalidReference {
        name: name.to_string(),
        reason,
    }
}

fn check_probability(name: &str, probability: f64) -> Result<(), TransformError> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(invalid(name, format!("probability {} is outside [0, 1]", probability)));
    }
    Ok(())
}

/// Years in a fee or reserve window, bounded like any other year reference
fn check_window(name: &str, start_year: i32, end_year: i32) -> Result<u32, TransformError> {
    let bounds = -YEAR_LIMIT..=YEAR_LIMIT;
    if !bounds.contains(&start_year) || !bounds.contains(&end_year) {
        return Err(invalid(
            name,
            format!(
                "window {}..={} is outside -{limit}..={limit}",
                start_year,
                end_year,
                limit = YEAR_LIMIT
            ),
        ));
    }
    if end_year < start_year {
        return Err(invalid(name, format!("window {}..={} is empty", start_year, end_year)));
    }
    Ok(end_year.abs_diff(start_year) + 1)
}

fn to_points(values: BTreeMap<i32, f64>) -> Vec<DataPoint> {
    values
        .into_iter()
        .map(|(year, value)| DataPoint::new(year, value))
        .collect()
}

/// Emit the same series for every output percentile
fn flat_output(
    ctx: &mut TransformContext<'_>,
    reference: &str,
    events: usize,
    values: BTreeMap<i32, f64>,
    operation: &str,
) -> TransformerOutput {
    ctx.add_audit_entry(
        "events",
        format!("converted {} events into {} annual values", events, values.len()),
        vec![reference.to_string()],
        AuditEntryType::Transformation,
        Some(operation),
    );
    TransformerOutput::Bands(ctx.broadcast(&to_points(values)))
}

pub(super) fn contract_fees(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let fees: Vec<ContractFee> = ctx.typed("contractFees")?.unwrap_or_default();
    let default_escalation = ctx.references.number_or("escalationRate", 0.0);

    let mut values = BTreeMap::new();
    for fee in &fees {
        check_window("contractFees", fee.start_year, fee.end_year)?;
        let escalation = fee.escalation.unwrap_or(default_escalation);
        for year in fee.start_year..=fee.end_year {
            let escalated = fee.amount * (1.0 + escalation).powi(year - fee.start_year);
            *values.entry(year).or_insert(0.0) += escalated;
        }
    }

    Ok(flat_output(ctx, "contractFees", fees.len(), values, "escalate"))
}

pub(super) fn major_repairs(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let repairs: Vec<RepairEvent> = ctx.typed("majorRepairs")?.unwrap_or_default();

    let mut values = BTreeMap::new();
    for repair in &repairs {
        check_probability("majorRepairs", repair.probability)?;
        *values.entry(repair.year).or_insert(0.0) += repair.cost * repair.probability;
    }

    Ok(flat_output(ctx, "majorRepairs", repairs.len(), values, "weight"))
}

pub(super) fn reserve_funds(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let funds: Vec<ReserveFund> = ctx.typed("reserveFunds")?.unwrap_or_default();

    let mut values = BTreeMap::new();
    for fund in &funds {
        check_probability("reserveFunds", fund.probability)?;
        let years = check_window("reserveFunds", fund.start_year, fund.end_year)?;
        let annual = fund.target * fund.probability / f64::from(years);
        for year in fund.start_year..=fund.end_year {
            *values.entry(year).or_insert(0.0) += annual;
        }
    }

    Ok(flat_output(ctx, "reserveFunds", funds.len(), values, "spread"))
}

/// Spread each band's total over the schedule years
fn spread_by_schedule(
    ctx: &mut TransformContext<'_>,
    input_id: &str,
    schedule: &[DrawdownStep],
) -> Result<Vec<PercentileSeries>, TransformError> {
    let input = ctx.require(input_id)?;
    let mut bands = Vec::new();
    for &percentile in ctx.percentiles {
        let Some(band) = ctx.input_band(input, percentile) else {
            continue;
        };
        let total = band.total();
        let mut by_year = BTreeMap::new();
        for step in schedule {
            *by_year.entry(step.year).or_insert(0.0) += total * step.percentage / 100.0;
        }
        bands.push(PercentileSeries::from_year_map(ctx.source_id, percentile, &by_year));
    }
    Ok(bands)
}

pub(super) fn capex_drawdown(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let schedule: Vec<DrawdownStep> = ctx
        .typed("capexDrawdownSchedule")?
        .ok_or_else(|| TransformError::MissingReference("capexDrawdownSchedule".into()))?;

    let allocated: f64 = schedule.iter().map(|s| s.percentage).sum();
    if (allocated - 100.0).abs() > 1e-6 {
        warn!(
            "drawdown schedule for `{}` allocates {:.2}% of capex",
            ctx.source_id, allocated
        );
    }

    let bands = spread_by_schedule(ctx, "totalCapex", &schedule)?;
    ctx.add_audit_entry(
        "drawdown",
        format!("{} drawdown years, {:.2}% allocated", schedule.len(), allocated),
        vec!["totalCapex".into(), "capexDrawdownSchedule".into()],
        AuditEntryType::Transformation,
        Some("spread"),
    );
    Ok(TransformerOutput::Bands(bands))
}

/// Debt-funded share of the capex drawdown
pub(super) fn debt_drawdown(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let ratio = ctx.number("debtRatio")?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(invalid("debtRatio", format!("{} is outside [0, 1]", ratio)));
    }
    let capex = ctx.require("capexDrawdown")?;

    let mut bands = Vec::new();
    for &percentile in ctx.percentiles {
        let Some(band) = ctx.input_band(capex, percentile) else {
            continue;
        };
        let data = band
            .data
            .iter()
            .map(|p| DataPoint::new(p.year, p.value * ratio))
            .collect();
        bands.push(PercentileSeries::new(ctx.source_id, percentile, data));
    }

    ctx.add_audit_entry(
        "drawdown",
        format!("debt share {:.4} of capex drawdown", ratio),
        vec!["capexDrawdown".into(), "debtRatio".into()],
        AuditEntryType::Transformation,
        Some("multiply"),
    );
    Ok(TransformerOutput::Bands(bands))
}
