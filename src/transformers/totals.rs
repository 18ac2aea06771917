//! Totals: year-aligned sums over sources selected by metadata

use super::{class_filter, TransformContext, TransformerOutput};
use crate::audit::AuditEntryType;
use crate::error::TransformError;
use crate::registry::{AccountingClass, CashflowType};
use crate::series::{aggregate, negate, AggregateOptions, SourceData, SourceFilter, SourceRecord};

pub(super) fn revenue_filter() -> SourceFilter {
    class_filter(Some(CashflowType::Inflow), &[AccountingClass::Revenue])
}

pub(super) fn cost_filter() -> SourceFilter {
    class_filter(Some(CashflowType::Outflow), &[AccountingClass::Opex, AccountingClass::Reserve])
}

pub(super) fn capex_filter() -> SourceFilter {
    class_filter(None, &[AccountingClass::Capex])
}

pub(super) fn debt_filter() -> SourceFilter {
    class_filter(None, &[AccountingClass::Debt])
}

fn sum_records(ctx: &mut TransformContext<'_>, records: &[&SourceRecord]) -> TransformerOutput {
    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    ctx.add_audit_entry(
        "aggregate",
        format!("summing {} sources", ids.len()),
        ids,
        AuditEntryType::Transformation,
        Some("sum"),
    );

    let options = AggregateOptions::sum(ctx.source_id).with_custom_percentile(ctx.alias());
    TransformerOutput::Bands(aggregate(records, ctx.percentiles, &options))
}

fn sum_matching(ctx: &mut TransformContext<'_>, filter: &SourceFilter) -> TransformerOutput {
    let selected = ctx.select(filter);
    sum_records(ctx, &selected)
}

pub(super) fn total_revenue(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    Ok(sum_matching(ctx, &revenue_filter()))
}

pub(super) fn total_cost(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    Ok(sum_matching(ctx, &cost_filter()))
}

pub(super) fn total_capex(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    Ok(sum_matching(ctx, &capex_filter()))
}

pub(super) fn total_debt(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    Ok(sum_matching(ctx, &debt_filter()))
}

/// Revenue minus cost
pub(super) fn net_cashflow(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let revenue = ctx.require("totalRevenue")?;
    let cost = ctx.require("totalCost")?;

    let negated = SourceRecord {
        bands: negate(&cost.bands),
        ..cost.clone()
    };
    Ok(sum_records(ctx, &[revenue, &negated]))
}

/// Interest plus principal
pub(super) fn debt_service(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let interest = ctx.require("operationalInterest")?;
    let principal = ctx.require("operationalPrincipal")?;
    Ok(sum_records(ctx, &[interest, principal]))
}
