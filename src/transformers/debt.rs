//! Debt schedules: construction interest, operational repayment and DSCR
//!
//! Years are project year indices. Operations start at
//! `operationsStartYear` (default 1); repayment begins after `gracePeriod`
//! interest-only years and the loan matures at
//! `start - 1 + min(grace + loanDuration, projectLife)`.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{TransformContext, TransformerOutput};
use crate::audit::AuditEntryType;
use crate::error::TransformError;
use crate::finance::annuity_payment;
use crate::series::{DataPoint, PercentileSeries, SourceData};

/// Repayment profile of the operational loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmortizationKind {
    /// Level annuity payments
    #[default]
    Amortizing,
    /// Interest only, principal repaid in full at maturity
    Bullet,
}

impl AmortizationKind {
    /// Anything other than `"bullet"` amortizes
    pub fn parse(text: Option<&str>) -> Self {
        match text {
            Some(t) if t.trim().eq_ignore_ascii_case("bullet") => AmortizationKind::Bullet,
            _ => AmortizationKind::Amortizing,
        }
    }
}

/// Terms of the operational loan for one percentile
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub principal: f64,
    pub rate: f64,
    pub start_year: i32,
    pub grace_years: i32,
    pub duration: i32,
    pub project_life: i32,
    pub kind: AmortizationKind,
}

/// Interest and principal flows of one loan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebtSchedule {
    pub interest: Vec<DataPoint>,
    pub principal: Vec<DataPoint>,
}

impl LoanTerms {
    /// Read the loan references; `principal` is filled in per percentile
    pub fn from_context(
        ctx: &TransformContext<'_>,
        principal: f64,
    ) -> Result<Self, TransformError> {
        let terms = Self {
            principal,
            rate: ctx.number("interestRate")?,
            start_year: ctx.years_or("operationsStartYear", 1)?,
            grace_years: ctx.years_or("gracePeriod", 0)?,
            duration: ctx.years("loanDuration")?,
            project_life: ctx.years("projectLife")?,
            kind: AmortizationKind::parse(ctx.references.text("amortizationType")),
        };

        if terms.duration <= 0 {
            return Err(TransformError::InvalidReference {
                name: "loanDuration".into(),
                reason: format!("must be positive, found {}", terms.duration),
            });
        }
        if terms.grace_years < 0 {
            return Err(TransformError::InvalidReference {
                name: "gracePeriod".into(),
                reason: format!("must not be negative, found {}", terms.grace_years),
            });
        }
        Ok(terms)
    }

    /// Last year with a debt flow
    pub fn maturity(&self) -> i32 {
        self.start_year - 1 + (self.grace_years + self.duration).min(self.project_life)
    }

    /// First year principal is repaid on an amortizing loan
    pub fn repayment_start(&self) -> i32 {
        self.start_year + self.grace_years
    }

    pub fn schedule(&self) -> DebtSchedule {
        match self.kind {
            AmortizationKind::Bullet => self.bullet_schedule(),
            AmortizationKind::Amortizing => self.amortizing_schedule(),
        }
    }

    fn bullet_schedule(&self) -> DebtSchedule {
        let maturity = self.maturity();
        if maturity < self.start_year {
            return DebtSchedule::default();
        }
        DebtSchedule {
            interest: (self.start_year..=maturity)
                .map(|year| DataPoint::new(year, self.principal * self.rate))
                .collect(),
            principal: vec![DataPoint::new(maturity, self.principal)],
        }
    }

    fn amortizing_schedule(&self) -> DebtSchedule {
        let maturity = self.maturity();
        let repayment_start = self.repayment_start();
        let payment = annuity_payment(self.principal, self.rate, self.duration as u32);

        let mut schedule = DebtSchedule::default();
        let mut balance = self.principal;

        for year in self.start_year..=maturity {
            let interest = balance * self.rate;
            schedule.interest.push(DataPoint::new(year, interest));

            if year < repayment_start {
                continue;
            }
            // The final year repays whatever is left, which also covers a
            // loan cut short by the project life
            let principal = if year == maturity {
                balance
            } else {
                (payment - interest).min(balance)
            };
            schedule.principal.push(DataPoint::new(year, principal));
            balance -= principal;
        }

        schedule
    }
}

/// Principal per output percentile: `debtAmount` when given, otherwise the
/// total of each `totalDebt` band
fn principal_by_percentile(ctx: &TransformContext<'_>) -> Result<Vec<(u32, f64)>, TransformError> {
    if let Some(amount) = ctx.references.number("debtAmount") {
        return Ok(ctx.output_percentiles().into_iter().map(|p| (p, amount)).collect());
    }

    let total_debt = ctx.require("totalDebt")?;
    Ok(ctx
        .percentiles
        .iter()
        .filter_map(|&p| ctx.input_band(total_debt, p).map(|band| (p, band.total())))
        .collect())
}

fn operational_flow(
    ctx: &mut TransformContext<'_>,
    pick: fn(DebtSchedule) -> Vec<DataPoint>,
    operation: &str,
) -> Result<TransformerOutput, TransformError> {
    let principals = principal_by_percentile(ctx)?;
    let mut bands = Vec::with_capacity(principals.len());
    let mut kind = AmortizationKind::default();

    for (percentile, principal) in principals {
        let terms = LoanTerms::from_context(ctx, principal)?;
        kind = terms.kind;
        bands.push(PercentileSeries::new(ctx.source_id, percentile, pick(terms.schedule())));
    }

    let dependencies = if ctx.references.contains("debtAmount") {
        vec!["debtAmount".to_string()]
    } else {
        vec!["totalDebt".to_string()]
    };
    ctx.add_audit_entry(
        "schedule",
        format!("{:?} repayment schedule over {} bands", kind, bands.len()),
        dependencies,
        AuditEntryType::Transformation,
        Some(operation),
    );
    Ok(TransformerOutput::Bands(bands))
}

pub(super) fn operational_principal(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    operational_flow(ctx, |s| s.principal, "principal")
}

pub(super) fn operational_interest(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    operational_flow(ctx, |s| s.interest, "interest")
}

/// Interest on the drawn balance during construction
pub(super) fn construction_interest(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let rate = match ctx.references.number("constructionInterestRate") {
        Some(rate) => rate,
        None => ctx.number("interestRate")?,
    };
    let total_debt = ctx.require("totalDebt")?;

    let mut bands = Vec::new();
    for &percentile in ctx.percentiles {
        let Some(drawdown) = ctx.input_band(total_debt, percentile) else {
            continue;
        };

        let mut balance = 0.0;
        let data = drawdown
            .year_map()
            .into_iter()
            .map(|(year, drawn)| {
                balance += drawn;
                DataPoint::new(year, balance * rate)
            })
            .collect();
        bands.push(PercentileSeries::new(ctx.source_id, percentile, data));
    }

    ctx.add_audit_entry(
        "interest",
        format!("construction interest at {:.4}", rate),
        vec!["totalDebt".into()],
        AuditEntryType::Transformation,
        Some("accrue"),
    );
    Ok(TransformerOutput::Bands(bands))
}

/// Net cash flow over debt service inside the repayment window
pub(super) fn dscr(
    _: Option<&SourceData>,
    ctx: &mut TransformContext<'_>,
) -> Result<TransformerOutput, TransformError> {
    let net = ctx.require("netCashflow")?;
    let service = ctx.require("debtService")?;
    let terms = LoanTerms::from_context(ctx, 0.0)?;
    let window = terms.repayment_start()..=terms.maturity();

    let mut bands = Vec::new();
    for &percentile in ctx.percentiles {
        let net_band = ctx.input_band(net, percentile);
        let service_band = ctx.input_band(service, percentile);
        let (Some(net_band), Some(service_band)) = (net_band, service_band) else {
            continue;
        };

        let service_by_year = service_band.year_map();
        let ratios: BTreeMap<i32, f64> = net_band
            .data
            .iter()
            .filter(|p| window.contains(&p.year))
            .filter_map(|p| {
                let debt_service = *service_by_year.get(&p.year)?;
                (debt_service != 0.0).then(|| (p.year, p.value / debt_service))
            })
            .collect();
        bands.push(PercentileSeries::from_year_map(ctx.source_id, percentile, &ratios));
    }

    debug!(
        "dscr window {}..={} over {} bands",
        window.start(),
        window.end(),
        bands.len()
    );
    ctx.add_audit_entry(
        "ratio",
        format!("coverage over years {}..={}", window.start(), window.end()),
        vec!["netCashflow".into(), "debtService".into()],
        AuditEntryType::Transformation,
        Some("divide"),
    );
    Ok(TransformerOutput::Bands(bands))
}
