//! Built-in source registry for a utility-scale wind project
//!
//! Paths point into the scenario configuration tree:
//! - `settings/...` holds user inputs (financing terms, cost schedules)
//! - `results/...` holds the Monte-Carlo percentile output of the sampler

use super::{
    AccountingClass, CashflowType, ProjectPhase, SourceDefinition, SourceMetadata, SourceRegistry,
};
use crate::multipliers::{MultiplierOperation, MultiplierSpec};
use crate::references::ReferenceDeclaration;
use crate::transformers::TransformerId;

fn reference(id: &str, path: &[&str]) -> ReferenceDeclaration {
    ReferenceDeclaration::new(id, path)
}

pub(super) fn standard_registry() -> SourceRegistry {
    let references = vec![
        // General
        reference("projectLife", &["settings", "general", "projectLife"]),
        reference("operationsStartYear", &["settings", "general", "operationsStartYear"]),
        reference("discountRate", &["settings", "general", "discountRate"]),
        // Financing
        reference("loanDuration", &["settings", "financing", "loanDuration"]),
        reference("interestRate", &["settings", "financing", "interestRate"]),
        reference("gracePeriod", &["settings", "financing", "gracePeriod"]),
        reference("amortizationType", &["settings", "financing", "amortizationType"]),
        reference("debtRatio", &["settings", "financing", "debtRatio"]),
        reference(
            "constructionInterestRate",
            &["settings", "financing", "constructionInterestRate"],
        ),
        reference("capexDrawdownSchedule", &["settings", "financing", "drawdownSchedule"]),
        // Costs
        reference("escalationRate", &["settings", "costs", "escalationRate"]),
        reference("contractFees", &["settings", "costs", "contractFees"]),
        reference("majorRepairs", &["settings", "costs", "majorRepairs"]),
        reference("reserveFunds", &["settings", "costs", "reserveFunds"]),
        reference("failureRates", &["settings", "failureRates"]),
    ];

    let escalation =
        MultiplierSpec::new("escalationRate", MultiplierOperation::Compound).with_base_year(1);

    let sources = vec![
        // ---- Direct: sampled results ----
        SourceDefinition::direct(
            "energyRevenue",
            10,
            &["results", "energyRevenue"],
            SourceMetadata::revenue("Energy Revenue").with_units("USD"),
        )
        .with_percentiles(),
        SourceDefinition::direct(
            "capex",
            20,
            &["results", "capex"],
            SourceMetadata::opex("Capital Expenditure")
                .with_class(AccountingClass::Capex)
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        )
        .with_percentiles(),
        SourceDefinition::direct(
            "cumulativePrecipitation",
            30,
            &["results", "environment", "cumulativePrecipitation"],
            SourceMetadata::metric("Cumulative Precipitation").with_units("mm"),
        )
        .with_percentiles(),
        SourceDefinition::direct(
            "windSpeed",
            40,
            &["results", "environment", "windSpeed"],
            SourceMetadata::metric("Mean Wind Speed").with_units("m/s"),
        )
        .with_percentiles(),
        // ---- Indirect: extracts adjusted by multipliers ----
        SourceDefinition::indirect(
            "omCost",
            10,
            &["results", "omCost"],
            vec![escalation.clone()],
            SourceMetadata::opex("O&M Cost").with_units("USD"),
        )
        .with_percentiles(),
        SourceDefinition::indirect(
            "insuranceCost",
            20,
            &["settings", "costs", "insuranceSchedule"],
            vec![escalation],
            SourceMetadata::opex("Insurance").with_units("USD"),
        ),
        SourceDefinition::indirect(
            "landLease",
            30,
            &["results", "energyRevenue"],
            vec![MultiplierSpec::new("leaseRevenueShare", MultiplierOperation::Multiply)],
            SourceMetadata::opex("Land Lease").with_units("USD"),
        )
        .with_percentiles()
        .with_reference("leaseRevenueShare", &["settings", "costs", "leaseRevenueShare"]),
        // ---- Virtual: event conversions and component economics ----
        SourceDefinition::derived(
            "contractFees",
            100,
            TransformerId::ContractFees,
            SourceMetadata::opex("Contract Fees").with_units("USD"),
        ),
        SourceDefinition::derived(
            "majorRepairs",
            110,
            TransformerId::MajorRepairs,
            SourceMetadata::opex("Major Repairs").with_units("USD"),
        ),
        SourceDefinition::derived(
            "reserveFunds",
            120,
            TransformerId::ReserveFunds,
            SourceMetadata::opex("Reserve Funds")
                .with_class(AccountingClass::Reserve)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "componentFailures",
            130,
            TransformerId::ComponentFailures,
            SourceMetadata::opex("Component Failures").with_units("USD"),
        ),
        SourceDefinition::derived(
            "erosionLoss",
            140,
            TransformerId::ErosionLoss,
            SourceMetadata::metric("Leading Edge Erosion Loss").with_units("%"),
        ),
        // ---- Virtual: construction financing ----
        SourceDefinition::derived(
            "totalCapex",
            200,
            TransformerId::TotalCapex,
            SourceMetadata::total("Total Capex")
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "capexDrawdown",
            210,
            TransformerId::CapexDrawdown,
            SourceMetadata::total("Capex Drawdown")
                .with_class(AccountingClass::Financing)
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "debtDrawdown",
            220,
            TransformerId::DebtDrawdown,
            SourceMetadata::total("Debt Drawdown")
                .with_class(AccountingClass::Debt)
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "totalDebt",
            230,
            TransformerId::TotalDebt,
            SourceMetadata::total("Total Debt")
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "constructionInterest",
            240,
            TransformerId::ConstructionInterest,
            SourceMetadata::total("Construction Interest")
                .with_cashflow(CashflowType::Outflow)
                .with_class(AccountingClass::Financing)
                .in_phase(ProjectPhase::Construction)
                .with_units("USD"),
        ),
        // ---- Virtual: operating totals ----
        SourceDefinition::derived(
            "totalRevenue",
            300,
            TransformerId::TotalRevenue,
            SourceMetadata::total("Total Revenue").with_units("USD"),
        ),
        SourceDefinition::derived(
            "totalCost",
            310,
            TransformerId::TotalCost,
            SourceMetadata::total("Total Operating Cost").with_units("USD"),
        ),
        SourceDefinition::derived(
            "netCashflow",
            320,
            TransformerId::NetCashflow,
            SourceMetadata::total("Net Cash Flow").with_units("USD"),
        ),
        // ---- Virtual: debt service and coverage ----
        SourceDefinition::derived(
            "operationalInterest",
            400,
            TransformerId::OperationalInterest,
            SourceMetadata::total("Operational Interest")
                .with_cashflow(CashflowType::Outflow)
                .with_class(AccountingClass::Financing)
                .in_phase(ProjectPhase::Operations)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "operationalPrincipal",
            410,
            TransformerId::OperationalPrincipal,
            SourceMetadata::total("Operational Principal")
                .with_cashflow(CashflowType::Outflow)
                .with_class(AccountingClass::Financing)
                .in_phase(ProjectPhase::Operations)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "debtService",
            420,
            TransformerId::DebtService,
            SourceMetadata::total("Debt Service")
                .in_phase(ProjectPhase::Operations)
                .with_units("USD"),
        ),
        SourceDefinition::derived(
            "dscr",
            430,
            TransformerId::Dscr,
            SourceMetadata::metric("DSCR").in_phase(ProjectPhase::Operations),
        ),
    ];

    SourceRegistry::new(references, sources)
}
