//! Source definitions: the static configuration describing each source

use serde::{Deserialize, Serialize};

use crate::multipliers::MultiplierSpec;
use crate::references::ReferenceDeclaration;
use crate::transformers::TransformerId;

/// Processing phase of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Raw extract from the configuration tree
    Direct,
    /// Raw extract adjusted by multipliers
    Indirect,
    /// Purely derived from other sources
    Virtual,
}

impl SourceType {
    /// Execution bucket: direct sources run first, virtual sources last
    pub fn bucket(&self) -> u8 {
        match self {
            SourceType::Direct => 0,
            SourceType::Indirect => 1,
            SourceType::Virtual => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Direct => "direct",
            SourceType::Indirect => "indirect",
            SourceType::Virtual => "virtual",
        }
    }
}

/// Direction of money for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashflowType {
    Inflow,
    Outflow,
    None,
}

/// Accounting classification used by the totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountingClass {
    Revenue,
    Opex,
    Capex,
    Debt,
    Financing,
    Reserve,
    Metric,
    Total,
}

/// Project lifecycle phase a source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectPhase {
    Development,
    Construction,
    Operations,
    Decommissioning,
    Lifetime,
}

/// Descriptive and classification metadata carried into every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub cashflow_type: CashflowType,
    pub accounting_class: AccountingClass,
    pub project_phase: ProjectPhase,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Percentile aliased by band 0, set during the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_percentile: Option<u32>,
    /// Component key for fan-out records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl SourceMetadata {
    pub fn new(
        source_type: SourceType,
        cashflow_type: CashflowType,
        accounting_class: AccountingClass,
        project_phase: ProjectPhase,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source_type,
            cashflow_type,
            accounting_class,
            project_phase,
            name: name.into(),
            description: None,
            units: None,
            custom_percentile: None,
            component: None,
        }
    }

    /// Operating revenue extracted directly from sampled results
    pub fn revenue(name: impl Into<String>) -> Self {
        Self::new(
            SourceType::Direct,
            CashflowType::Inflow,
            AccountingClass::Revenue,
            ProjectPhase::Operations,
            name,
        )
    }

    /// Operating cost extracted directly from sampled results
    pub fn opex(name: impl Into<String>) -> Self {
        Self::new(
            SourceType::Direct,
            CashflowType::Outflow,
            AccountingClass::Opex,
            ProjectPhase::Operations,
            name,
        )
    }

    /// Non-cash derived metric
    pub fn metric(name: impl Into<String>) -> Self {
        Self::new(
            SourceType::Virtual,
            CashflowType::None,
            AccountingClass::Metric,
            ProjectPhase::Lifetime,
            name,
        )
    }

    /// Lifetime total derived from other sources
    pub fn total(name: impl Into<String>) -> Self {
        Self::new(
            SourceType::Virtual,
            CashflowType::None,
            AccountingClass::Total,
            ProjectPhase::Lifetime,
            name,
        )
    }

    pub fn with_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_cashflow(mut self, cashflow_type: CashflowType) -> Self {
        self.cashflow_type = cashflow_type;
        self
    }

    pub fn with_class(mut self, accounting_class: AccountingClass) -> Self {
        self.accounting_class = accounting_class;
        self
    }

    pub fn in_phase(mut self, project_phase: ProjectPhase) -> Self {
        self.project_phase = project_phase;
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Static definition of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default)]
    pub has_percentiles: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_references: Vec<ReferenceDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<TransformerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipliers: Option<Vec<MultiplierSpec>>,
    pub metadata: SourceMetadata,
}

impl SourceDefinition {
    /// Raw extract at `path`
    pub fn direct(id: &str, priority: i32, path: &[&str], metadata: SourceMetadata) -> Self {
        Self {
            id: id.to_string(),
            priority,
            path: Some(path.iter().map(|s| s.to_string()).collect()),
            has_percentiles: false,
            local_references: Vec::new(),
            transformer: None,
            multipliers: None,
            metadata: metadata.with_type(SourceType::Direct),
        }
    }

    /// Raw extract at `path` folded through `multipliers`
    pub fn indirect(
        id: &str,
        priority: i32,
        path: &[&str],
        multipliers: Vec<MultiplierSpec>,
        metadata: SourceMetadata,
    ) -> Self {
        let mut source = Self::direct(id, priority, path, metadata);
        source.multipliers = Some(multipliers);
        source.metadata.source_type = SourceType::Indirect;
        source
    }

    /// Virtual source computed by a transformer
    pub fn derived(
        id: &str,
        priority: i32,
        transformer: TransformerId,
        metadata: SourceMetadata,
    ) -> Self {
        Self {
            id: id.to_string(),
            priority,
            path: None,
            has_percentiles: true,
            local_references: Vec::new(),
            transformer: Some(transformer),
            multipliers: None,
            metadata: metadata.with_type(SourceType::Virtual),
        }
    }

    /// Mark the raw data as carrying percentile bands
    pub fn with_percentiles(mut self) -> Self {
        self.has_percentiles = true;
        self
    }

    /// Add a per-source reference, overriding a same-named global
    pub fn with_reference(mut self, id: &str, path: &[&str]) -> Self {
        self.local_references.push(ReferenceDeclaration::new(id, path));
        self
    }

    /// Path joined for logs and audit details
    pub fn path_label(&self) -> Option<String> {
        self.path.as_ref().map(|p| p.join("/"))
    }

    fn has_multipliers(&self) -> bool {
        self.multipliers.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Check the structural rule tying `metadata.type` to the definition shape
    pub fn is_valid_source_type(&self) -> bool {
        match self.metadata.source_type {
            SourceType::Direct => self.path.is_some() && !self.has_multipliers(),
            SourceType::Indirect => self.path.is_some() && self.has_multipliers(),
            SourceType::Virtual => self.path.is_none() && self.transformer.is_some(),
        }
    }
}

/// Free-function form of [`SourceDefinition::is_valid_source_type`]
pub fn is_valid_source_type(source: &SourceDefinition) -> bool {
    source.is_valid_source_type()
}
