//! Source registry: reference declarations plus source definitions

mod definition;
pub mod loader;
mod standard;

pub use definition::{
    is_valid_source_type, AccountingClass, CashflowType, ProjectPhase, SourceDefinition,
    SourceMetadata, SourceType,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::RegistryError;
use crate::references::ReferenceDeclaration;

/// Everything a pipeline run needs to know about which sources exist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    /// Global references, resolved once per run
    #[serde(default)]
    pub references: Vec<ReferenceDeclaration>,

    /// Source definitions in declaration order
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
}

impl SourceRegistry {
    pub fn new(references: Vec<ReferenceDeclaration>, sources: Vec<SourceDefinition>) -> Self {
        Self { references, sources }
    }

    /// Built-in registry for a utility-scale wind project
    pub fn standard() -> Self {
        standard::standard_registry()
    }

    /// Load a registry from a JSON file
    pub fn from_json_path(path: &Path) -> Result<Self, RegistryError> {
        loader::load_registry(path)
    }

    /// Load a registry from any reader
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, RegistryError> {
        loader::load_registry_from_reader(reader)
    }

    /// Look up a definition by id
    pub fn source(&self, id: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Reject registries that declare the same source id twice
    pub fn check_unique_ids(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(RegistryError::DuplicateSource(source.id.clone()));
            }
        }
        Ok(())
    }
}
