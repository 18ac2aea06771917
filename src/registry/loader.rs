//! JSON-based registry loader

use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::SourceRegistry;
use crate::error::RegistryError;

/// Load a registry from a JSON file and check its ids
pub fn load_registry(path: &Path) -> Result<SourceRegistry, RegistryError> {
    let file = File::open(path)?;
    let registry = load_registry_from_reader(BufReader::new(file))?;
    debug!(
        "loaded registry from {} ({} references, {} sources)",
        path.display(),
        registry.references.len(),
        registry.sources.len()
    );
    Ok(registry)
}

/// Load a registry from any reader (e.g., string buffer, network stream)
pub fn load_registry_from_reader<R: Read>(reader: R) -> Result<SourceRegistry, RegistryError> {
    let registry: SourceRegistry = serde_json::from_reader(reader)?;
    registry.check_unique_ids()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::TransformerId;

    #[test]
    fn test_load_from_reader() {
        let raw = r#"{
            "references": [{"id": "projectLife", "path": ["settings", "general", "projectLife"]}],
            "sources": [
                {
                    "id": "energyRevenue",
                    "priority": 1,
                    "path": ["results", "energyRevenue"],
                    "hasPercentiles": true,
                    "metadata": {
                        "type": "direct",
                        "cashflowType": "inflow",
                        "accountingClass": "revenue",
                        "projectPhase": "operations"
                    }
                },
                {
                    "id": "totalRevenue",
                    "priority": 1,
                    "transformer": "totalRevenue",
                    "metadata": {
                        "type": "virtual",
                        "cashflowType": "none",
                        "accountingClass": "total",
                        "projectPhase": "lifetime"
                    }
                }
            ]
        }"#;
        let registry = load_registry_from_reader(raw.as_bytes()).unwrap();
        assert_eq!(registry.references.len(), 1);
        assert_eq!(registry.sources[1].transformer, Some(TransformerId::TotalRevenue));
    }

    #[test]
    fn test_unknown_transformer_is_a_parse_error() {
        let raw = r#"{"sources": [{"id": "x", "transformer": "doesNotExist",
            "metadata": {"type": "virtual", "cashflowType": "none",
                "accountingClass": "total", "projectPhase": "lifetime"}}]}"#;
        assert!(matches!(load_registry_from_reader(raw.as_bytes()), Err(RegistryError::Json(_))));
    }

    #[test]
    fn test_standard_registry_round_trips_through_json() {
        let registry = SourceRegistry::standard();
        let text = serde_json::to_string(&registry).unwrap();
        let parsed = load_registry_from_reader(text.as_bytes()).unwrap();
        assert_eq!(parsed, registry);
    }
}
