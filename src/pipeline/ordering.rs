//! Ordering lint
//!
//! Processing order is type bucket first, priority second. Nothing checks at
//! run time that a source's inputs were processed before it; a source scheduled
//! too early just sees less data. This lint walks the declared dependencies of
//! every transformer and every multiplier that names a source, and reports the
//! ones that would not be available.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::executor::execution_order;
use crate::registry::SourceRegistry;
use crate::transformers::Dependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    /// The dependency exists but runs at or after the dependent source
    ScheduledLater,
    /// A required dependency is not declared at all
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingViolation {
    pub source_id: String,
    pub dependency: String,
    pub kind: ViolationKind,
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::ScheduledLater => write!(
                f,
                "`{}` reads `{}`, which is processed after it",
                self.source_id, self.dependency
            ),
            ViolationKind::Missing => write!(
                f,
                "`{}` reads `{}`, which is not defined",
                self.source_id, self.dependency
            ),
        }
    }
}

/// Check every source against the processing order of `registry`
pub fn lint(registry: &SourceRegistry) -> Vec<OrderingViolation> {
    let order = execution_order(&registry.sources);
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(index, source)| (source.id.as_str(), index))
        .collect();

    let mut violations = Vec::new();
    for (index, source) in order.iter().enumerate() {
        let mut check = |dependency: &str, required: bool| {
            let kind = match position.get(dependency) {
                Some(&at) if at < index => return,
                Some(_) => ViolationKind::ScheduledLater,
                None if required => ViolationKind::Missing,
                None => return,
            };
            violations.push(OrderingViolation {
                source_id: source.id.clone(),
                dependency: dependency.to_string(),
                kind,
            });
        };

        if let Some(transformer) = source.transformer {
            for dependency in transformer.dependencies() {
                match dependency {
                    Dependency::Source(id) => check(id, true),
                    Dependency::Optional(id) => check(id, false),
                    Dependency::Matching(filter) => {
                        for other in &registry.sources {
                            if other.id != source.id && filter.matches(&other.id, &other.metadata) {
                                check(&other.id, true);
                            }
                        }
                    }
                }
            }
        }

        // Multipliers may name a reference instead; only sources are ordered
        for multiplier in source.multipliers.iter().flatten() {
            if position.contains_key(multiplier.id.as_str()) {
                check(&multiplier.id, true);
            }
        }
    }

    violations
}
