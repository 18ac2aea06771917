//! Path-based lookup of named values from the scenario configuration tree
//!
//! The configuration store itself lives outside this crate; the pipeline only
//! needs something that turns a path into a JSON value.

mod value;

pub use value::{RefValue, Reference, References};

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resolve a path in the configuration tree.
///
/// Never fails: a path that does not lead anywhere yields `None` and the
/// caller applies its own default.
pub trait ReferenceResolver {
    fn resolve(&self, path: &[String]) -> Option<Value>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&[String]) -> Option<Value>,
{
    fn resolve(&self, path: &[String]) -> Option<Value> {
        self(path)
    }
}

/// In-memory configuration tree backed by a JSON document
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Borrow the value at `path` without cloning it
    pub fn get(&self, path: &[String]) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match current {
            Value::Null => None,
            value => Some(value),
        }
    }
}

impl ReferenceResolver for ConfigTree {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        self.get(path).cloned()
    }
}

/// A named path to resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDeclaration {
    pub id: String,
    pub path: Vec<String>,
}

impl ReferenceDeclaration {
    pub fn new(id: &str, path: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of resolving a batch of declarations
#[derive(Debug, Clone, Default)]
pub struct ReferenceLoad {
    pub references: References,
    /// Ids whose path did not resolve
    pub missing: Vec<String>,
}

/// Resolve every declaration; misses are collected, not fatal
pub fn load_references(
    declarations: &[ReferenceDeclaration],
    resolver: &dyn ReferenceResolver,
) -> ReferenceLoad {
    let mut load = ReferenceLoad::default();

    for declaration in declarations {
        match resolver.resolve(&declaration.path) {
            Some(raw) => load.references.insert(&declaration.id, raw),
            None => {
                warn!(
                    "reference `{}` did not resolve at {}",
                    declaration.id,
                    declaration.path.join("/")
                );
                load.missing.push(declaration.id.clone());
            }
        }
    }

    load
}
