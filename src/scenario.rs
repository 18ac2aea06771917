//! Scenario runner for repeated pipeline runs
//!
//! Pre-loads the registry and the scenario configuration tree once, then
//! runs the pipeline as many times as needed with different custom
//! percentile selections.

use log::info;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::error::ScenarioError;
use crate::pipeline::{CustomPercentiles, PipelineConfig, PipelineExecutor, PipelineOutput};
use crate::references::{ConfigTree, ReferenceResolver};
use crate::registry::SourceRegistry;
use crate::transformers::ErosionModel;

/// Load a scenario configuration tree from a JSON file
pub fn load_scenario(path: &Path) -> Result<ConfigTree, ScenarioError> {
    let file = File::open(path)?;
    let root = serde_json::from_reader(BufReader::new(file))?;
    Ok(ConfigTree::new(root))
}

/// Pre-loaded scenario runner
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::from_scenario_file(SourceRegistry::standard(), path)?;
///
/// let base = runner.run();
/// let upside = runner.run_custom(CustomPercentiles::new().with("energyRevenue", 90));
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner<R> {
    executor: PipelineExecutor,
    resolver: R,
    config: PipelineConfig,
}

impl ScenarioRunner<ConfigTree> {
    /// Create runner by loading the configuration tree from a JSON file
    pub fn from_scenario_file(
        registry: SourceRegistry,
        path: &Path,
    ) -> Result<Self, ScenarioError> {
        Ok(Self::new(registry, load_scenario(path)?))
    }
}

impl<R: ReferenceResolver + Sync> ScenarioRunner<R> {
    pub fn new(registry: SourceRegistry, resolver: R) -> Self {
        Self {
            executor: PipelineExecutor::new(registry),
            resolver,
            config: PipelineConfig::default(),
        }
    }

    /// Base configuration used by every run
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_erosion_model(mut self, model: Arc<dyn ErosionModel>) -> Self {
        self.executor = self.executor.with_erosion_model(model);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.executor.registry()
    }

    /// Run once with the base configuration
    pub fn run(&self) -> PipelineOutput {
        self.executor.execute(&self.resolver, &self.config)
    }

    /// Run once with a different custom percentile selection
    pub fn run_custom(&self, custom_percentiles: CustomPercentiles) -> PipelineOutput {
        let config = self.config.clone().with_custom_percentiles(custom_percentiles);
        self.executor.execute(&self.resolver, &config)
    }

    /// Run several custom percentile selections in parallel, results in input order
    pub fn run_batch(&self, selections: &[CustomPercentiles]) -> Vec<PipelineOutput> {
        info!("running {} scenarios in parallel", selections.len());
        selections
            .par_iter()
            .map(|custom| self.run_custom(custom.clone()))
            .collect()
    }
}
