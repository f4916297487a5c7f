use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use jobsift_core::error::AppError;
use jobsift_core::escalation::Strategy;
use jobsift_core::registry::{SourceDefinition, SourceRegistry};
use serde::{Deserialize, Serialize};

use crate::extract::{ExtractorConfig, StrategyExtractor};

/// Contents of a source definitions file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy: Strategy,
    /// URL template with `{keywords}` and `{location}` placeholders.
    pub url: String,
    pub extractor: ExtractorConfig,
}

fn enabled_by_default() -> bool {
    true
}

impl SourcesFile {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid source definitions: {e}")))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ConfigError(format!("Cannot read sources file {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Build a registry of the enabled sources, compiling their extractors.
    pub fn into_registry(self) -> Result<SourceRegistry, AppError> {
        let mut registry = SourceRegistry::new();
        for source in self.sources.into_iter().filter(|s| s.enabled) {
            registry.register(source.into_definition()?)?;
        }
        Ok(registry)
    }
}

impl SourceConfig {
    fn into_definition(self) -> Result<SourceDefinition, AppError> {
        let mut seen = BTreeSet::new();
        let mut extractor = StrategyExtractor::new();
        let mut plans = Vec::with_capacity(self.strategies.len());

        for entry in self.strategies {
            if !seen.insert(entry.strategy) {
                return Err(AppError::ConfigError(format!(
                    "source '{}' defines {} twice",
                    self.name, entry.strategy
                )));
            }
            let built = entry.extractor.build().map_err(|e| {
                AppError::ConfigError(format!("source '{}', {}: {e}", self.name, entry.strategy))
            })?;
            extractor = extractor.with(entry.strategy, built);
            plans.push((entry.strategy, entry.url));
        }

        let definition = plans.into_iter().fold(
            SourceDefinition::with_shared_extractor(self.name, Arc::new(extractor)),
            |definition, (strategy, url)| definition.with_plan(strategy, url),
        );
        Ok(definition)
    }
}
