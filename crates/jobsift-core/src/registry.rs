use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use url::form_urlencoded;

use crate::error::AppError;
use crate::escalation::Strategy;
use crate::traits::Extractor;

/// What the caller is searching for. Fills URL templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub location: Option<String>,
}

impl SearchQuery {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// How one strategy reaches a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPlan {
    pub strategy: Strategy,
    /// URL with optional `{keywords}` / `{location}` placeholders.
    pub url_template: String,
}

impl StrategyPlan {
    pub fn target_url(&self, query: &SearchQuery) -> String {
        let keywords = encode(&query.keywords.join(" "));
        let location = encode(query.location.as_deref().unwrap_or(""));
        self.url_template
            .replace("{keywords}", &keywords)
            .replace("{location}", &location)
    }
}

/// A source: its name, the strategies it supports and how to read their payloads.
#[derive(Clone)]
pub struct SourceDefinition {
    pub name: String,
    plans: BTreeMap<Strategy, StrategyPlan>,
    extractor: Arc<dyn Extractor>,
}

impl fmt::Debug for SourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDefinition")
            .field("name", &self.name)
            .field("plans", &self.plans)
            .finish_non_exhaustive()
    }
}

impl SourceDefinition {
    pub fn new(name: impl Into<String>, extractor: impl Extractor + 'static) -> Self {
        Self::with_shared_extractor(name, Arc::new(extractor))
    }

    pub fn with_shared_extractor(name: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            name: name.into(),
            plans: BTreeMap::new(),
            extractor,
        }
    }

    pub fn with_plan(mut self, strategy: Strategy, url_template: impl Into<String>) -> Self {
        self.plans.insert(
            strategy,
            StrategyPlan {
                strategy,
                url_template: url_template.into(),
            },
        );
        self
    }

    pub fn plan(&self, strategy: Strategy) -> Option<&StrategyPlan> {
        self.plans.get(&strategy)
    }

    /// Supported strategies in escalation order.
    pub fn strategies(&self) -> impl Iterator<Item = Strategy> + '_ {
        self.plans.keys().copied()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }
}

/// All sources a run may visit, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDefinition>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: SourceDefinition) -> Result<(), AppError> {
        if self.get(&source.name).is_some() {
            return Err(AppError::ConfigError(format!(
                "source '{}' registered twice",
                source.name
            )));
        }
        if source.plans.is_empty() {
            return Err(AppError::ConfigError(format!(
                "source '{}' defines no strategies",
                source.name
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDefinition> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
