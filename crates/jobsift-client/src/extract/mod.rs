//! Generic, configuration-driven extractors.
//!
//! A source definition names one of these per strategy and fills in the
//! paths or selectors. None of them know anything about a particular site.

pub mod html;
pub mod json_api;
pub mod rss;

use std::collections::BTreeMap;
use std::sync::Arc;

use jobsift_core::error::AppError;
use jobsift_core::escalation::Strategy;
use jobsift_core::models::RawRecord;
use jobsift_core::traits::{Extractor, FetchResponse};
use serde::{Deserialize, Serialize};

pub use html::HtmlExtractor;
pub use json_api::JsonApiExtractor;
pub use rss::RssExtractor;

/// Where each [`RawRecord`] field lives inside one item.
///
/// For JSON this is a dot path (`company.name`, `locations.0`); for HTML a
/// CSS selector, optionally suffixed with `@attr` to read an attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldMap {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub salary: Option<String>,
    pub date: Option<String>,
    pub excerpt: Option<String>,
    pub employment_type: Option<String>,
    pub deadline: Option<String>,
}

/// The extractor half of a strategy definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    Rss,
    JsonApi {
        /// Dot path to the array of items. Empty means the document root.
        #[serde(default)]
        items: String,
        #[serde(default)]
        fields: FieldMap,
    },
    Html {
        /// CSS selector matching one element per posting.
        item: String,
        #[serde(default)]
        fields: FieldMap,
    },
}

impl ExtractorConfig {
    pub fn build(&self) -> Result<Arc<dyn Extractor>, AppError> {
        Ok(match self {
            ExtractorConfig::Rss => Arc::new(RssExtractor),
            ExtractorConfig::JsonApi { items, fields } => {
                Arc::new(JsonApiExtractor::new(items.clone(), fields.clone()))
            }
            ExtractorConfig::Html { item, fields } => Arc::new(HtmlExtractor::new(item, fields)?),
        })
    }
}

/// Dispatches to a different extractor per strategy.
///
/// A strategy without an extractor yields no records.
#[derive(Clone, Default)]
pub struct StrategyExtractor {
    by_strategy: BTreeMap<Strategy, Arc<dyn Extractor>>,
}

impl StrategyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: Strategy, extractor: Arc<dyn Extractor>) -> Self {
        self.by_strategy.insert(strategy, extractor);
        self
    }
}

impl Extractor for StrategyExtractor {
    fn extract(
        &self,
        response: &FetchResponse,
        strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError> {
        match self.by_strategy.get(&strategy) {
            Some(extractor) => extractor.extract(response, strategy),
            None => Ok(Vec::new()),
        }
    }
}

/// Trimmed, whitespace-collapsed text, or `None` when nothing is left.
pub(crate) fn tidy(raw: &str) -> Option<String> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Resolve a possibly relative link against the page it came from.
pub(crate) fn absolutize(href: &str, base: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}
