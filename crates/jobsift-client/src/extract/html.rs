use jobsift_core::error::AppError;
use jobsift_core::escalation::Strategy;
use jobsift_core::models::RawRecord;
use jobsift_core::traits::{Extractor, FetchResponse};
use scraper::{ElementRef, Html, Selector};

use super::{FieldMap, absolutize, tidy};

/// Field selector used when a definition gives no `url` selector.
const DEFAULT_URL_SELECTOR: &str = "a[href]@href";

/// `css`, `css@attr` or `@attr` (attribute of the item element itself).
#[derive(Debug, Clone)]
struct FieldSelector {
    selector: Option<Selector>,
    attr: Option<String>,
}

impl FieldSelector {
    fn parse(spec: &str) -> Result<Self, AppError> {
        let (css, attr) = match spec.rsplit_once('@') {
            Some((css, attr)) if !attr.is_empty() && !attr.contains(']') => {
                (css.trim(), Some(attr.trim().to_string()))
            }
            _ => (spec.trim(), None),
        };
        let selector = match css {
            "" => None,
            css => Some(parse_selector(css)?),
        };
        Ok(Self { selector, attr })
    }

    fn read(&self, item: ElementRef<'_>) -> Option<String> {
        let element = match &self.selector {
            Some(selector) => item.select(selector).next()?,
            None => item,
        };
        match &self.attr {
            Some(attr) => element.value().attr(attr).and_then(tidy),
            None => tidy(&element.text().collect::<Vec<_>>().join(" ")),
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e}")))
}

fn parse_field(spec: Option<&String>) -> Result<Option<FieldSelector>, AppError> {
    spec.map(|s| FieldSelector::parse(s)).transpose()
}

/// Reads one posting per element matching a CSS selector.
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    item: Selector,
    title: Option<FieldSelector>,
    company: Option<FieldSelector>,
    location: Option<FieldSelector>,
    url: FieldSelector,
    salary: Option<FieldSelector>,
    date: Option<FieldSelector>,
    excerpt: Option<FieldSelector>,
    employment_type: Option<FieldSelector>,
    deadline: Option<FieldSelector>,
}

impl HtmlExtractor {
    /// Compile the selectors. Invalid CSS is a [`AppError::ConfigError`].
    pub fn new(item: &str, fields: &FieldMap) -> Result<Self, AppError> {
        Ok(Self {
            item: parse_selector(item)?,
            title: parse_field(fields.title.as_ref())?,
            company: parse_field(fields.company.as_ref())?,
            location: parse_field(fields.location.as_ref())?,
            url: FieldSelector::parse(fields.url.as_deref().unwrap_or(DEFAULT_URL_SELECTOR))?,
            salary: parse_field(fields.salary.as_ref())?,
            date: parse_field(fields.date.as_ref())?,
            excerpt: parse_field(fields.excerpt.as_ref())?,
            employment_type: parse_field(fields.employment_type.as_ref())?,
            deadline: parse_field(fields.deadline.as_ref())?,
        })
    }

    fn read_item(&self, item: ElementRef<'_>, base: &str) -> RawRecord {
        let read = |field: &Option<FieldSelector>| field.as_ref().and_then(|f| f.read(item));
        RawRecord {
            title: read(&self.title),
            company: read(&self.company),
            location: read(&self.location),
            url: self.url.read(item).map(|href| absolutize(&href, base)),
            salary_text: read(&self.salary),
            date_text: read(&self.date),
            excerpt: read(&self.excerpt),
            employment_type: read(&self.employment_type),
            deadline_text: read(&self.deadline),
            ..RawRecord::default()
        }
    }
}

impl Extractor for HtmlExtractor {
    fn extract(
        &self,
        response: &FetchResponse,
        _strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError> {
        let document = Html::parse_document(&response.body);
        Ok(document
            .select(&self.item)
            .map(|item| self.read_item(item, &response.final_url))
            .collect())
    }
}
