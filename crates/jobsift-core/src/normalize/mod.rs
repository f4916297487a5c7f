//! RawRecord → CanonicalJobRecord.
//!
//! Each field is resolved by its own rule set (salary, employment type,
//! posting date, recruiter, deadline). A record that cannot be given an
//! identity key is rejected with [`AppError::ParseError`].

pub mod dates;
pub mod deadline;
pub mod employment;
pub mod recruiter;
pub mod salary;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::identity::identity_key;
use crate::models::{CanonicalJobRecord, RawRecord};

pub use dates::{RecencyFilter, parse_date_text, resolve_posted_at};
pub use deadline::extract_deadline;
pub use employment::classify_employment;
pub use recruiter::detect_recruiter;
pub use salary::{extract_salary, extract_salary_from_prose};

pub const DEFAULT_EXCERPT_LIMIT: usize = 500;

/// Collapse whitespace runs to single spaces and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_opt(raw: Option<&String>) -> Option<String> {
    raw.map(|s| clean_text(s)).filter(|s| !s.is_empty())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    excerpt_limit: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            excerpt_limit: DEFAULT_EXCERPT_LIMIT,
        }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excerpt_limit(mut self, limit: usize) -> Self {
        self.excerpt_limit = limit;
        self
    }

    pub fn normalize(
        &self,
        raw: &RawRecord,
        source: &str,
        collected_at: DateTime<Utc>,
    ) -> Result<CanonicalJobRecord, AppError> {
        let title = clean_opt(raw.title.as_ref()).unwrap_or_default();
        let company = clean_opt(raw.company.as_ref()).unwrap_or_default();
        let location = clean_opt(raw.location.as_ref()).unwrap_or_default();
        let url = clean_opt(raw.url.as_ref());
        let full_excerpt = clean_opt(raw.excerpt.as_ref()).unwrap_or_default();

        let id = identity_key(source, url.as_deref(), &title, &company, &location).ok_or_else(
            || {
                AppError::ParseError(format!(
                    "record from '{source}' has neither a url nor title, company and location"
                ))
            },
        )?;

        let salary = raw
            .salary_text
            .as_deref()
            .and_then(extract_salary)
            .or_else(|| extract_salary_from_prose(&full_excerpt));

        let type_text = format!("{title} {full_excerpt}");
        let employment_type = classify_employment(raw.employment_type.as_deref(), &type_text);

        let (posted_at, date_confidence) =
            resolve_posted_at(raw.posted_at, raw.date_text.as_deref(), collected_at);

        let recruiter_name = detect_recruiter(&company, &title, &full_excerpt);
        let deadline = extract_deadline(raw.deadline_text.as_deref(), &full_excerpt, collected_at);

        Ok(CanonicalJobRecord {
            id,
            title,
            company,
            location,
            url,
            source: source.to_string(),
            salary,
            employment_type,
            posted_at,
            date_confidence,
            recruiter_name,
            deadline,
            excerpt: truncate_chars(&full_excerpt, self.excerpt_limit),
            first_seen_at: collected_at,
            last_seen_at: collected_at,
        })
    }
}
