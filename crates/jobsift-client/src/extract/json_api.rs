use chrono::{DateTime, Utc};
use jobsift_core::error::AppError;
use jobsift_core::escalation::Strategy;
use jobsift_core::models::RawRecord;
use jobsift_core::traits::{Extractor, FetchResponse};
use serde_json::Value;

use super::{FieldMap, absolutize, tidy};

/// Reads postings out of a JSON document by dot paths.
///
/// `items` locates the array of postings; each [`FieldMap`] entry is a path
/// relative to one item. A date field holding an RFC 3339 string or a Unix
/// timestamp becomes an explicit `posted_at`; anything else is kept as text.
#[derive(Debug, Clone)]
pub struct JsonApiExtractor {
    items: String,
    fields: FieldMap,
}

impl JsonApiExtractor {
    pub fn new(items: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            items: items.into(),
            fields,
        }
    }

    fn read_item(&self, item: &Value, base: &str) -> RawRecord {
        let text = |path: &Option<String>| {
            path.as_deref()
                .and_then(|p| lookup(item, p))
                .and_then(scalar_text)
        };

        let date = self.fields.date.as_deref().and_then(|p| lookup(item, p));
        let posted_at = date.and_then(timestamp);

        RawRecord {
            title: text(&self.fields.title),
            company: text(&self.fields.company),
            location: text(&self.fields.location),
            url: text(&self.fields.url).map(|href| absolutize(&href, base)),
            salary_text: text(&self.fields.salary),
            date_text: match posted_at {
                Some(_) => None,
                None => date.and_then(scalar_text),
            },
            excerpt: text(&self.fields.excerpt),
            posted_at,
            employment_type: text(&self.fields.employment_type),
            deadline_text: text(&self.fields.deadline),
        }
    }
}

impl Extractor for JsonApiExtractor {
    fn extract(
        &self,
        response: &FetchResponse,
        _strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError> {
        let document: Value = serde_json::from_str(&response.body).map_err(|e| {
            AppError::ParseError(format!("{} is not valid JSON: {e}", response.final_url))
        })?;

        let items = match lookup(&document, &self.items) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AppError::ParseError(format!(
                    "'{}' is a {} not an array",
                    self.items,
                    kind_name(other)
                )));
            }
        };

        Ok(items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| self.read_item(item, &response.final_url))
            .collect())
    }
}

/// Follow a dot path. Numeric segments index into arrays; an empty path is the value itself.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => tidy(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let secs = n.as_i64()?;
            // Millisecond epochs are common in job APIs.
            let secs = if secs > 100_000_000_000 { secs / 1000 } else { secs };
            DateTime::from_timestamp(secs, 0)
        }
        _ => None,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn fields() -> FieldMap {
        FieldMap {
            title: Some("title".into()),
            company: Some("company.name".into()),
            location: Some("locations".into()),
            url: Some("links.0.href".into()),
            salary: Some("pay".into()),
            date: Some("posted".into()),
            excerpt: Some("summary".into()),
            employment_type: Some("type".into()),
            deadline: None,
        }
    }

    fn extract(items: &str, body: serde_json::Value) -> Result<Vec<RawRecord>, AppError> {
        JsonApiExtractor::new(items, fields()).extract(
            &FetchResponse::ok("https://api.example.com/v1/search", body.to_string()),
            Strategy::Api,
        )
    }

    #[test]
    fn nested_items_are_read() {
        let body = json!({
            "data": { "jobs": [
                {
                    "title": "  Rust   Engineer ",
                    "company": { "name": "Acme" },
                    "locations": ["Berlin", "Remote"],
                    "links": [{ "href": "/jobs/1" }],
                    "pay": "€70,000 - €90,000",
                    "posted": "2026-03-10T08:00:00Z",
                    "summary": "Work on things",
                    "type": "FULL_TIME"
                },
                {
                    "title": "Analyst",
                    "company": { "name": "Globex" },
                    "posted": "3 days ago"
                },
                "not an object"
            ]}
        });

        let records = extract("data.jobs", body).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title.as_deref(), Some("Rust Engineer"));
        assert_eq!(first.company.as_deref(), Some("Acme"));
        assert_eq!(first.location.as_deref(), Some("Berlin, Remote"));
        assert_eq!(first.url.as_deref(), Some("https://api.example.com/jobs/1"));
        assert_eq!(
            first.posted_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap())
        );
        assert_eq!(first.date_text, None);
        assert_eq!(first.employment_type.as_deref(), Some("FULL_TIME"));

        let second = &records[1];
        assert_eq!(second.posted_at, None);
        assert_eq!(second.date_text.as_deref(), Some("3 days ago"));
        assert_eq!(second.url, None);
    }

    #[test]
    fn epoch_dates_become_timestamps() {
        let body = json!([{ "title": "A", "posted": 1_773_100_800_000_i64 }]);
        let records = extract("", body).unwrap();
        assert_eq!(
            records[0].posted_at,
            DateTime::from_timestamp(1_773_100_800, 0)
        );
    }

    #[test]
    fn missing_items_path_means_no_results() {
        assert!(extract("data.jobs", json!({ "data": {} })).unwrap().is_empty());
        assert!(extract("data.jobs", json!({ "data": { "jobs": null } })).unwrap().is_empty());
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        let err = JsonApiExtractor::new("", FieldMap::default())
            .extract(&FetchResponse::ok("https://api.example.com", "<html>"), Strategy::Api)
            .unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));

        let err = extract("data", json!({ "data": "nope" })).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }
}
