use std::sync::LazyLock;

use jobsift_core::error::AppError;
use jobsift_core::escalation::Strategy;
use jobsift_core::models::RawRecord;
use jobsift_core::traits::{Extractor, FetchResponse};
use regex::{Captures, Regex};

use super::{absolutize, tidy};

static FEED_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:rss|feed|rdf:rdf|channel)\b").expect("valid regex"));
static ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:item|entry)\b[^>]*>(.*?)</(?:item|entry)>").expect("valid regex")
});
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>/]*>(.*?)</link>").expect("valid regex"));
static ATOM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<(?:description|summary|content:encoded|content)\b[^>]*>(.*?)</(?:description|summary|content:encoded|content)>",
    )
    .expect("valid regex")
});
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<(?:pubdate|published|updated|dc:date)\b[^>]*>(.*?)</(?:pubdate|published|updated|dc:date)>",
    )
    .expect("valid regex")
});
static COMPANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<(?:company|job:company|dc:creator|author)\b[^>]*>(.*?)</(?:company|job:company|dc:creator|author)>",
    )
    .expect("valid regex")
});
static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:location|job:location|region)\b[^>]*>(.*?)</(?:location|job:location|region)>")
        .expect("valid regex")
});
static SALARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:salary|job:salary)\b[^>]*>(.*?)</(?:salary|job:salary)>")
        .expect("valid regex")
});
static JOB_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:type|job_type|jobtype|job:type)\b[^>]*>(.*?)</(?:type|job_type|jobtype|job:type)>")
        .expect("valid regex")
});
static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});

/// RSS 2.0 / Atom / RDF feed reader.
///
/// Reads the common item elements plus the usual job-board extensions
/// (`company`, `location`, `salary`, `job_type`). A title of the form
/// "Role at Company" supplies the company when no element does.
#[derive(Debug, Clone, Copy, Default)]
pub struct RssExtractor;

impl Extractor for RssExtractor {
    fn extract(
        &self,
        response: &FetchResponse,
        _strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError> {
        if !FEED_ROOT.is_match(&response.body) {
            return Err(AppError::ParseError(format!(
                "{} is not an RSS or Atom document",
                response.final_url
            )));
        }

        Ok(ITEM
            .captures_iter(&response.body)
            .map(|caps| read_item(&caps[1], &response.final_url))
            .collect())
    }
}

fn read_item(block: &str, base: &str) -> RawRecord {
    let mut title = capture(&TITLE, block);
    let mut company = capture(&COMPANY, block);
    if company.is_none()
        && let Some((role, employer)) = title.as_deref().and_then(|t| t.rsplit_once(" at "))
    {
        company = tidy(employer);
        title = tidy(role);
    }

    let url = capture(&LINK, block)
        .or_else(|| ATOM_LINK.captures(block).map(|c| decode_entities(&c[1])))
        .map(|href| absolutize(&href, base));

    RawRecord {
        title,
        company,
        location: capture(&LOCATION, block),
        url,
        salary_text: capture(&SALARY, block),
        date_text: capture(&DATE, block),
        excerpt: capture(&DESCRIPTION, block),
        employment_type: capture(&JOB_TYPE, block),
        ..RawRecord::default()
    }
}

fn capture(re: &Regex, block: &str) -> Option<String> {
    re.captures(block).and_then(|c| element_text(&c))
}

/// Inner text of a matched element: CDATA unwrapped, entities decoded, tags dropped.
fn element_text(caps: &Captures<'_>) -> Option<String> {
    let inner = CDATA.replace_all(&caps[1], "$1");
    let decoded = decode_entities(&inner);
    tidy(&TAG.replace_all(&decoded, " "))
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
