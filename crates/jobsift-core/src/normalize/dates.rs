//! Posting-date resolution and recency filtering.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{CanonicalJobRecord, DateConfidence};

static JUST_NOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:just now|today|just posted|moments? ago|posted today)\b")
        .expect("valid regex")
});
static YESTERDAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\byesterday\b").expect("valid regex"));
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<n>\d+|an?)\+?\s*(?P<unit>minute|min|hour|hr|day|week|month|year)s?\+?\s+ago\b",
    )
    .expect("valid regex")
});
static COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<n>\d+)\s*(?P<unit>[hdw])\+?(?:\s+ago)?\s*$").expect("valid regex")
});
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})\b").expect("valid regex")
});
/// A full English month name or one of its standard abbreviations, as a whole word.
pub(crate) const MONTH: &str = r"\b(?P<mon>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b";

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){MONTH}\.?\s+(?P<d>\d{{1,2}})(?:st|nd|rd|th)?,?\s+(?P<y>\d{{4}})\b"
    ))
    .expect("valid regex")
});
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<d>\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH}\.?,?\s+(?P<y>\d{{4}})\b"
    ))
    .expect("valid regex")
});
static US_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<m>\d{1,2})/(?P<d>\d{1,2})/(?P<y>\d{4})\b").expect("valid regex")
});

/// Month number from an English month name or a standard abbreviation.
///
/// Only whole names match: "marketing" is not March.
pub(crate) fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let month = match lower.as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

fn unit_delta(unit: &str, n: i64) -> Option<TimeDelta> {
    match unit.to_ascii_lowercase().as_str() {
        "minute" | "min" => TimeDelta::try_minutes(n),
        "hour" | "hr" | "h" => TimeDelta::try_hours(n),
        "day" | "d" => TimeDelta::try_days(n),
        "week" | "w" => TimeDelta::try_weeks(n),
        "month" => TimeDelta::try_days(n.checked_mul(30)?),
        "year" => TimeDelta::try_days(n.checked_mul(365)?),
        _ => None,
    }
}

fn count(raw: &str) -> Option<i64> {
    match raw.to_ascii_lowercase().as_str() {
        "a" | "an" => Some(1),
        digits => digits.parse().ok(),
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn ymd(y: &str, m: u32, d: &str) -> Option<DateTime<Utc>> {
    midnight(NaiveDate::from_ymd_opt(y.parse().ok()?, m, d.parse().ok()?)?)
}

/// Resolve free date text against `now`. `None` when no rule understands it.
pub fn parse_date_text(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if JUST_NOW.is_match(text) {
        return Some(now);
    }
    if YESTERDAY.is_match(text) {
        return now.checked_sub_signed(TimeDelta::days(1));
    }
    if let Some(caps) = RELATIVE.captures(text).or_else(|| COMPACT.captures(text)) {
        let n = count(&caps["n"])?;
        return now.checked_sub_signed(unit_delta(&caps["unit"], n)?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(caps) = ISO_DATE.captures(text) {
        return ymd(&caps["y"], caps["m"].parse().ok()?, &caps["d"]);
    }
    for re in [&*MONTH_DAY_YEAR, &*DAY_MONTH_YEAR] {
        if let Some(caps) = re.captures(text)
            && let Some(m) = month_number(&caps["mon"])
        {
            return ymd(&caps["y"], m, &caps["d"]);
        }
    }
    if let Some(caps) = US_NUMERIC.captures(text) {
        return ymd(&caps["y"], caps["m"].parse().ok()?, &caps["d"]);
    }
    None
}

/// Posting time and how far it can be trusted.
///
/// An explicit timestamp or resolvable text is `Parsed`. Text that cannot be
/// read falls back to `collected_at`, tagged `Scraped`. No text at all is
/// `Unknown` with no timestamp.
pub fn resolve_posted_at(
    explicit: Option<DateTime<Utc>>,
    text: Option<&str>,
    collected_at: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, DateConfidence) {
    if let Some(ts) = explicit {
        return (Some(ts), DateConfidence::Parsed);
    }
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return (None, DateConfidence::Unknown);
    };
    match parse_date_text(text, collected_at) {
        Some(ts) => (Some(ts), DateConfidence::Parsed),
        None => {
            tracing::debug!(date_text = %text, "Unreadable posting date, using collection time");
            (Some(collected_at), DateConfidence::Scraped)
        }
    }
}

/// Recency window requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecencyFilter {
    #[default]
    Any,
    Hour,
    Day,
    Week,
    Month,
}

impl RecencyFilter {
    pub fn window(&self) -> Option<TimeDelta> {
        match self {
            RecencyFilter::Any => None,
            RecencyFilter::Hour => Some(TimeDelta::hours(1)),
            RecencyFilter::Day => Some(TimeDelta::days(1)),
            RecencyFilter::Week => Some(TimeDelta::weeks(1)),
            RecencyFilter::Month => Some(TimeDelta::days(30)),
        }
    }

    /// Windows of a day or less trust only parsed dates.
    fn accepts(&self, confidence: DateConfidence) -> bool {
        match self {
            RecencyFilter::Any => true,
            RecencyFilter::Hour | RecencyFilter::Day => confidence == DateConfidence::Parsed,
            RecencyFilter::Week | RecencyFilter::Month => confidence != DateConfidence::Unknown,
        }
    }

    pub fn admits(&self, record: &CanonicalJobRecord, now: DateTime<Utc>) -> bool {
        let Some(window) = self.window() else {
            return true;
        };
        if !self.accepts(record.date_confidence) {
            return false;
        }
        record
            .posted_at
            .is_some_and(|posted| posted >= now - window)
    }
}

impl fmt::Display for RecencyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecencyFilter::Any => "any",
            RecencyFilter::Hour => "hour",
            RecencyFilter::Day => "day",
            RecencyFilter::Week => "week",
            RecencyFilter::Month => "month",
        };
        f.write_str(s)
    }
}

impl FromStr for RecencyFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(RecencyFilter::Any),
            "hour" => Ok(RecencyFilter::Hour),
            "day" => Ok(RecencyFilter::Day),
            "week" => Ok(RecencyFilter::Week),
            "month" => Ok(RecencyFilter::Month),
            _ => Err(format!("Unknown recency filter: {s}")),
        }
    }
}
