use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::{Captures, Regex};

use super::dates::{MONTH, month_number};

static DEADLINE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:apply\s+(?:by|before)|application\s+deadline|deadline(?:\s+to\s+apply)?|applications?\s+(?:close|closes|are\s+due|due|must\s+be\s+received\s+by)|closing\s+date|closes(?:\s+on)?|accepting\s+applications\s+(?:until|through))\s*(?:is\b|:|-|–)?\s*(?:on\s+)?(?P<date>[^;\n]{3,40})",
    )
    .expect("valid regex")
});
static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})\b").expect("valid regex"));
static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){MONTH}\.?\s+(?P<d>\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(?P<y>\d{{4}}))?"
    ))
    .expect("valid regex")
});
static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<d>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH}\.?(?:,?\s+(?P<y>\d{{4}}))?"
    ))
    .expect("valid regex")
});
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<m>\d{1,2})/(?P<d>\d{1,2})(?:/(?P<y>\d{4}))?\b").expect("valid regex")
});

fn year_or(caps: &Captures<'_>, default: i32) -> Option<i32> {
    match caps.name("y") {
        Some(y) => y.as_str().parse().ok(),
        None => Some(default),
    }
}

fn from_named_month(caps: &Captures<'_>, year: i32) -> Option<NaiveDate> {
    let month = month_number(&caps["mon"])?;
    NaiveDate::from_ymd_opt(year_or(caps, year)?, month, caps["d"].parse().ok()?)
}

/// A calendar date inside `fragment`. A missing year means `year`.
fn parse_fragment(fragment: &str, year: i32) -> Option<NaiveDate> {
    if let Some(caps) = ISO.captures(fragment) {
        return NaiveDate::from_ymd_opt(
            caps["y"].parse().ok()?,
            caps["m"].parse().ok()?,
            caps["d"].parse().ok()?,
        );
    }
    MONTH_DAY
        .captures_iter(fragment)
        .find_map(|caps| from_named_month(&caps, year))
        .or_else(|| {
            DAY_MONTH
                .captures_iter(fragment)
                .find_map(|caps| from_named_month(&caps, year))
        })
        .or_else(|| {
            let caps = NUMERIC.captures(fragment)?;
            NaiveDate::from_ymd_opt(
                year_or(&caps, year)?,
                caps["m"].parse().ok()?,
                caps["d"].parse().ok()?,
            )
        })
}

/// Past dates are assumed to recur next year.
fn roll_forward(date: NaiveDate, today: NaiveDate) -> NaiveDate {
    if date >= today {
        return date;
    }
    let next = date.year() + 1;
    date.with_year(next)
        .or_else(|| NaiveDate::from_ymd_opt(next, date.month(), 28))
        .unwrap_or(date)
}

/// Application deadline from an explicit field or deadline phrasing in `excerpt`.
///
/// Unreadable text yields `None`, never a guess.
pub fn extract_deadline(
    deadline_text: Option<&str>,
    excerpt: &str,
    collected_at: DateTime<Utc>,
) -> Option<NaiveDate> {
    let today = collected_at.date_naive();
    let year = today.year();

    let from_phrase =
        |text: &str| parse_fragment(DEADLINE_PHRASE.captures(text)?.name("date")?.as_str(), year);

    let date = match deadline_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => from_phrase(text).or_else(|| parse_fragment(text, year)),
        None => from_phrase(excerpt),
    }?;
    Some(roll_forward(date, today))
}
