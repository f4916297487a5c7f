//! Salary extraction.
//!
//! An ordered list of matcher rules, most specific first. A match outside the
//! plausibility bounds is a false positive: it is discarded and the search
//! continues with the remaining matches and rules.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{SalaryPeriod, SalaryRange};

pub const MIN_HOURLY: f64 = 15.0;
pub const MAX_HOURLY: f64 = 500.0;
pub const MIN_ANNUAL: f64 = 30_000.0;
pub const MAX_ANNUAL: f64 = 500_000.0;

const CUR: &str = r"(?P<cur>[$£€])?\s*";
const LO: &str = r"(?P<lo>\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)";
const HI: &str = r"(?P<hi>\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)";
const SEP: &str = r"\s*(?:-|–|—|to)\s*[$£€]?\s*";
const HOURLY: &str = r"\s*(?:/\s*(?:hr|hour)\b|per\s+hour\b|an\s+hour\b|hourly\b|p/h\b|/h\b)";
const ANNUAL: &str =
    r"(?P<marker>\s*(?:/\s*(?:yr|year|annum)\b|per\s+(?:year|annum)\b|a\s+year\b|annually\b|p\.?a\.?(?:\s|$)))?";

static SALARY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    build(
        r"\b(?:salary|salaries|pay|paying|paid|compensation|comp|wages?|rate|base|ote|earn(?:ing)?s?|remuneration|stipend)\b"
            .to_string(),
    )
});
static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| build(r"\b(?:usd|gbp|eur)\b".to_string()));
static STATE_BEFORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]{2},?\s*$").expect("valid regex"));

/// Characters before a prose match searched for a salary word.
const KEYWORD_WINDOW: usize = 40;
/// Characters after a prose match searched for a currency code.
const CODE_WINDOW: usize = 8;

/// Where the text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A dedicated salary field: every figure is meant as pay.
    Field,
    /// Free description text: a figure needs evidence that it is pay.
    Prose,
}

fn build(pattern: String) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("salary pattern is valid")
}

static HOURLY_RANGE: LazyLock<Regex> =
    LazyLock::new(|| build(format!("{CUR}{LO}{SEP}{HI}{HOURLY}")));
static HOURLY_SINGLE: LazyLock<Regex> = LazyLock::new(|| build(format!("{CUR}{LO}{HOURLY}")));
static K_RANGE: LazyLock<Regex> =
    LazyLock::new(|| build(format!(r"{CUR}{LO}\s*k?{SEP}{HI}\s*k\b")));
static FULL_RANGE: LazyLock<Regex> = LazyLock::new(|| build(format!("{CUR}{LO}{SEP}{HI}")));
static K_SINGLE: LazyLock<Regex> = LazyLock::new(|| build(format!(r"{CUR}{LO}\s*k\b")));
static FULL_SINGLE: LazyLock<Regex> = LazyLock::new(|| build(format!("{CUR}{LO}{ANNUAL}")));

#[derive(Debug, Clone, Copy)]
enum Shape {
    Range,
    Single,
    /// Single figure that needs an annual marker or at least five digits.
    MarkedSingle,
}

struct SalaryRule {
    pattern: &'static LazyLock<Regex>,
    period: SalaryPeriod,
    multiplier: f64,
    shape: Shape,
}

static RULES: [SalaryRule; 6] = [
    SalaryRule {
        pattern: &HOURLY_RANGE,
        period: SalaryPeriod::Hourly,
        multiplier: 1.0,
        shape: Shape::Range,
    },
    SalaryRule {
        pattern: &HOURLY_SINGLE,
        period: SalaryPeriod::Hourly,
        multiplier: 1.0,
        shape: Shape::Single,
    },
    SalaryRule {
        pattern: &K_RANGE,
        period: SalaryPeriod::Annual,
        multiplier: 1000.0,
        shape: Shape::Range,
    },
    SalaryRule {
        pattern: &FULL_RANGE,
        period: SalaryPeriod::Annual,
        multiplier: 1.0,
        shape: Shape::Range,
    },
    SalaryRule {
        pattern: &K_SINGLE,
        period: SalaryPeriod::Annual,
        multiplier: 1000.0,
        shape: Shape::Single,
    },
    SalaryRule {
        pattern: &FULL_SINGLE,
        period: SalaryPeriod::Annual,
        multiplier: 1.0,
        shape: Shape::MarkedSingle,
    },
];

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

fn currency(symbol: Option<&str>, text: &str) -> String {
    let code = match symbol {
        Some("£") => "GBP",
        Some("€") => "EUR",
        Some(_) => "USD",
        None => {
            let upper = text.to_uppercase();
            if upper.contains("GBP") {
                "GBP"
            } else if upper.contains("EUR") {
                "EUR"
            } else {
                "USD"
            }
        }
    };
    code.to_string()
}

pub fn is_plausible(min: f64, max: f64, period: SalaryPeriod) -> bool {
    let (lo, hi) = match period {
        SalaryPeriod::Hourly => (MIN_HOURLY, MAX_HOURLY),
        SalaryPeriod::Annual => (MIN_ANNUAL, MAX_ANNUAL),
    };
    (lo..=hi).contains(&min) && (lo..=hi).contains(&max)
}

/// The last `n` characters of `text`.
fn tail(text: &str, n: usize) -> &str {
    match text.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((i, _)) => &text[i..],
        None => text,
    }
}

/// The first `n` characters of `text`.
fn head(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// `401k` / `401(k)` retirement plans.
fn is_retirement_plan(lo: &str, after: &str) -> bool {
    lo == "401" && {
        let after = after.trim_start().to_ascii_lowercase();
        after.starts_with('k') || after.starts_with("(k)")
    }
}

/// A bare five-digit figure right after a state abbreviation is a ZIP code.
fn is_postal_code(lo: &str, before: &str) -> bool {
    lo.len() == 5 && lo.chars().all(|c| c.is_ascii_digit()) && STATE_BEFORE.is_match(before)
}

impl SalaryRule {
    fn has_pay_evidence(&self, caps: &Captures<'_>, before: &str, after: &str) -> bool {
        caps.name("cur").is_some()
            || caps.name("marker").is_some()
            || self.period == SalaryPeriod::Hourly
            || SALARY_WORD.is_match(tail(before, KEYWORD_WINDOW))
            || CURRENCY_CODE.is_match(head(after, CODE_WINDOW))
    }

    fn range_from(&self, caps: &Captures<'_>, text: &str, origin: Origin) -> Option<SalaryRange> {
        let whole = caps.get(0)?;
        let lo_match = caps.name("lo")?;
        let lo_raw = lo_match.as_str();
        let before = &text[..whole.start()];

        if is_retirement_plan(lo_raw, &text[lo_match.end()..]) || is_postal_code(lo_raw, before) {
            return None;
        }
        if origin == Origin::Prose && !self.has_pay_evidence(caps, before, &text[whole.end()..]) {
            return None;
        }

        let lo = parse_number(lo_raw)? * self.multiplier;
        let hi = match self.shape {
            Shape::Range => parse_number(caps.name("hi")?.as_str())? * self.multiplier,
            Shape::Single => lo,
            Shape::MarkedSingle => {
                let digits = lo_raw.chars().filter(char::is_ascii_digit).count();
                if caps.name("marker").is_none() && digits < 5 {
                    return None;
                }
                lo
            }
        };
        let (min, max) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        if !is_plausible(min, max, self.period) {
            tracing::trace!(min, max, period = %self.period, "Implausible salary match discarded");
            return None;
        }
        Some(SalaryRange {
            min,
            max,
            currency: currency(caps.name("cur").map(|m| m.as_str()), text),
            period: self.period,
        })
    }
}

fn first_match(text: &str, origin: Origin) -> Option<SalaryRange> {
    RULES.iter().find_map(|rule| {
        rule.pattern
            .captures_iter(text)
            .find_map(|caps| rule.range_from(&caps, text, origin))
    })
}

/// First plausible salary in a dedicated salary field.
pub fn extract_salary(text: &str) -> Option<SalaryRange> {
    first_match(text, Origin::Field)
}

/// First plausible salary in description text.
///
/// A figure only counts when it carries a currency symbol or code, a period
/// marker, or follows a pay word such as "salary" or "compensation".
pub fn extract_salary_from_prose(text: &str) -> Option<SalaryRange> {
    first_match(text, Origin::Prose)
}
