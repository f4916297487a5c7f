use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::escalation::{AttemptRecord, EscalationState, Strategy};

/// Hours in a full-time working year, used to annualize hourly pay.
pub const HOURS_PER_YEAR: f64 = 2080.0;

/// Loosely-typed job data exactly as an extractor found it.
///
/// Every field is best effort. Only the normalizer interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub salary_text: Option<String>,
    pub date_text: Option<String>,
    pub excerpt: Option<String>,
    /// Explicit timestamp, when the payload carries a structured one.
    pub posted_at: Option<DateTime<Utc>>,
    /// Structured employment type string (e.g. `FULL_TIME`).
    pub employment_type: Option<String>,
    pub deadline_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalaryPeriod {
    Hourly,
    Annual,
}

impl fmt::Display for SalaryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SalaryPeriod::Hourly => write!(f, "hourly"),
            SalaryPeriod::Annual => write!(f, "annual"),
        }
    }
}

/// A plausible pay range. Hourly figures are kept as hourly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
    pub period: SalaryPeriod,
}

impl SalaryRange {
    /// Annual-equivalent `(min, max)` for comparing hourly and annual pay.
    pub fn annualized(&self) -> (f64, f64) {
        match self.period {
            SalaryPeriod::Hourly => (self.min * HOURS_PER_YEAR, self.max * HOURS_PER_YEAR),
            SalaryPeriod::Annual => (self.min, self.max),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Seasonal,
    #[default]
    Unknown,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full-time",
            EmploymentType::PartTime => "part-time",
            EmploymentType::Contract => "contract",
            EmploymentType::Internship => "internship",
            EmploymentType::Seasonal => "seasonal",
            EmploymentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full-time" => Ok(EmploymentType::FullTime),
            "part-time" => Ok(EmploymentType::PartTime),
            "contract" => Ok(EmploymentType::Contract),
            "internship" => Ok(EmploymentType::Internship),
            "seasonal" => Ok(EmploymentType::Seasonal),
            "unknown" => Ok(EmploymentType::Unknown),
            _ => Err(format!("Unknown employment type: {s}")),
        }
    }
}

/// How much a record's `posted_at` can be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateConfidence {
    /// Explicit timestamp or resolved date text.
    Parsed,
    /// Collection time standing in for an unreadable date.
    Scraped,
    /// No date signal at all.
    #[default]
    Unknown,
}

impl DateConfidence {
    /// Ordering used by merges: higher never gets replaced by lower.
    pub fn rank(&self) -> u8 {
        match self {
            DateConfidence::Parsed => 2,
            DateConfidence::Scraped => 1,
            DateConfidence::Unknown => 0,
        }
    }
}

impl fmt::Display for DateConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateConfidence::Parsed => write!(f, "parsed"),
            DateConfidence::Scraped => write!(f, "scraped"),
            DateConfidence::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for DateConfidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parsed" => Ok(DateConfidence::Parsed),
            "scraped" => Ok(DateConfidence::Scraped),
            "unknown" => Ok(DateConfidence::Unknown),
            _ => Err(format!("Unknown date confidence: {s}")),
        }
    }
}

/// A normalized posting as held in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalJobRecord {
    /// Identity key. Never changes once assigned.
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: Option<String>,
    pub source: String,
    pub salary: Option<SalaryRange>,
    pub employment_type: EmploymentType,
    pub posted_at: Option<DateTime<Utc>>,
    pub date_confidence: DateConfidence,
    pub recruiter_name: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub excerpt: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl CanonicalJobRecord {
    pub fn is_recruiter(&self) -> bool {
        self.recruiter_name.is_some()
    }

    /// Date used by retention: `posted_at` unless it carries no signal.
    pub fn best_known_date(&self) -> DateTime<Utc> {
        match (self.date_confidence, self.posted_at) {
            (DateConfidence::Unknown, _) | (_, None) => self.last_seen_at,
            (_, Some(posted)) => posted,
        }
    }
}

/// One failed source in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    /// Last strategy attempted before giving up, if any ran.
    pub strategy: Option<Strategy>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-source summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub name: String,
    pub final_state: EscalationState,
    pub fetched: usize,
    pub trail: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub scraped_at: DateTime<Utc>,
    pub total_fetched: usize,
    pub dropped_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub store_size: usize,
    pub sources: Vec<SourceReport>,
    pub per_source_errors: Vec<SourceError>,
}

/// What a run produces: the merged corpus plus how it got there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub jobs: Vec<CanonicalJobRecord>,
    pub metadata: RunMetadata,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
