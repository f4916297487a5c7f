use std::path::Path;

use anyhow::{Context, Result};
use jobsift_core::models::{CanonicalJobRecord, PipelineOutput};
use serde::Serialize;

/// Flat CSV view of a [`CanonicalJobRecord`].
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    source: &'a str,
    url: &'a str,
    employment_type: &'a str,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: &'a str,
    salary_period: String,
    posted_at: String,
    date_confidence: String,
    recruiter: &'a str,
    deadline: String,
    first_seen_at: String,
    last_seen_at: String,
}

impl<'a> From<&'a CanonicalJobRecord> for CsvRow<'a> {
    fn from(record: &'a CanonicalJobRecord) -> Self {
        let salary = record.salary.as_ref();
        Self {
            id: &record.id,
            title: &record.title,
            company: &record.company,
            location: &record.location,
            source: &record.source,
            url: record.url.as_deref().unwrap_or_default(),
            employment_type: record.employment_type.as_str(),
            salary_min: salary.map(|s| s.min),
            salary_max: salary.map(|s| s.max),
            salary_currency: salary.map(|s| s.currency.as_str()).unwrap_or_default(),
            salary_period: salary.map(|s| s.period.to_string()).unwrap_or_default(),
            posted_at: record.posted_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            date_confidence: record.date_confidence.to_string(),
            recruiter: record.recruiter_name.as_deref().unwrap_or_default(),
            deadline: record.deadline.map(|d| d.to_string()).unwrap_or_default(),
            first_seen_at: record.first_seen_at.to_rfc3339(),
            last_seen_at: record.last_seen_at.to_rfc3339(),
        }
    }
}

/// Write `jobs` as CSV with a header row.
pub fn write_csv(jobs: &[CanonicalJobRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for job in jobs {
        writer.serialize(CsvRow::from(job))?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = jobs.len(), "CSV export written");
    Ok(())
}

/// Write the run envelope to `path`, or to stdout when none is given.
pub async fn write_output(output: &PipelineOutput, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(output)?;
    match path {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), jobs = output.jobs.len(), "Run output written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use jobsift_core::models::{DateConfidence, EmploymentType, SalaryPeriod, SalaryRange};

    use super::*;

    fn job() -> CanonicalJobRecord {
        let seen = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        CanonicalJobRecord {
            id: "abc".to_string(),
            title: "Data Engineer".to_string(),
            company: "Acme, Inc.".to_string(),
            location: "Austin, TX".to_string(),
            url: Some("https://jobs.example.com/1".to_string()),
            source: "board".to_string(),
            salary: Some(SalaryRange {
                min: 40.0,
                max: 60.0,
                currency: "USD".to_string(),
                period: SalaryPeriod::Hourly,
            }),
            employment_type: EmploymentType::Contract,
            posted_at: Some(seen),
            date_confidence: DateConfidence::Parsed,
            recruiter_name: None,
            deadline: NaiveDate::from_ymd_opt(2026, 4, 1),
            excerpt: String::new(),
            first_seen_at: seen,
            last_seen_at: seen,
        }
    }

    #[test]
    fn csv_has_header_and_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");

        write_csv(&[job()], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("id,title,company,location,source,url"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Acme, Inc.\""));
        assert!(row.contains("contract,40.0,60.0,USD,hourly"));
        assert!(row.contains("2026-04-01"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_csv(&[], &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
