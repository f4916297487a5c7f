use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use jobsift_core::error::AppError;
use jobsift_core::models::{CanonicalJobRecord, SalaryRange};
use jobsift_core::store::{MergeSummary, merge_record};
use jobsift_core::traits::JobStore;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres, Transaction};

/// Deletes rows whose best-known date (see `CanonicalJobRecord::best_known_date`)
/// is older than `$1`.
const PRUNE: &str = r#"
    DELETE FROM job_records
    WHERE (CASE WHEN date_confidence <> 'unknown' AND posted_at IS NOT NULL
                THEN posted_at ELSE last_seen_at END) < $1
"#;

/// PostgreSQL-backed corpus.
///
/// Merges run in one transaction per batch, visiting ids in sorted order.
/// Existing rows are locked with `SELECT ... FOR UPDATE` and folded through
/// the same `merge_record` the in-memory store uses. New rows are inserted
/// with `ON CONFLICT DO NOTHING`; losing that race to another transaction
/// re-reads the winner's row under lock and merges into it.
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one record by identity key.
    pub async fn get(&self, id: &str) -> Result<Option<CanonicalJobRecord>, AppError> {
        let row = sqlx::query_as::<_, JobRecordRow>(r#"SELECT * FROM job_records WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(CanonicalJobRecord::try_from).transpose()
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
    ) -> Result<Option<CanonicalJobRecord>, AppError> {
        let row = sqlx::query_as::<_, JobRecordRow>(
            r#"SELECT * FROM job_records WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)?;

        row.map(CanonicalJobRecord::try_from).transpose()
    }

    /// Insert a new row. `false` when another transaction got there first.
    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        record: &CanonicalJobRecord,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_records (
                id, title, company, location, url, source, salary, employment_type,
                posted_at, date_confidence, recruiter_name, deadline, excerpt,
                first_seen_at, last_seen_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.url)
        .bind(&record.source)
        .bind(record.salary.as_ref().map(Json))
        .bind(record.employment_type.as_str())
        .bind(record.posted_at)
        .bind(record.date_confidence.to_string())
        .bind(&record.recruiter_name)
        .bind(record.deadline)
        .bind(&record.excerpt)
        .bind(record.first_seen_at)
        .bind(record.last_seen_at)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    /// Overwrite the mutable columns of a locked row. `first_seen_at` is never touched.
    async fn update(
        tx: &mut Transaction<'_, Postgres>,
        record: &CanonicalJobRecord,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE job_records SET
                title = $2,
                company = $3,
                location = $4,
                url = $5,
                salary = $6,
                employment_type = $7,
                posted_at = $8,
                date_confidence = $9,
                recruiter_name = $10,
                deadline = $11,
                excerpt = $12,
                last_seen_at = $13
            WHERE id = $1
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.url)
        .bind(record.salary.as_ref().map(Json))
        .bind(record.employment_type.as_str())
        .bind(record.posted_at)
        .bind(record.date_confidence.to_string())
        .bind(&record.recruiter_name)
        .bind(record.deadline)
        .bind(&record.excerpt)
        .bind(record.last_seen_at)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    /// Merge `incoming` into a locked existing row.
    async fn merge_locked(
        tx: &mut Transaction<'_, Postgres>,
        mut current: CanonicalJobRecord,
        incoming: &CanonicalJobRecord,
        now: DateTime<Utc>,
        summary: &mut MergeSummary,
    ) -> Result<(), AppError> {
        if merge_record(&mut current, incoming, now) {
            summary.updated += 1;
        } else {
            summary.unchanged += 1;
        }
        Self::update(tx, &current).await
    }
}

fn store_error(e: sqlx::Error) -> AppError {
    AppError::StoreError(e.to_string())
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRecordRow {
    id: String,
    title: String,
    company: String,
    location: String,
    url: Option<String>,
    source: String,
    salary: Option<Json<SalaryRange>>,
    employment_type: String,
    posted_at: Option<DateTime<Utc>>,
    date_confidence: String,
    recruiter_name: Option<String>,
    deadline: Option<NaiveDate>,
    excerpt: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl TryFrom<JobRecordRow> for CanonicalJobRecord {
    type Error = AppError;

    fn try_from(row: JobRecordRow) -> Result<Self, Self::Error> {
        let employment_type = row.employment_type.parse().map_err(|e| {
            AppError::StoreError(format!("job_records row '{}': {e}", row.id))
        })?;
        let date_confidence = row.date_confidence.parse().map_err(|e| {
            AppError::StoreError(format!("job_records row '{}': {e}", row.id))
        })?;

        Ok(CanonicalJobRecord {
            id: row.id,
            title: row.title,
            company: row.company,
            location: row.location,
            url: row.url,
            source: row.source,
            salary: row.salary.map(|Json(salary)| salary),
            employment_type,
            posted_at: row.posted_at,
            date_confidence,
            recruiter_name: row.recruiter_name,
            deadline: row.deadline,
            excerpt: row.excerpt,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        })
    }
}

// -- Trait implementation --

impl JobStore for PgJobStore {
    async fn merge(
        &self,
        records: Vec<CanonicalJobRecord>,
        now: DateTime<Utc>,
    ) -> Result<MergeSummary, AppError> {
        let mut records = records;
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut summary = MergeSummary::default();

        for mut incoming in records {
            if let Some(current) = Self::lock(&mut tx, &incoming.id).await? {
                Self::merge_locked(&mut tx, current, &incoming, now, &mut summary).await?;
                continue;
            }

            incoming.first_seen_at = now;
            incoming.last_seen_at = now;
            if Self::insert(&mut tx, &incoming).await? {
                summary.inserted += 1;
                continue;
            }

            tracing::debug!(id = %incoming.id, "Concurrent insert won, merging into it");
            let current = Self::lock(&mut tx, &incoming.id).await?.ok_or_else(|| {
                AppError::StoreError(format!("job_records row '{}' vanished mid-merge", incoming.id))
            })?;
            Self::merge_locked(&mut tx, current, &incoming, now, &mut summary).await?;
        }

        tx.commit().await.map_err(store_error)?;
        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Merged into PostgreSQL corpus"
        );
        Ok(summary)
    }

    async fn prune(&self, horizon: TimeDelta, now: DateTime<Utc>) -> Result<usize, AppError> {
        let result = sqlx::query(PRUNE)
            .bind(now - horizon)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn list(&self) -> Result<Vec<CanonicalJobRecord>, AppError> {
        let rows = sqlx::query_as::<_, JobRecordRow>(r#"SELECT * FROM job_records ORDER BY id"#)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter().map(CanonicalJobRecord::try_from).collect()
    }

    async fn len(&self) -> Result<usize, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_records")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(count as usize)
    }
}
