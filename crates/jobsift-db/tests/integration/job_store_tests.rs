use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use jobsift_core::models::{
    CanonicalJobRecord, DateConfidence, EmploymentType, SalaryPeriod, SalaryRange,
};
use jobsift_core::store::MergeSummary;
use jobsift_core::traits::JobStore;
use jobsift_db::PgJobStore;

use crate::integration::common::setup_test_db;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

fn record(id: &str, seen: DateTime<Utc>) -> CanonicalJobRecord {
    CanonicalJobRecord {
        id: id.to_string(),
        title: "Backend Engineer".to_string(),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        url: Some(format!("https://jobs.example.com/{id}")),
        source: "alpha".to_string(),
        salary: None,
        employment_type: EmploymentType::Unknown,
        posted_at: None,
        date_confidence: DateConfidence::Unknown,
        recruiter_name: None,
        deadline: None,
        excerpt: String::new(),
        first_seen_at: seen,
        last_seen_at: seen,
    }
}

#[tokio::test]
async fn all_fields_survive_a_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut full = record("full", now());
    full.salary = Some(SalaryRange {
        min: 40.0,
        max: 60.0,
        currency: "USD".to_string(),
        period: SalaryPeriod::Hourly,
    });
    full.employment_type = EmploymentType::Contract;
    full.posted_at = Some(now() - TimeDelta::days(2));
    full.date_confidence = DateConfidence::Parsed;
    full.recruiter_name = Some("Robert Half".to_string());
    full.deadline = NaiveDate::from_ymd_opt(2026, 4, 30);
    full.excerpt = "Six month contract".to_string();

    let summary = store.merge(vec![full.clone()], now()).await.unwrap();
    assert_eq!(summary.inserted, 1);

    let loaded = store.get("full").await.unwrap().expect("record stored");
    assert_eq!(loaded, full);
}

#[tokio::test]
async fn reingesting_keeps_one_row_and_advances_last_seen() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    store.merge(vec![record("a", now())], now()).await.unwrap();
    let later = now() + TimeDelta::hours(6);
    let summary = store.merge(vec![record("a", later)], later).await.unwrap();

    assert_eq!(
        summary,
        MergeSummary {
            inserted: 0,
            updated: 0,
            unchanged: 1
        }
    );
    assert_eq!(store.len().await.unwrap(), 1);

    let stored = store.get("a").await.unwrap().unwrap();
    assert_eq!(stored.first_seen_at, now());
    assert_eq!(stored.last_seen_at, later);
}

#[tokio::test]
async fn merge_never_degrades_existing_fields() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut rich = record("r", now());
    rich.salary = Some(SalaryRange {
        min: 80_000.0,
        max: 120_000.0,
        currency: "USD".to_string(),
        period: SalaryPeriod::Annual,
    });
    rich.posted_at = Some(now() - TimeDelta::days(1));
    rich.date_confidence = DateConfidence::Parsed;
    rich.excerpt = "Short".to_string();
    store.merge(vec![rich.clone()], now()).await.unwrap();

    let mut sparse = record("r", now());
    sparse.title = String::new();
    sparse.excerpt = "A much longer description of the role".to_string();
    sparse.employment_type = EmploymentType::FullTime;
    let summary = store.merge(vec![sparse], now()).await.unwrap();
    assert_eq!(summary.updated, 1);

    let stored = store.get("r").await.unwrap().unwrap();
    assert_eq!(stored.title, "Backend Engineer");
    assert_eq!(stored.salary, rich.salary);
    assert_eq!(stored.posted_at, rich.posted_at);
    assert_eq!(stored.date_confidence, DateConfidence::Parsed);
    assert_eq!(stored.excerpt, "A much longer description of the role");
    assert_eq!(stored.employment_type, EmploymentType::FullTime);
}

#[tokio::test]
async fn duplicates_within_one_batch_collapse() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let summary = store
        .merge(vec![record("d", now()), record("d", now()), record("e", now())], now())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(store.len().await.unwrap(), 2);

    let ids: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["d", "e"]);
}

#[tokio::test]
async fn concurrent_merges_of_overlapping_batches_keep_every_field() {
    let (pool, _container) = setup_test_db().await;
    let left = PgJobStore::new(pool.clone());
    let right = PgJobStore::new(pool);

    let ids: Vec<String> = (0..20).map(|i| format!("job-{i:02}")).collect();
    let salaried: Vec<CanonicalJobRecord> = ids
        .iter()
        .map(|id| {
            let mut r = record(id, now());
            r.salary = Some(SalaryRange {
                min: 90_000.0,
                max: 110_000.0,
                currency: "USD".to_string(),
                period: SalaryPeriod::Annual,
            });
            r
        })
        .collect();
    let bare: Vec<CanonicalJobRecord> = ids.iter().rev().map(|id| record(id, now())).collect();

    let (a, b) = tokio::join!(left.merge(salaried, now()), right.merge(bare, now()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.inserted + b.inserted, ids.len());
    assert_eq!(left.len().await.unwrap(), ids.len());
    for stored in left.list().await.unwrap() {
        assert!(stored.salary.is_some(), "{} lost its salary", stored.id);
        assert_eq!(stored.first_seen_at, now());
    }
}

#[tokio::test]
async fn prune_uses_best_known_date() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut old_posting = record("old-posting", now());
    old_posting.posted_at = Some(now() - TimeDelta::days(60));
    old_posting.date_confidence = DateConfidence::Parsed;

    let undated_recent = record("undated-recent", now());
    let undated_stale = record("undated-stale", now() - TimeDelta::days(45));

    let mut unknown_with_timestamp = record("unknown-ts", now());
    unknown_with_timestamp.posted_at = Some(now() - TimeDelta::days(90));

    store
        .merge(vec![old_posting, undated_recent, unknown_with_timestamp], now())
        .await
        .unwrap();
    store
        .merge(vec![undated_stale], now() - TimeDelta::days(45))
        .await
        .unwrap();
    assert_eq!(store.len().await.unwrap(), 4);

    let removed = store.prune(TimeDelta::days(30), now()).await.unwrap();

    assert_eq!(removed, 2);
    let mut ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["undated-recent", "unknown-ts"]);
}

#[tokio::test]
async fn health_check_succeeds() {
    let (pool, _container) = setup_test_db().await;
    PgJobStore::new(pool).health_check().await.unwrap();
}
