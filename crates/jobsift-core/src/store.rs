//! Identity-keyed corpus storage.
//!
//! All stores share [`merge_record`], so the never-degrade rules hold no
//! matter where the corpus lives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{CanonicalJobRecord, EmploymentType, PipelineOutput};
use crate::traits::JobStore;

/// Outcome counts of one merge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeSummary {
    pub fn add(&mut self, other: MergeSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

fn fill_text(current: &mut String, incoming: &str) -> bool {
    if current.is_empty() && !incoming.is_empty() {
        *current = incoming.to_string();
        return true;
    }
    false
}

fn fill_opt<T: Clone>(current: &mut Option<T>, incoming: &Option<T>) -> bool {
    if current.is_none() && incoming.is_some() {
        current.clone_from(incoming);
        return true;
    }
    false
}

/// Fold `incoming` into `existing` without losing information.
///
/// `last_seen_at` always advances to `now`. Other fields only change when the
/// incoming value strictly adds information. Returns true if any field other
/// than `last_seen_at` changed.
pub fn merge_record(
    existing: &mut CanonicalJobRecord,
    incoming: &CanonicalJobRecord,
    now: DateTime<Utc>,
) -> bool {
    let mut changed = false;

    changed |= fill_text(&mut existing.title, &incoming.title);
    changed |= fill_text(&mut existing.company, &incoming.company);
    changed |= fill_text(&mut existing.location, &incoming.location);
    changed |= fill_opt(&mut existing.url, &incoming.url);

    if incoming.excerpt.chars().count() > existing.excerpt.chars().count() {
        existing.excerpt.clone_from(&incoming.excerpt);
        changed = true;
    }

    changed |= fill_opt(&mut existing.salary, &incoming.salary);
    changed |= fill_opt(&mut existing.recruiter_name, &incoming.recruiter_name);
    changed |= fill_opt(&mut existing.deadline, &incoming.deadline);

    if existing.employment_type == EmploymentType::Unknown
        && incoming.employment_type != EmploymentType::Unknown
    {
        existing.employment_type = incoming.employment_type;
        changed = true;
    }

    if incoming.date_confidence.rank() > existing.date_confidence.rank() {
        existing.posted_at = incoming.posted_at;
        existing.date_confidence = incoming.date_confidence;
        changed = true;
    }

    if now > existing.last_seen_at {
        existing.last_seen_at = now;
    }
    changed
}

/// Records whose best-known date is at or after `now - horizon` survive.
fn is_expired(record: &CanonicalJobRecord, horizon: TimeDelta, now: DateTime<Utc>) -> bool {
    record.best_known_date() < now - horizon
}

type Corpus = BTreeMap<String, CanonicalJobRecord>;

fn merge_into(corpus: &mut Corpus, records: Vec<CanonicalJobRecord>, now: DateTime<Utc>) -> MergeSummary {
    let mut summary = MergeSummary::default();
    for mut record in records {
        match corpus.get_mut(&record.id) {
            Some(existing) => {
                if merge_record(existing, &record, now) {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
            None => {
                record.first_seen_at = now;
                record.last_seen_at = now;
                corpus.insert(record.id.clone(), record);
                summary.inserted += 1;
            }
        }
    }
    summary
}

fn prune_expired(corpus: &mut Corpus, horizon: TimeDelta, now: DateTime<Utc>) -> usize {
    let before = corpus.len();
    corpus.retain(|_, record| !is_expired(record, horizon, now));
    before - corpus.len()
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Ordered in-memory corpus. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, CanonicalJobRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CanonicalJobRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Arc::new(Mutex::new(map)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Corpus> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<CanonicalJobRecord> {
        self.lock().get(id).cloned()
    }

    fn merge_sync(&self, records: Vec<CanonicalJobRecord>, now: DateTime<Utc>) -> MergeSummary {
        merge_into(&mut self.lock(), records, now)
    }

    fn prune_sync(&self, horizon: TimeDelta, now: DateTime<Utc>) -> usize {
        prune_expired(&mut self.lock(), horizon, now)
    }

    fn copy(&self) -> Corpus {
        self.lock().clone()
    }

    fn replace(&self, corpus: Corpus) {
        *self.lock() = corpus;
    }

    fn snapshot(&self) -> Vec<CanonicalJobRecord> {
        self.lock().values().cloned().collect()
    }
}

impl JobStore for MemoryStore {
    async fn merge(
        &self,
        records: Vec<CanonicalJobRecord>,
        now: DateTime<Utc>,
    ) -> Result<MergeSummary, AppError> {
        Ok(self.merge_sync(records, now))
    }

    async fn prune(&self, horizon: TimeDelta, now: DateTime<Utc>) -> Result<usize, AppError> {
        Ok(self.prune_sync(horizon, now))
    }

    async fn list(&self) -> Result<Vec<CanonicalJobRecord>, AppError> {
        Ok(self.snapshot())
    }

    async fn len(&self) -> Result<usize, AppError> {
        Ok(self.lock().len())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Corpus file contents: a previous run's output or a bare record array.
#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Envelope(PipelineOutput),
    Records(Vec<CanonicalJobRecord>),
}

/// A [`MemoryStore`] backed by a JSON file.
///
/// Loaded once on open; every mutation rewrites the file through a temporary
/// sibling and a rename. Changes are applied to a copy of the corpus and only
/// become visible once the file write succeeded.
#[derive(Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => match serde_json::from_str::<CorpusFile>(&text)? {
                CorpusFile::Envelope(output) => output.jobs,
                CorpusFile::Records(records) => records,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(AppError::StoreError(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        tracing::debug!(path = %path.display(), records = records.len(), "Corpus loaded");

        Ok(Self {
            path,
            memory: MemoryStore::from_records(records),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `value` to the backing file atomically.
    async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(value)?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StoreError(format!("failed to create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| AppError::StoreError(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::StoreError(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    /// Persist `next` and swap it in. Callers hold the write lock.
    async fn commit(&self, next: Corpus) -> Result<(), AppError> {
        self.write_json(&next.values().collect::<Vec<_>>()).await?;
        self.memory.replace(next);
        Ok(())
    }
}

impl JobStore for JsonFileStore {
    async fn merge(
        &self,
        records: Vec<CanonicalJobRecord>,
        now: DateTime<Utc>,
    ) -> Result<MergeSummary, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.memory.copy();
        let summary = merge_into(&mut next, records, now);
        self.commit(next).await?;
        Ok(summary)
    }

    async fn prune(&self, horizon: TimeDelta, now: DateTime<Utc>) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.memory.copy();
        let removed = prune_expired(&mut next, horizon, now);
        if removed > 0 {
            self.commit(next).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<CanonicalJobRecord>, AppError> {
        Ok(self.memory.snapshot())
    }

    async fn len(&self) -> Result<usize, AppError> {
        Ok(self.memory.lock().len())
    }
}
