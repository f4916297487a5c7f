//! Run orchestration: fan out over sources, join, normalize, merge.
//!
//! Source tasks share nothing mutable. Each returns its own
//! [`SourceOutcome`]; normalization and the store merge happen once, after
//! every task has finished.

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DEFAULT_CONCURRENCY;
use crate::error::AppError;
use crate::escalation::{EscalationController, EscalationMode, SourceOutcome};
use crate::models::{
    CanonicalJobRecord, EmploymentType, PipelineOutput, RunMetadata, SourceReport,
};
use crate::normalize::{Normalizer, RecencyFilter};
use crate::registry::{SearchQuery, SourceRegistry};
use crate::store::MergeSummary;
use crate::traits::{Fetcher, JobStore, NoRenderer};

/// Invocation parameters for one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub query: SearchQuery,
    pub recency: RecencyFilter,
    pub employment_type: Option<EmploymentType>,
    pub mode: EscalationMode,
}

impl RunRequest {
    pub fn new(query: SearchQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn with_recency(mut self, recency: RecencyFilter) -> Self {
        self.recency = recency;
        self
    }

    pub fn with_employment_type(mut self, employment_type: Option<EmploymentType>) -> Self {
        self.employment_type = employment_type;
        self
    }

    pub fn exhaustive(mut self, exhaustive: bool) -> Self {
        self.mode = if exhaustive {
            EscalationMode::Exhaustive
        } else {
            EscalationMode::FirstSuccess
        };
        self
    }

    /// Whether `record` passes the output filters.
    pub fn admits(&self, record: &CanonicalJobRecord, now: DateTime<Utc>) -> bool {
        self.recency.admits(record, now)
            && self
                .employment_type
                .is_none_or(|ty| ty == record.employment_type)
    }
}

/// Events emitted during a run for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Started {
        run_id: Uuid,
        sources: usize,
    },
    SourceFinished {
        outcome: &'a SourceOutcome,
    },
    RecordDropped {
        source: &'a str,
        error: &'a AppError,
    },
    Merged {
        summary: MergeSummary,
        store_size: usize,
    },
    Finished {
        metadata: &'a RunMetadata,
    },
    Pruned {
        removed: usize,
        horizon_days: i64,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Started { run_id, sources } => {
                tracing::info!(%run_id, sources, "Run started");
            }
            PipelineEvent::SourceFinished { outcome } => match &outcome.error {
                None => tracing::info!(
                    source = %outcome.source,
                    state = %outcome.final_state,
                    fetched = outcome.records.len(),
                    "Source finished"
                ),
                Some(err) => tracing::warn!(
                    source = %outcome.source,
                    state = %outcome.final_state,
                    kind = %err.kind,
                    error = %err.message,
                    "Source failed"
                ),
            },
            PipelineEvent::RecordDropped { source, error } => {
                tracing::debug!(%source, %error, "Record dropped");
            }
            PipelineEvent::Merged {
                summary,
                store_size,
            } => {
                tracing::info!(
                    inserted = summary.inserted,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    store_size,
                    "Corpus merged"
                );
            }
            PipelineEvent::Finished { metadata } => {
                tracing::info!(
                    run_id = %metadata.run_id,
                    total_fetched = metadata.total_fetched,
                    dropped = metadata.dropped_records,
                    failed_sources = metadata.per_source_errors.len(),
                    "Run finished"
                );
            }
            PipelineEvent::Pruned {
                removed,
                horizon_days,
            } => {
                tracing::info!(removed, horizon_days, "Corpus pruned");
            }
        }
    }
}

/// The ingestion pipeline over a fetcher, an optional renderer and a store.
pub struct Pipeline<F, S, R = NoRenderer, P = TracingPipelineReporter>
where
    F: Fetcher,
    S: JobStore,
    R: Fetcher,
    P: PipelineReporter,
{
    controller: EscalationController<F, R>,
    registry: SourceRegistry,
    store: S,
    normalizer: Normalizer,
    reporter: P,
    max_concurrency: usize,
}

impl<F, S, R> Pipeline<F, S, R, TracingPipelineReporter>
where
    F: Fetcher,
    S: JobStore,
    R: Fetcher,
{
    pub fn new(controller: EscalationController<F, R>, registry: SourceRegistry, store: S) -> Self {
        Self {
            controller,
            registry,
            store,
            normalizer: Normalizer::default(),
            reporter: TracingPipelineReporter,
            max_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl<F, S, R, P> Pipeline<F, S, R, P>
where
    F: Fetcher,
    S: JobStore,
    R: Fetcher,
    P: PipelineReporter,
{
    pub fn with_reporter<P2: PipelineReporter>(self, reporter: P2) -> Pipeline<F, S, R, P2> {
        Pipeline {
            controller: self.controller,
            registry: self.registry,
            store: self.store,
            normalizer: self.normalizer,
            reporter,
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run every registered source and merge what they produce.
    ///
    /// Source failures never abort the run; they are reported in
    /// `per_source_errors`. Only a store failure is returned as an error.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, AppError> {
        let run_id = Uuid::new_v4();
        let scraped_at = Utc::now();
        self.reporter.report(PipelineEvent::Started {
            run_id,
            sources: self.registry.len(),
        });

        let mut outcomes: Vec<(usize, SourceOutcome)> =
            futures::stream::iter(self.registry.iter().enumerate())
                .map(|(index, source)| async move {
                    let outcome = self
                        .controller
                        .run(source, &request.query, request.mode, cancel)
                        .await;
                    (index, outcome)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut records = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        let mut per_source_errors = Vec::new();
        let mut total_fetched = 0;
        let mut dropped_records = 0;

        for (_, outcome) in outcomes {
            self.reporter
                .report(PipelineEvent::SourceFinished { outcome: &outcome });
            total_fetched += outcome.records.len();

            for raw in &outcome.records {
                match self.normalizer.normalize(raw, &outcome.source, scraped_at) {
                    Ok(record) => records.push(record),
                    Err(error) => {
                        dropped_records += 1;
                        self.reporter.report(PipelineEvent::RecordDropped {
                            source: &outcome.source,
                            error: &error,
                        });
                    }
                }
            }

            reports.push(SourceReport {
                name: outcome.source,
                final_state: outcome.final_state,
                fetched: outcome.records.len(),
                trail: outcome.trail,
            });
            per_source_errors.extend(outcome.error);
        }

        let summary = self.store.merge(records, scraped_at).await?;
        let corpus = self.store.list().await?;
        let store_size = corpus.len();
        self.reporter.report(PipelineEvent::Merged {
            summary,
            store_size,
        });

        let mut jobs: Vec<CanonicalJobRecord> = corpus
            .into_iter()
            .filter(|record| request.admits(record, scraped_at))
            .collect();
        jobs.sort_by(|a, b| {
            b.best_known_date()
                .cmp(&a.best_known_date())
                .then_with(|| a.id.cmp(&b.id))
        });

        let metadata = RunMetadata {
            run_id,
            scraped_at,
            total_fetched,
            dropped_records,
            inserted: summary.inserted,
            updated: summary.updated,
            store_size,
            sources: reports,
            per_source_errors,
        };
        self.reporter
            .report(PipelineEvent::Finished { metadata: &metadata });

        Ok(PipelineOutput { jobs, metadata })
    }

    /// Retention pass over this pipeline's store.
    pub async fn prune(&self, retention: TimeDelta, now: DateTime<Utc>) -> Result<usize, AppError> {
        prune_store(&self.store, retention, now, &self.reporter).await
    }
}

/// Remove everything older than `retention` from `store`.
pub async fn prune_store<S: JobStore, P: PipelineReporter>(
    store: &S,
    retention: TimeDelta,
    now: DateTime<Utc>,
    reporter: &P,
) -> Result<usize, AppError> {
    let removed = store.prune(retention, now).await?;
    reporter.report(PipelineEvent::Pruned {
        removed,
        horizon_days: retention.num_days(),
    });
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::ErrorKind;
    use crate::escalation::{EscalationState, Strategy};
    use crate::models::DateConfidence;
    use crate::registry::SourceDefinition;
    use crate::store::MemoryStore;
    use crate::testutil::{MockExtractor, MockFetcher, Reply, canonical, job_line, listing_body};

    /// Records event names for assertions.
    #[derive(Clone, Default)]
    struct RecordingReporter {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineReporter for RecordingReporter {
        fn report(&self, event: PipelineEvent<'_>) {
            let name = match event {
                PipelineEvent::Started { .. } => "started".to_string(),
                PipelineEvent::SourceFinished { outcome } => format!("source:{}", outcome.source),
                PipelineEvent::RecordDropped { source, .. } => format!("dropped:{source}"),
                PipelineEvent::Merged { .. } => "merged".to_string(),
                PipelineEvent::Finished { .. } => "finished".to_string(),
                PipelineEvent::Pruned { removed, .. } => format!("pruned:{removed}"),
            };
            self.events.lock().unwrap().push(name);
        }
    }

    fn registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(
                    SourceDefinition::new(name, MockExtractor)
                        .with_plan(Strategy::Feed, format!("https://{name}.example.com/rss"))
                        .with_plan(Strategy::Api, format!("https://{name}.example.com/api"))
                        .with_plan(
                            Strategy::StaticDocument,
                            format!("https://{name}.example.com/jobs"),
                        ),
                )
                .unwrap();
        }
        registry
    }

    fn first_run_fetcher() -> MockFetcher {
        MockFetcher::new()
            .route("https://a.example.com/rss", Reply::ok(listing_body("a", 2)))
            .route("https://b.example.com/rss", Reply::Status(403))
            .route(
                "https://b.example.com/api",
                Reply::ok("<html><title>Attention Required! | Cloudflare</title></html>"),
            )
            .route("https://b.example.com/jobs", Reply::ok(listing_body("b", 5)))
            .route("https://c.example.com/rss", Reply::Status(500))
            .route("https://c.example.com/jobs", Reply::ok("<html>tiny</html>"))
    }

    #[tokio::test]
    async fn mixed_sources_end_to_end() {
        let store = MemoryStore::new();
        let reporter = RecordingReporter::default();
        let pipeline = Pipeline::new(
            EscalationController::new(first_run_fetcher()),
            registry(),
            store.clone(),
        )
        .with_reporter(reporter.clone())
        .with_max_concurrency(2);

        let output = pipeline
            .run(&RunRequest::new(SearchQuery::new(["engineer"])), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.jobs.len(), 7);
        assert_eq!(output.metadata.total_fetched, 7);
        assert_eq!(output.metadata.inserted, 7);
        assert_eq!(output.metadata.store_size, 7);
        assert_eq!(output.metadata.per_source_errors.len(), 1);
        let err = &output.metadata.per_source_errors[0];
        assert_eq!(err.source, "c");
        assert_eq!(err.kind, ErrorKind::ExhaustionError);

        let states: Vec<(String, EscalationState)> = output
            .metadata
            .sources
            .iter()
            .map(|s| (s.name.clone(), s.final_state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("a".to_string(), EscalationState::TryFeed),
                ("b".to_string(), EscalationState::TryStaticDocument),
                ("c".to_string(), EscalationState::Exhausted),
            ]
        );

        let events = reporter.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("started"));
        assert_eq!(events.last().map(String::as_str), Some("finished"));

        // Second run: one posting from A again plus two new ones.
        let body = format!(
            "{}\n{}\n{}\n{}",
            job_line("a", 0),
            job_line("a2", 0),
            job_line("a2", 1),
            listing_body("pad", 0)
        );
        let rerun = Pipeline::new(
            EscalationController::new(
                MockFetcher::new().route("https://a.example.com/rss", Reply::ok(body)),
            ),
            registry(),
            store.clone(),
        );
        let output = rerun
            .run(&RunRequest::new(SearchQuery::new(["engineer"])), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.metadata.store_size, 9);
        assert_eq!(output.metadata.inserted, 2);
        assert_eq!(output.metadata.per_source_errors.len(), 2);
        assert_eq!(store.len().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn bad_records_are_dropped_and_counted() {
        let body = format!(
            "JOB Orphan title|||\n{}\n{}",
            job_line("a", 0),
            listing_body("pad", 0)
        );
        let mut registry = SourceRegistry::new();
        registry
            .register(
                SourceDefinition::new("a", MockExtractor)
                    .with_plan(Strategy::Feed, "https://a.example.com/rss"),
            )
            .unwrap();
        let pipeline = Pipeline::new(
            EscalationController::new(
                MockFetcher::new().route("https://a.example.com/rss", Reply::ok(body)),
            ),
            registry,
            MemoryStore::new(),
        );

        let output = pipeline
            .run(&RunRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.metadata.total_fetched, 2);
        assert_eq!(output.metadata.dropped_records, 1);
        assert_eq!(output.jobs.len(), 1);
    }

    #[tokio::test]
    async fn output_respects_filters() {
        let now = Utc::now();
        let mut parsed = canonical("parsed", now);
        parsed.posted_at = Some(now - TimeDelta::minutes(10));
        parsed.date_confidence = DateConfidence::Parsed;
        parsed.employment_type = EmploymentType::Contract;
        let unknown = canonical("unknown", now);
        let store = MemoryStore::from_records([parsed, unknown]);

        let pipeline = Pipeline::new(
            EscalationController::new(MockFetcher::new()),
            SourceRegistry::new(),
            store,
        );

        let hour = RunRequest::default().with_recency(RecencyFilter::Hour);
        let output = pipeline.run(&hour, &CancellationToken::new()).await.unwrap();
        let ids: Vec<&str> = output.jobs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["parsed"]);
        assert_eq!(output.metadata.store_size, 2);

        let full_time = RunRequest::default().with_employment_type(Some(EmploymentType::FullTime));
        let output = pipeline.run(&full_time, &CancellationToken::new()).await.unwrap();
        assert!(output.jobs.is_empty());
    }

    #[tokio::test]
    async fn prune_reports_removals() {
        let now = Utc::now();
        let old = canonical("old", now - TimeDelta::days(60));
        let store = MemoryStore::from_records([old, canonical("new", now)]);
        let reporter = RecordingReporter::default();

        let removed = prune_store(&store, TimeDelta::days(30), now, &reporter)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(reporter.events.lock().unwrap().clone(), vec!["pruned:1"]);
    }
}
