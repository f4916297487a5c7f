//! Per-source strategy escalation.
//!
//! ```text
//! TRY_FEED ─► TRY_API ─► TRY_STATIC_DOCUMENT ─► TRY_RENDERED_BROWSER ─► EXHAUSTED
//! ```
//!
//! Each state runs one strategy. Zero records, a non-retryable error or a
//! blocked response moves the walk forward one state; records end it (unless
//! the run is exhaustive). The walk never moves backwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::blocked::{self, PageKind};
use crate::error::{AppError, ErrorKind};
use crate::models::{RawRecord, SourceError};
use crate::registry::{SearchQuery, SourceDefinition};
use crate::traits::{Fetcher, NoRenderer};

/// A way of obtaining records from a source, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Feed,
    Api,
    StaticDocument,
    RenderedBrowser,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Feed,
        Strategy::Api,
        Strategy::StaticDocument,
        Strategy::RenderedBrowser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Feed => "feed",
            Strategy::Api => "api",
            Strategy::StaticDocument => "static_document",
            Strategy::RenderedBrowser => "rendered_browser",
        }
    }

    /// Payload shape this strategy is expected to return.
    pub fn page_kind(&self) -> PageKind {
        match self {
            Strategy::Feed => PageKind::Feed,
            Strategy::Api => PageKind::Api,
            Strategy::StaticDocument => PageKind::Document,
            Strategy::RenderedBrowser => PageKind::Rendered,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feed" => Ok(Strategy::Feed),
            "api" => Ok(Strategy::Api),
            "static_document" => Ok(Strategy::StaticDocument),
            "rendered_browser" => Ok(Strategy::RenderedBrowser),
            _ => Err(format!("Unknown strategy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationState {
    TryFeed,
    TryApi,
    TryStaticDocument,
    TryRenderedBrowser,
    Exhausted,
}

impl EscalationState {
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            EscalationState::TryFeed => Some(Strategy::Feed),
            EscalationState::TryApi => Some(Strategy::Api),
            EscalationState::TryStaticDocument => Some(Strategy::StaticDocument),
            EscalationState::TryRenderedBrowser => Some(Strategy::RenderedBrowser),
            EscalationState::Exhausted => None,
        }
    }

    /// The next state. `Exhausted` is terminal.
    pub fn next(self) -> Self {
        match self {
            EscalationState::TryFeed => EscalationState::TryApi,
            EscalationState::TryApi => EscalationState::TryStaticDocument,
            EscalationState::TryStaticDocument => EscalationState::TryRenderedBrowser,
            EscalationState::TryRenderedBrowser | EscalationState::Exhausted => {
                EscalationState::Exhausted
            }
        }
    }
}

impl From<Strategy> for EscalationState {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Feed => EscalationState::TryFeed,
            Strategy::Api => EscalationState::TryApi,
            Strategy::StaticDocument => EscalationState::TryStaticDocument,
            Strategy::RenderedBrowser => EscalationState::TryRenderedBrowser,
        }
    }
}

impl fmt::Display for EscalationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscalationState::TryFeed => "TRY_FEED",
            EscalationState::TryApi => "TRY_API",
            EscalationState::TryStaticDocument => "TRY_STATIC_DOCUMENT",
            EscalationState::TryRenderedBrowser => "TRY_RENDERED_BROWSER",
            EscalationState::Exhausted => "EXHAUSTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Records { count: usize },
    Empty,
    Blocked { reason: String },
    Failed { kind: ErrorKind, message: String },
    Skipped { reason: String },
}

/// One step of a source's walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EscalationMode {
    /// Stop at the first strategy that yields records.
    #[default]
    FirstSuccess,
    /// Run every strategy and union their records.
    Exhaustive,
}

/// Everything one source produced in one run.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub records: Vec<RawRecord>,
    pub final_state: EscalationState,
    pub trail: Vec<AttemptRecord>,
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    /// States that were entered, in order.
    pub fn visited_states(&self) -> Vec<EscalationState> {
        self.trail.iter().map(|a| a.strategy.into()).collect()
    }
}

/// Walks the escalation ladder for a source.
///
/// `fetcher` serves the plain HTTP strategies; `renderer`, when present,
/// serves [`Strategy::RenderedBrowser`].
pub struct EscalationController<F, R = NoRenderer> {
    fetcher: F,
    renderer: Option<R>,
}

impl<F: Fetcher> EscalationController<F, NoRenderer> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            renderer: None,
        }
    }
}

impl<F: Fetcher, R: Fetcher> EscalationController<F, R> {
    pub fn with_renderer<R2: Fetcher>(self, renderer: Option<R2>) -> EscalationController<F, R2> {
        EscalationController {
            fetcher: self.fetcher,
            renderer,
        }
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn run(
        &self,
        source: &SourceDefinition,
        query: &SearchQuery,
        mode: EscalationMode,
        cancel: &CancellationToken,
    ) -> SourceOutcome {
        let mut state = EscalationState::TryFeed;
        let mut trail = Vec::new();
        let mut records = Vec::new();
        let mut productive_state = None;
        let mut last_attempted = None;
        let mut cancelled = false;

        while let Some(strategy) = state.strategy() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcome = match self.target(source, strategy, query) {
                Err(reason) => {
                    tracing::debug!(source = %source.name, %strategy, %reason, "Skipping strategy");
                    AttemptOutcome::Skipped { reason }
                }
                Ok(url) => {
                    last_attempted = Some(strategy);
                    let (outcome, batch) = self.attempt(source, strategy, &url, cancel).await;
                    records.extend(batch);
                    outcome
                }
            };

            if matches!(
                outcome,
                AttemptOutcome::Failed {
                    kind: ErrorKind::Cancelled,
                    ..
                }
            ) {
                trail.push(AttemptRecord { strategy, outcome });
                cancelled = true;
                break;
            }

            let succeeded = matches!(outcome, AttemptOutcome::Records { .. });
            trail.push(AttemptRecord { strategy, outcome });

            if succeeded {
                productive_state = Some(state);
                if mode == EscalationMode::FirstSuccess {
                    break;
                }
            }

            let next = state.next();
            if next.strategy().is_some() {
                tracing::info!(source = %source.name, from = %state, to = %next, "Escalating");
            }
            state = next;
        }

        let final_state = productive_state.unwrap_or(EscalationState::Exhausted);
        let error = if cancelled {
            Some(SourceError {
                source: source.name.clone(),
                strategy: last_attempted,
                kind: ErrorKind::Cancelled,
                message: AppError::Cancelled.to_string(),
            })
        } else if records.is_empty() {
            let err = AppError::Exhausted {
                source_name: source.name.clone(),
                message: summarize(&trail),
            };
            tracing::warn!(source = %source.name, error = %err, "Source exhausted");
            Some(SourceError {
                source: source.name.clone(),
                strategy: last_attempted,
                kind: err.kind(),
                message: err.to_string(),
            })
        } else {
            None
        };

        SourceOutcome {
            source: source.name.clone(),
            records,
            final_state,
            trail,
            error,
        }
    }

    /// The URL for `strategy`, or why it cannot run here.
    fn target(
        &self,
        source: &SourceDefinition,
        strategy: Strategy,
        query: &SearchQuery,
    ) -> Result<String, String> {
        let plan = source
            .plan(strategy)
            .ok_or_else(|| format!("{strategy} not defined for source"))?;
        if strategy == Strategy::RenderedBrowser && self.renderer.is_none() {
            return Err("no rendered-browser capability".to_string());
        }
        Ok(plan.target_url(query))
    }

    async fn attempt(
        &self,
        source: &SourceDefinition,
        strategy: Strategy,
        url: &str,
        cancel: &CancellationToken,
    ) -> (AttemptOutcome, Vec<RawRecord>) {
        tracing::debug!(source = %source.name, %strategy, %url, "Trying strategy");

        let fetched = match (strategy, &self.renderer) {
            (Strategy::RenderedBrowser, Some(renderer)) => renderer.fetch(url, cancel).await,
            _ => self.fetcher.fetch(url, cancel).await,
        };

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(source = %source.name, %strategy, error = %e, "Strategy failed");
                let outcome = match e {
                    AppError::Blocked(reason) => AttemptOutcome::Blocked { reason },
                    other => AttemptOutcome::Failed {
                        kind: other.kind(),
                        message: other.to_string(),
                    },
                };
                return (outcome, Vec::new());
            }
        };

        if let Some(reason) = blocked::check_response(&response, strategy.page_kind()) {
            tracing::warn!(source = %source.name, %strategy, %reason, "Response blocked");
            return (
                AttemptOutcome::Blocked {
                    reason: reason.to_string(),
                },
                Vec::new(),
            );
        }

        match source.extractor().extract(&response, strategy) {
            Ok(batch) if batch.is_empty() => {
                tracing::info!(source = %source.name, %strategy, "No records");
                (AttemptOutcome::Empty, batch)
            }
            Ok(batch) => {
                tracing::info!(source = %source.name, %strategy, count = batch.len(), "Records extracted");
                (AttemptOutcome::Records { count: batch.len() }, batch)
            }
            Err(e) => {
                tracing::warn!(source = %source.name, %strategy, error = %e, "Extraction failed");
                (
                    AttemptOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        }
    }
}

fn summarize(trail: &[AttemptRecord]) -> String {
    if trail.is_empty() {
        return "no strategies attempted".to_string();
    }
    trail
        .iter()
        .map(|a| {
            let detail = match &a.outcome {
                AttemptOutcome::Records { count } => format!("{count} records"),
                AttemptOutcome::Empty => "empty".to_string(),
                AttemptOutcome::Blocked { reason } => format!("blocked ({reason})"),
                AttemptOutcome::Failed { message, .. } => format!("failed ({message})"),
                AttemptOutcome::Skipped { reason } => format!("skipped ({reason})"),
            };
            format!("{}: {detail}", a.strategy)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockExtractor, MockFetcher, MockSender, Reply, listing_body};
    use crate::throttle::ThrottleConfig;
    use crate::transport::{FetchOptions, ResilientFetcher};

    const FEED: &str = "https://a.example.com/rss?q=rust";
    const API: &str = "https://a.example.com/api?q=rust";
    const HTML: &str = "https://a.example.com/jobs?q=rust";
    const RENDER: &str = "https://a.example.com/app?q=rust";

    fn full_source() -> SourceDefinition {
        SourceDefinition::new("alpha", MockExtractor)
            .with_plan(Strategy::Feed, "https://a.example.com/rss?q={keywords}")
            .with_plan(Strategy::Api, "https://a.example.com/api?q={keywords}")
            .with_plan(Strategy::StaticDocument, "https://a.example.com/jobs?q={keywords}")
            .with_plan(Strategy::RenderedBrowser, "https://a.example.com/app?q={keywords}")
    }

    fn query() -> SearchQuery {
        SearchQuery::new(["rust"])
    }

    fn strategies(outcome: &SourceOutcome) -> Vec<Strategy> {
        outcome.trail.iter().map(|a| a.strategy).collect()
    }

    #[test]
    fn states_only_move_forward() {
        let mut state = EscalationState::TryFeed;
        while state != EscalationState::Exhausted {
            let next = state.next();
            assert!(next > state);
            state = next;
        }
        assert_eq!(state.next(), EscalationState::Exhausted);
    }

    #[test]
    fn attempt_record_serializes_flat() {
        let record = AttemptRecord {
            strategy: Strategy::StaticDocument,
            outcome: AttemptOutcome::Records { count: 5 },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["strategy"], "static_document");
        assert_eq!(json["outcome"], "records");
        assert_eq!(json["count"], 5);
        assert_eq!(
            serde_json::to_string(&EscalationState::TryStaticDocument).unwrap(),
            "\"TRY_STATIC_DOCUMENT\""
        );
    }

    #[tokio::test]
    async fn feed_success_stops_the_walk() {
        let fetcher = MockFetcher::new().route(FEED, Reply::ok(listing_body("alpha", 2)));
        let controller = EscalationController::new(fetcher.clone());

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.final_state, EscalationState::TryFeed);
        assert!(outcome.error.is_none());
        assert_eq!(fetcher.calls(), vec![FEED.to_string()]);
    }

    #[tokio::test]
    async fn blocked_feed_and_api_escalate_to_static_document() {
        let fetcher = MockFetcher::new()
            .route(FEED, Reply::Status(403))
            .route(
                API,
                Reply::ok("<html><title>Just a moment...</title><div class=\"cf-challenge\"></div></html>"),
            )
            .route(HTML, Reply::ok(listing_body("alpha", 5)));
        let controller = EscalationController::new(fetcher.clone());

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert_eq!(outcome.final_state, EscalationState::TryStaticDocument);
        assert_eq!(outcome.records.len(), 5);
        assert!(outcome.error.is_none());
        assert_eq!(
            strategies(&outcome),
            vec![Strategy::Feed, Strategy::Api, Strategy::StaticDocument]
        );
        assert!(matches!(
            outcome.trail[1].outcome,
            AttemptOutcome::Blocked { .. }
        ));

        let visited = outcome.visited_states();
        assert!(visited.windows(2).all(|w| w[0] < w[1]));

        let calls = fetcher.calls();
        assert_eq!(calls.iter().filter(|u| u.as_str() == FEED).count(), 1);
    }

    #[tokio::test]
    async fn forbidden_challenge_page_through_the_transport_is_blocked() {
        let sender = MockSender::with_script(vec![
            Reply::Body {
                status: 403,
                body: "<html><title>Attention Required! | Cloudflare</title></html>".to_string(),
            },
            Reply::ok(listing_body("alpha", 3)),
        ]);
        let options = FetchOptions::default()
            .with_throttle(ThrottleConfig::none())
            .with_max_retries(3);
        let controller = EscalationController::new(ResilientFetcher::new(sender.clone(), options));

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert_eq!(strategies(&outcome), vec![Strategy::Feed, Strategy::Api]);
        match &outcome.trail[0].outcome {
            AttemptOutcome::Blocked { reason } => {
                assert!(reason.contains("attention required"), "{reason}")
            }
            other => panic!("expected a blocked feed attempt, got {other:?}"),
        }
        assert_eq!(outcome.final_state, EscalationState::TryApi);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(sender.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_result_escalates() {
        let fetcher = MockFetcher::new()
            .route(FEED, Reply::ok(listing_body("alpha", 0)))
            .route(API, Reply::ok(listing_body("alpha", 1)));
        let controller = EscalationController::new(fetcher);

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert_eq!(outcome.trail[0].outcome, AttemptOutcome::Empty);
        assert_eq!(outcome.final_state, EscalationState::TryApi);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_is_exhausted_with_structured_error() {
        let fetcher = MockFetcher::new()
            .route(FEED, Reply::Status(404))
            .route(API, Reply::Network("connection reset".into()))
            .route(HTML, Reply::ok("<html></html>"));
        let controller = EscalationController::new(fetcher);

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.final_state, EscalationState::Exhausted);
        let err = outcome.error.unwrap();
        assert_eq!(err.kind, ErrorKind::ExhaustionError);
        assert_eq!(err.source, "alpha");
        assert_eq!(err.strategy, Some(Strategy::StaticDocument));
        assert!(matches!(
            outcome.trail[3].outcome,
            AttemptOutcome::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn undefined_strategies_are_skipped() {
        let source = SourceDefinition::new("beta", MockExtractor)
            .with_plan(Strategy::StaticDocument, "https://b.example.com/jobs");
        let fetcher = MockFetcher::new().route("https://b.example.com/jobs", Reply::ok(listing_body("beta", 3)));
        let controller = EscalationController::new(fetcher.clone());

        let outcome = controller
            .run(&source, &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;

        assert_eq!(outcome.records.len(), 3);
        assert!(matches!(outcome.trail[0].outcome, AttemptOutcome::Skipped { .. }));
        assert!(matches!(outcome.trail[1].outcome, AttemptOutcome::Skipped { .. }));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn renderer_serves_the_last_rung() {
        let source = SourceDefinition::new("gamma", MockExtractor)
            .with_plan(Strategy::RenderedBrowser, "https://c.example.com/app");

        let without = EscalationController::new(MockFetcher::new());
        let outcome = without
            .run(&source, &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;
        assert_eq!(outcome.final_state, EscalationState::Exhausted);
        assert_eq!(outcome.error.unwrap().strategy, None);

        let renderer =
            MockFetcher::new().route("https://c.example.com/app", Reply::ok(listing_body("gamma", 4)));
        let with = EscalationController::new(MockFetcher::new()).with_renderer(Some(renderer.clone()));
        let outcome = with
            .run(&source, &query(), EscalationMode::FirstSuccess, &CancellationToken::new())
            .await;
        assert_eq!(outcome.final_state, EscalationState::TryRenderedBrowser);
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(renderer.calls(), vec!["https://c.example.com/app".to_string()]);
    }

    #[tokio::test]
    async fn exhaustive_mode_unions_every_strategy() {
        let fetcher = MockFetcher::new()
            .route(FEED, Reply::ok(listing_body("feed", 2)))
            .route(API, Reply::Status(500))
            .route(HTML, Reply::ok(listing_body("html", 3)));
        let renderer = MockFetcher::new().route(RENDER, Reply::Status(404));
        let controller = EscalationController::new(fetcher.clone()).with_renderer(Some(renderer));

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::Exhaustive, &CancellationToken::new())
            .await;

        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.trail.len(), 4);
        assert_eq!(outcome.final_state, EscalationState::TryStaticDocument);
        assert!(outcome.error.is_none());
        assert_eq!(fetcher.calls(), vec![FEED.to_string(), API.to_string(), HTML.to_string()]);
        assert!(matches!(
            outcome.trail[3].outcome,
            AttemptOutcome::Failed { kind: ErrorKind::PermanentRequestError, .. }
        ));
    }

    #[tokio::test]
    async fn cancelled_walk_reports_cancellation() {
        let fetcher = MockFetcher::new().route(FEED, Reply::ok(listing_body("alpha", 2)));
        let controller = EscalationController::new(fetcher.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = controller
            .run(&full_source(), &query(), EscalationMode::FirstSuccess, &cancel)
            .await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Cancelled);
        assert!(fetcher.calls().is_empty());
    }
}
