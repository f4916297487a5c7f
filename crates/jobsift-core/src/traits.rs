use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::escalation::Strategy;
use crate::models::{CanonicalJobRecord, RawRecord};
use crate::store::MergeSummary;

/// A response as seen by the pipeline, whatever produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}

impl FetchResponse {
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            final_url: url.into(),
        }
    }
}

/// Header set presented to a target for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub name: String,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

impl IdentityProfile {
    pub fn new(name: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_agent: user_agent.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The proxy slot and identity a single attempt goes out through.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    /// Index into the proxy pool (0 for a direct connection).
    pub slot: usize,
    pub proxy: Option<&'a str>,
    pub identity: &'a IdentityProfile,
}

/// Performs exactly one HTTP attempt. Never retries.
///
/// Non-success statuses are returned as responses; classification is the
/// caller's job.
pub trait HttpSender: Send + Sync {
    fn send(
        &self,
        url: &str,
        route: &Route<'_>,
        timeout: Duration,
    ) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;
}

/// Fetches a payload for one strategy, including whatever resilience it needs.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;
}

/// A renderer placeholder for when no headless browser is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

impl Fetcher for NoRenderer {
    async fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> Result<FetchResponse, AppError> {
        Err(AppError::Generic("no rendered-browser capability".into()))
    }
}

/// Turns a fetched payload into raw records.
///
/// "No results" is `Ok(vec![])`. Errors are reserved for payloads that
/// cannot be interpreted at all.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        response: &FetchResponse,
        strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError>;
}

/// Persists the deduplicated corpus.
pub trait JobStore: Send + Sync {
    /// Insert or merge records by identity key. `now` stamps first/last seen.
    fn merge(
        &self,
        records: Vec<CanonicalJobRecord>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<MergeSummary, AppError>> + Send;

    /// Remove records whose best-known date is older than `now - horizon`.
    fn prune(
        &self,
        horizon: TimeDelta,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<CanonicalJobRecord>, AppError>> + Send;

    fn len(&self) -> impl Future<Output = Result<usize, AppError>> + Send;
}
