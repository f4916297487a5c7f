//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::blocked;
use crate::error::AppError;
use crate::escalation::Strategy;
use crate::models::{CanonicalJobRecord, DateConfidence, EmploymentType, RawRecord};
use crate::traits::{Extractor, FetchResponse, Fetcher, HttpSender, Route};

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// A scripted answer for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Body { status: u16, body: String },
    /// Status with an empty body.
    Status(u16),
    Network(String),
    Timeout,
    /// Sleep this long, then answer 200.
    Hang(Duration),
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Body {
            status: 200,
            body: body.into(),
        }
    }

    async fn resolve(self, url: &str) -> Result<FetchResponse, AppError> {
        match self {
            Reply::Body { status, body } => Ok(FetchResponse {
                status,
                body,
                final_url: url.to_string(),
            }),
            Reply::Status(status) => Ok(FetchResponse {
                status,
                body: String::new(),
                final_url: url.to_string(),
            }),
            Reply::Network(message) => Err(AppError::NetworkError(message)),
            Reply::Timeout => Err(AppError::Timeout(0)),
            Reply::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(FetchResponse::ok(url, "late"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockSender
// ---------------------------------------------------------------------------

/// One recorded `send` call.
#[derive(Debug, Clone)]
pub struct SenderCall {
    pub url: String,
    pub slot: usize,
    pub proxy: Option<String>,
    /// Name of the identity profile used.
    pub identity: String,
}

/// Single-attempt sender that replays a script, then a fallback.
#[derive(Clone)]
pub struct MockSender {
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    calls: Arc<Mutex<Vec<SenderCall>>>,
}

impl MockSender {
    pub fn with_script(replies: Vec<Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into())),
            fallback: Reply::ok("<html><body>default</body></html>"),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: reply,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<SenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl HttpSender for MockSender {
    async fn send(
        &self,
        url: &str,
        route: &Route<'_>,
        _timeout: Duration,
    ) -> Result<FetchResponse, AppError> {
        self.calls.lock().unwrap().push(SenderCall {
            url: url.to_string(),
            slot: route.slot,
            proxy: route.proxy.map(str::to_string),
            identity: route.identity.name.clone(),
        });
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        reply.resolve(url).await
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Fetcher with one fixed reply per URL. Unrouted URLs answer 404.
///
/// Rejections are reported the way the resilient fetcher reports them:
/// challenge pages as `AppError::Blocked`, other statuses of 400 and above
/// as `AppError::HttpStatus`.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, reply: Reply) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    /// URLs fetched, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<FetchResponse, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        self.calls.lock().unwrap().push(url.to_string());
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Reply::Status(404));

        let response = reply.resolve(url).await?;
        if let Some(reason) = blocked::check_rejection(&response) {
            return Err(AppError::Blocked(reason.to_string()));
        }
        if response.status >= 400 {
            return Err(AppError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Reads `JOB title|company|location|url` lines; anything else is ignored.
///
/// A body containing `MALFORMED` is rejected as unparseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockExtractor;

impl Extractor for MockExtractor {
    fn extract(
        &self,
        response: &FetchResponse,
        _strategy: Strategy,
    ) -> Result<Vec<RawRecord>, AppError> {
        if response.body.contains("MALFORMED") {
            return Err(AppError::ParseError("malformed fixture".into()));
        }
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        Ok(response
            .body
            .lines()
            .filter_map(|line| line.trim().strip_prefix("JOB "))
            .map(|rest| {
                let mut parts = rest.split('|');
                RawRecord {
                    title: parts.next().and_then(non_empty),
                    company: parts.next().and_then(non_empty),
                    location: parts.next().and_then(non_empty),
                    url: parts.next().and_then(non_empty),
                    date_text: parts.next().and_then(non_empty),
                    ..RawRecord::default()
                }
            })
            .collect())
    }
}

/// A document-sized fixture page carrying `count` job lines.
pub fn listing_body(prefix: &str, count: usize) -> String {
    let mut body = String::from("<html><body>\n");
    for i in 0..count {
        body.push_str(&job_line(prefix, i));
        body.push('\n');
    }
    body.push_str(&format!("<!-- {} -->\n</body></html>", "padding ".repeat(80)));
    body
}

/// One `MockExtractor` line for job `i` of `prefix`.
pub fn job_line(prefix: &str, i: usize) -> String {
    format!(
        "JOB {prefix} Engineer {i}|{prefix} Corp|Remote|https://{prefix}.example.com/jobs/{i}|2 days ago"
    )
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

pub fn raw_record(title: &str, company: &str, url: Option<&str>) -> RawRecord {
    RawRecord {
        title: Some(title.to_string()),
        company: Some(company.to_string()),
        location: Some("Remote".to_string()),
        url: url.map(str::to_string),
        ..RawRecord::default()
    }
}

/// A minimal canonical record with the given identity key.
pub fn canonical(id: &str, now: DateTime<Utc>) -> CanonicalJobRecord {
    CanonicalJobRecord {
        id: id.to_string(),
        title: "Backend Engineer".to_string(),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        url: Some(format!("https://jobs.example.com/{id}")),
        source: "test".to_string(),
        salary: None,
        employment_type: EmploymentType::Unknown,
        posted_at: None,
        date_confidence: DateConfidence::Unknown,
        recruiter_name: None,
        deadline: None,
        excerpt: String::new(),
        first_seen_at: now,
        last_seen_at: now,
    }
}
