//! Resilient single-request fetch.
//!
//! ```text
//! throttle ─► attempt ─► 2xx ──────────────────────────────► response
//!               │
//!               ├─ 401/403/429 challenge page ────────────► blocked (no retry)
//!               ├─ 4xx (not 429) ──────────────────────────► error (no retry)
//!               │
//!               └─ timeout / reset / 429 / 5xx
//!                     └─ backoff, retry same route (≤ max_retries)
//!                           └─ rotate to next proxy slot (≤ pool size)
//! ```
//!
//! Rotation state belongs to the [`ResilientFetcher`] instance, so separate
//! pipelines never share counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::blocked;
use crate::error::AppError;
use crate::throttle::{Throttle, ThrottleConfig};
use crate::traits::{FetchResponse, Fetcher, HttpSender, IdentityProfile, Route};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; Jobsift/0.1)";

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction in [0, 1]; the delay varies by ± this share of its nominal value.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.3,
        }
    }
}

impl BackoffPolicy {
    /// `base · 2^attempt`, before jitter and cap.
    pub fn nominal_delay_secs(&self, attempt: u32) -> f64 {
        self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(32) as i32)
    }

    /// Delay for a given `sample` in [-1, 1]. Deterministic.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 + jitter * sample.clamp(-1.0, 1.0);
        let secs = (self.nominal_delay_secs(attempt) * factor).max(0.0);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let sample = rand::rng().random_range(-1.0..=1.0);
        self.delay_with_sample(attempt, sample)
    }
}

/// Options for the transport layer.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Attempts per proxy slot before rotating.
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
    /// Proxy URLs. Empty means one direct-connection slot.
    pub proxies: Vec<String>,
    /// Header profiles, one per call in rotation.
    pub identities: Vec<IdentityProfile>,
    pub throttle: ThrottleConfig,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            attempt_timeout: Duration::from_secs(20),
            proxies: Vec::new(),
            identities: vec![IdentityProfile::new("default", DEFAULT_USER_AGENT)],
            throttle: ThrottleConfig::default(),
        }
    }
}

impl FetchOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_proxies(mut self, proxies: Vec<String>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_identities(mut self, identities: Vec<IdentityProfile>) -> Self {
        if !identities.is_empty() {
            self.identities = identities;
        }
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Number of proxy slots, at least one.
    pub fn pool_size(&self) -> usize {
        self.proxies.len().max(1)
    }
}

/// Retrying, rotating, throttled fetch over any [`HttpSender`].
pub struct ResilientFetcher<S> {
    sender: S,
    options: FetchOptions,
    throttle: Throttle,
    route_cursor: Arc<AtomicUsize>,
    identity_cursor: Arc<AtomicUsize>,
}

impl<S: HttpSender> ResilientFetcher<S> {
    pub fn new(sender: S, mut options: FetchOptions) -> Self {
        if options.identities.is_empty() {
            options
                .identities
                .push(IdentityProfile::new("default", DEFAULT_USER_AGENT));
        }
        let throttle = Throttle::new(options.throttle.clone());
        Self {
            sender,
            options,
            throttle,
            route_cursor: Arc::new(AtomicUsize::new(0)),
            identity_cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Slot the next independent call will start on.
    pub fn current_slot(&self) -> usize {
        self.route_cursor.load(Ordering::Relaxed) % self.options.pool_size()
    }

    fn route(&self, slot: usize, identity_index: usize) -> Route<'_> {
        let identity = &self.options.identities[identity_index % self.options.identities.len()];
        Route {
            slot,
            proxy: self.options.proxies.get(slot).map(String::as_str),
            identity,
        }
    }

    async fn attempt(
        &self,
        url: &str,
        route: &Route<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, AppError> {
        let timeout = self.options.attempt_timeout;
        let sent = tokio::select! {
            r = tokio::time::timeout(timeout, self.sender.send(url, route, timeout)) => r,
            () = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let response = match sent {
            Ok(result) => result?,
            Err(_) => return Err(AppError::Timeout(timeout.as_millis() as u64)),
        };

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

    /// Fetch `url`, retrying transient failures and rotating proxies.
    pub async fn fetch_with_retries(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, AppError> {
        self.throttle.wait(url, cancel).await?;

        let pool = self.options.pool_size();
        let max_retries = self.options.max_retries.max(1);
        let identity_index = self.identity_cursor.fetch_add(1, Ordering::Relaxed);
        let start_slot = self.current_slot();
        let mut last_error = None;

        for rotation in 0..pool {
            let slot = (start_slot + rotation) % pool;
            let route = self.route(slot, identity_index + rotation);

            for attempt in 0..max_retries {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled);
                }

                match self.attempt(url, &route, cancel).await {
                    Ok(response) => {
                        tracing::debug!(
                            %url,
                            slot,
                            attempt,
                            status = response.status,
                            identity = %route.identity.name,
                            "Fetched"
                        );
                        return Ok(response);
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(%url, slot, attempt, error = %e, "Transient fetch failure");
                        last_error = Some(e);
                        if attempt + 1 < max_retries {
                            let delay = self.options.backoff.delay_for_attempt(attempt);
                            tracing::debug!(
                                %url,
                                attempt,
                                delay_ms = %delay.as_millis(),
                                "Backing off"
                            );
                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = cancel.cancelled() => return Err(AppError::Cancelled),
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            let next = (slot + 1) % pool;
            self.route_cursor.store(next, Ordering::Relaxed);
            if rotation + 1 < pool {
                tracing::info!(%url, from = slot, to = next, "Rotating proxy slot");
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::NetworkError(format!("no attempt made for {url}"))))
    }
}

impl<S: HttpSender> Fetcher for ResilientFetcher<S> {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<FetchResponse, AppError> {
        self.fetch_with_retries(url, cancel).await
    }
}
