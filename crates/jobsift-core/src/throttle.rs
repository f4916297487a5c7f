//! Per-origin request spacing.
//!
//! Two requests to the same origin are never closer together than a base gap
//! plus a fresh random jitter. Callers reserve their slot under a short lock
//! and sleep outside it, so concurrent fetches against one board queue up
//! while fetches against different boards proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum gap between two requests to one origin.
    pub delay: Duration,
    /// Upper bound of the uniform extra gap drawn for every request.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No spacing at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero() && self.jitter.is_zero()
    }

    fn next_gap(&self) -> Duration {
        match self.jitter.as_millis() as u64 {
            0 => self.delay,
            max_ms => self.delay + Duration::from_millis(rand::rng().random_range(0..=max_ms)),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1)).with_jitter(Duration::from_millis(750))
    }
}

/// Shared per-origin slot book. Clones share state.
#[derive(Clone)]
pub struct Throttle {
    config: ThrottleConfig,
    next_free: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            next_free: Arc::default(),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// `scheme://host:port` of a URL, with the default port made explicit.
    pub fn origin_of(url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(format!("{}://{host}:{port}", url.scheme()))
    }

    async fn reserve(&self, origin: &str) -> Instant {
        let mut book = self.next_free.lock().await;
        let now = Instant::now();
        let slot = book.get(origin).map_or(now, |&free| free.max(now));
        book.insert(origin.to_string(), slot + self.config.next_gap());
        slot
    }

    /// Wait for this URL's turn. URLs without an origin pass straight through.
    pub async fn wait(&self, url: &str, cancel: &CancellationToken) -> Result<(), AppError> {
        if self.config.is_disabled() {
            return Ok(());
        }
        let Some(origin) = Self::origin_of(url) else {
            return Ok(());
        };

        let slot = self.reserve(&origin).await;
        let pause = slot.saturating_duration_since(Instant::now());
        if pause.is_zero() {
            return Ok(());
        }

        tracing::debug!(origin = %origin, delay_ms = pause.as_millis() as u64, "Spacing request");
        tokio::select! {
            () = tokio::time::sleep(pause) => Ok(()),
            () = cancel.cancelled() => Err(AppError::Cancelled),
        }
    }
}
