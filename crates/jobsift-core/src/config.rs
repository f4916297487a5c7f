use std::time::Duration;

use chrono::TimeDelta;

use crate::error::AppError;
use crate::throttle::ThrottleConfig;
use crate::transport::{BackoffPolicy, FetchOptions};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_BROWSER_TIMEOUT: Duration = Duration::from_secs(45);

/// Everything a run needs besides its sources and its store.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchOptions,
    /// Navigation timeout for the rendered-browser strategy.
    pub browser_timeout: Duration,
    /// Sources processed at once.
    pub max_concurrency: usize,
    pub retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            browser_timeout: DEFAULT_BROWSER_TIMEOUT,
            max_concurrency: DEFAULT_CONCURRENCY,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl PipelineConfig {
    pub fn with_fetch(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.retention_days))
    }

    /// Read configuration from environment variables, defaulting anything unset.
    ///
    /// - `JOBSIFT_MAX_RETRIES` (attempts per proxy, default 3)
    /// - `JOBSIFT_BASE_DELAY_MS`, `JOBSIFT_MAX_DELAY_MS`, `JOBSIFT_JITTER` (backoff)
    /// - `JOBSIFT_ATTEMPT_TIMEOUT_SECS`, `JOBSIFT_BROWSER_TIMEOUT_SECS`
    /// - `JOBSIFT_PROXIES` (comma-separated proxy URLs)
    /// - `JOBSIFT_REQUEST_DELAY_MS`, `JOBSIFT_REQUEST_JITTER_MS` (per-origin throttle)
    /// - `JOBSIFT_CONCURRENCY` (default 4)
    /// - `JOBSIFT_RETENTION_DAYS` (default 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let fetch_defaults = &defaults.fetch;

        let max_retries = parse_or(&lookup, "JOBSIFT_MAX_RETRIES", fetch_defaults.max_retries)?;
        if max_retries == 0 {
            return Err(AppError::ConfigError(
                "JOBSIFT_MAX_RETRIES must be at least 1".into(),
            ));
        }

        let base_delay_ms = parse_or(
            &lookup,
            "JOBSIFT_BASE_DELAY_MS",
            fetch_defaults.backoff.base_delay.as_millis() as u64,
        )?;
        let max_delay_ms = parse_or(
            &lookup,
            "JOBSIFT_MAX_DELAY_MS",
            fetch_defaults.backoff.max_delay.as_millis() as u64,
        )?;
        let jitter: f64 = parse_or(&lookup, "JOBSIFT_JITTER", fetch_defaults.backoff.jitter)?;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(AppError::ConfigError(format!(
                "Invalid JOBSIFT_JITTER '{jitter}': must be between 0 and 1"
            )));
        }

        let attempt_timeout_secs = parse_or(
            &lookup,
            "JOBSIFT_ATTEMPT_TIMEOUT_SECS",
            fetch_defaults.attempt_timeout.as_secs(),
        )?;
        let browser_timeout_secs = parse_or(
            &lookup,
            "JOBSIFT_BROWSER_TIMEOUT_SECS",
            defaults.browser_timeout.as_secs(),
        )?;

        let request_delay_ms = parse_or(
            &lookup,
            "JOBSIFT_REQUEST_DELAY_MS",
            fetch_defaults.throttle.delay.as_millis() as u64,
        )?;
        let request_jitter_ms = parse_or(
            &lookup,
            "JOBSIFT_REQUEST_JITTER_MS",
            fetch_defaults.throttle.jitter.as_millis() as u64,
        )?;

        let proxies = lookup("JOBSIFT_PROXIES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_concurrency = parse_or(&lookup, "JOBSIFT_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(AppError::ConfigError(
                "JOBSIFT_CONCURRENCY must be at least 1".into(),
            ));
        }
        let retention_days = parse_or(&lookup, "JOBSIFT_RETENTION_DAYS", defaults.retention_days)?;

        let fetch = FetchOptions::default()
            .with_max_retries(max_retries)
            .with_backoff(BackoffPolicy {
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                jitter,
            })
            .with_attempt_timeout(Duration::from_secs(attempt_timeout_secs))
            .with_proxies(proxies)
            .with_throttle(
                ThrottleConfig::new(Duration::from_millis(request_delay_ms))
                    .with_jitter(Duration::from_millis(request_jitter_ms)),
            );

        Ok(Self {
            fetch,
            browser_timeout: Duration::from_secs(browser_timeout_secs),
            max_concurrency,
            retention_days,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid {key} '{raw}': expected a number"))
        }),
    }
}
