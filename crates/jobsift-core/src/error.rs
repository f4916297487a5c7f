use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error types for Jobsift.
#[derive(Error, Debug)]
pub enum AppError {
    /// Connection-level failure (reset, refused, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single attempt exceeded its deadline.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The target answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// The response looks like an anti-bot page, whatever its status.
    #[error("Blocked: {0}")]
    Blocked(String),

    /// A payload or record could not be interpreted.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Every escalation strategy failed for a source.
    #[error("All strategies exhausted for source '{source_name}': {message}")]
    Exhausted {
        source_name: String,
        message: String,
    },

    /// The run was aborted through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Corpus persistence failed (file or database).
    #[error("Store error: {0}")]
    StoreError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

/// Classification of an [`AppError`] as reported in run metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TransientNetworkError,
    PermanentRequestError,
    BlockedError,
    ParseError,
    ExhaustionError,
    Cancelled,
    ConfigError,
    StoreError,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientNetworkError => "TransientNetworkError",
            ErrorKind::PermanentRequestError => "PermanentRequestError",
            ErrorKind::BlockedError => "BlockedError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::ExhaustionError => "ExhaustionError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::StoreError => "StoreError",
            ErrorKind::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Returns true for statuses worth another attempt: 429 and any 5xx.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => ErrorKind::TransientNetworkError,
            AppError::HttpStatus { status, .. } if is_transient_status(*status) => {
                ErrorKind::TransientNetworkError
            }
            AppError::HttpStatus { .. } => ErrorKind::PermanentRequestError,
            AppError::Blocked(_) => ErrorKind::BlockedError,
            AppError::ParseError(_) | AppError::SerializationError(_) => ErrorKind::ParseError,
            AppError::Exhausted { .. } => ErrorKind::ExhaustionError,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::ConfigError(_) => ErrorKind::ConfigError,
            AppError::StoreError(_) => ErrorKind::StoreError,
            AppError::Generic(_) => ErrorKind::Other,
        }
    }
}
