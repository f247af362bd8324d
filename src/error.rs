//! # Error Types
//!
//! Structured error handling for the fetch pipeline using `thiserror`.
//!
//! Failures fall into the categories the pipeline treats differently:
//!
//! - **Transient remote failures**: [`BackendError`] whose [`StatusCode`] is in the
//!   retryable set. Absorbed by the retry executor until the deadline passes.
//! - **Non-retryable remote failures**: surfaced immediately as [`FetchError::Backend`].
//! - **Deadline exceeded**: [`FetchError::RetryDeadlineExceeded`], a distinct reason.
//! - **Local failures**: [`FetchError::InvalidReportType`], never retried.
//! - **Infrastructure failures**: [`CacheError`] and [`QueueError`], logged and
//!   degraded around on the request path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical status codes a remote reporting backend may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    pub const ALL: [StatusCode; 16] = [
        StatusCode::Cancelled,
        StatusCode::Unknown,
        StatusCode::InvalidArgument,
        StatusCode::DeadlineExceeded,
        StatusCode::NotFound,
        StatusCode::AlreadyExists,
        StatusCode::PermissionDenied,
        StatusCode::ResourceExhausted,
        StatusCode::FailedPrecondition,
        StatusCode::Aborted,
        StatusCode::OutOfRange,
        StatusCode::Unimplemented,
        StatusCode::Internal,
        StatusCode::Unavailable,
        StatusCode::DataLoss,
        StatusCode::Unauthenticated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        StatusCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == normalized)
            .ok_or_else(|| format!("Unknown status code: {s}"))
    }
}

/// Typed failure returned by the remote reporting backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct BackendError {
    pub status: StatusCode,
    pub message: String,
}

impl BackendError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Cache store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Cache serialization error for key {key}: {message}")]
    Serialization { key: String, message: String },
}

/// Task queue failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue {queue_name} is shut down")]
    Closed { queue_name: String },

    #[error("Task queue {queue_name} rejected job: {message}")]
    Rejected { queue_name: String, message: String },
}

/// Failure of a single logical fetch (orchestrator or background job)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Remote call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Retry total timeout exceeded after {attempts} attempts ({elapsed_ms}ms)")]
    RetryDeadlineExceeded { attempts: u32, elapsed_ms: u64 },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Unknown report type: {0}")]
    InvalidReportType(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FetchError {
    /// Failure reason carried by envelopes and `QueryFailed` events
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Remote status code when the failure came from the backend
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Backend(e) => Some(e.status),
            FetchError::RetryDeadlineExceeded { .. } => Some(StatusCode::DeadlineExceeded),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Serialization(e.to_string())
    }
}

/// Top-level error for wiring and configuration
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigurationError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
