//! Normalized report rows and the envelope returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One normalized row: header name to string value for each side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub dimensions: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, String>,
}

pub type NormalizedRows = Vec<ReportRow>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Stale data served while a background job refreshes the entry
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    pub data: NormalizedRows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EnvelopeMetadata>,
}

/// Failure shape: `{"status": false, "error": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub status: bool,
    pub error: String,
}

/// Result handed back to callers of the analytics service.
///
/// Failures never escape the service as `Err`; they are folded into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportEnvelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

impl ReportEnvelope {
    pub fn failure(error: impl Into<String>) -> Self {
        ReportEnvelope::Failure(FailureEnvelope {
            status: false,
            error: error.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReportEnvelope::Success(_))
    }

    pub fn data(&self) -> Option<&NormalizedRows> {
        match self {
            ReportEnvelope::Success(success) => Some(&success.data),
            ReportEnvelope::Failure(_) => None,
        }
    }

    pub fn metadata(&self) -> Option<&EnvelopeMetadata> {
        match self {
            ReportEnvelope::Success(success) => success.metadata.as_ref(),
            ReportEnvelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ReportEnvelope::Failure(failure) => Some(&failure.error),
            ReportEnvelope::Success(_) => None,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.metadata()
            .and_then(|m| m.status)
            .is_some_and(|s| s == ResponseStatus::Refreshing)
    }
}
