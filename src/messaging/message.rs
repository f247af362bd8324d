//! # Fetch Job Messages
//!
//! Task descriptors handed to the background queue.

use crate::cache::CacheKey;
use crate::models::{QueryParameters, ReportType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identifier assigned to every enqueued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Background fetch for one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchJob {
    pub id: JobId,
    pub report_type: ReportType,
    pub parameters: QueryParameters,
    /// Key to store under; computed from the parameters when absent
    pub cache_key: Option<CacheKey>,
    /// Wait before the job becomes available to workers
    pub delay: Option<Duration>,
    /// Delivery attempt, starting at 1
    pub attempt: u32,
    pub queue_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl FetchJob {
    pub fn new(parameters: QueryParameters) -> Self {
        Self {
            id: JobId::new(),
            report_type: parameters.report_type(),
            parameters,
            cache_key: None,
            delay: None,
            attempt: 1,
            queue_name: crate::constants::defaults::QUEUE_NAME.to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_cache_key(mut self, cache_key: CacheKey) -> Self {
        self.cache_key = Some(cache_key);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Copy for the next delivery attempt, delayed by `backoff`
    pub fn redelivery(&self, backoff: Duration) -> Self {
        Self {
            attempt: self.attempt + 1,
            delay: Some(backoff),
            ..self.clone()
        }
    }
}
