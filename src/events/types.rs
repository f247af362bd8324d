//! Lifecycle events published around every report fetch.

use crate::cache::CacheKey;
use crate::constants::events;
use crate::error::StatusCode;
use crate::models::{NormalizedRows, QueryParameters, ReportType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A caller asked for a report
    Requested {
        report_type: ReportType,
        parameters: QueryParameters,
        force_refresh: bool,
    },
    /// Data was produced for a request, from the cache or the backend
    Fetched {
        report_type: ReportType,
        parameters: QueryParameters,
        data: NormalizedRows,
        from_cache: bool,
    },
    /// A background job wrote a fresh entry
    CacheUpdated {
        cache_key: CacheKey,
        report_type: ReportType,
        parameters: QueryParameters,
        data: NormalizedRows,
    },
    QueryFailed {
        report_type: ReportType,
        parameters: QueryParameters,
        reason: String,
        status: Option<StatusCode>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Requested { .. } => events::QUERY_REQUESTED,
            LifecycleEvent::Fetched { .. } => events::DATA_FETCHED,
            LifecycleEvent::CacheUpdated { .. } => events::CACHE_UPDATED,
            LifecycleEvent::QueryFailed { .. } => events::QUERY_FAILED,
        }
    }

    pub fn report_type(&self) -> ReportType {
        match self {
            LifecycleEvent::Requested { report_type, .. }
            | LifecycleEvent::Fetched { report_type, .. }
            | LifecycleEvent::CacheUpdated { report_type, .. }
            | LifecycleEvent::QueryFailed { report_type, .. } => *report_type,
        }
    }

    pub fn parameters(&self) -> &QueryParameters {
        match self {
            LifecycleEvent::Requested { parameters, .. }
            | LifecycleEvent::Fetched { parameters, .. }
            | LifecycleEvent::CacheUpdated { parameters, .. }
            | LifecycleEvent::QueryFailed { parameters, .. } => parameters,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, LifecycleEvent::QueryFailed { .. })
    }
}
