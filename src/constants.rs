//! # System Constants
//!
//! Event names, header placeholders and the operational defaults the
//! configuration layer falls back to.

/// Lifecycle event names, used in logs and by event consumers
pub mod events {
    pub const QUERY_REQUESTED: &str = "analytics.query.requested";
    pub const DATA_FETCHED: &str = "analytics.data.fetched";
    pub const CACHE_UPDATED: &str = "analytics.cache.updated";
    pub const QUERY_FAILED: &str = "analytics.query.failed";
}

/// Name prefix for a dimension value whose header is missing
pub const DIMENSION_PLACEHOLDER_PREFIX: &str = "dimension";
/// Name prefix for a metric value whose header is missing
pub const METRIC_PLACEHOLDER_PREFIX: &str = "metric";

/// Operational defaults
pub mod defaults {
    pub const CACHE_PREFIX: &str = "analytics";
    pub const CACHE_LIFETIME_SECONDS: u64 = 86_400;
    pub const REALTIME_CACHE_LIFETIME_SECONDS: u64 = 30;
    pub const REALTIME_UPDATE_INTERVAL_SECONDS: u64 = 30;

    pub const QUEUE_NAME: &str = "default";
    pub const QUEUE_WORKERS: usize = 2;
    pub const JOB_MAX_ATTEMPTS: u32 = 3;
    pub const JOB_RETRY_BACKOFF_SECONDS: u64 = 60;

    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}
