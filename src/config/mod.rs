//! # Analytics Configuration System
//!
//! YAML-based configuration with environment-specific overrides, mirroring the
//! layout of `config/analytics.yaml`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use analytics_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let ttl = manager.config().cache.lifetime();
//! let workers = manager.config().background_jobs.workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use crate::error::StatusCode;
use crate::resilience::RetrySettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring analytics.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Numeric property identifier of the reporting account
    pub property_id: String,

    /// Cache-aside behaviour
    pub cache: CacheConfig,

    /// Background job processing
    pub background_jobs: BackgroundJobsConfig,

    /// Self-rescheduling realtime refresh
    pub realtime: RealtimeConfig,

    /// Remote call retry policy
    pub retry: RetryConfig,

    /// Event bus settings
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Namespace prepended to every stored key
    pub prefix: String,
    /// Default entry lifetime (24 hours)
    pub lifetime_seconds: u64,
    /// Lifetime for realtime report entries
    pub realtime_lifetime_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: defaults::CACHE_PREFIX.to_string(),
            lifetime_seconds: defaults::CACHE_LIFETIME_SECONDS,
            realtime_lifetime_seconds: defaults::REALTIME_CACHE_LIFETIME_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_seconds)
    }

    pub fn realtime_lifetime(&self) -> Duration {
        Duration::from_secs(self.realtime_lifetime_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub enabled: bool,
    pub queue_name: String,
    pub workers: usize,
    /// Delivery attempts before a job is dead-lettered
    pub max_attempts: u32,
    /// Fixed wait between delivery attempts
    pub retry_backoff_seconds: u64,
}

impl Default for BackgroundJobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_name: defaults::QUEUE_NAME.to_string(),
            workers: defaults::QUEUE_WORKERS,
            max_attempts: defaults::JOB_MAX_ATTEMPTS,
            retry_backoff_seconds: defaults::JOB_RETRY_BACKOFF_SECONDS,
        }
    }
}

impl BackgroundJobsConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub enabled: bool,
    pub update_interval_seconds: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_seconds: defaults::REALTIME_UPDATE_INTERVAL_SECONDS,
        }
    }
}

impl RealtimeConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }
}

/// Retry policy as written in configuration (milliseconds throughout)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub retries_enabled: bool,
    pub initial_retry_delay_ms: u64,
    pub retry_delay_multiplier: f64,
    pub max_retry_delay_ms: u64,
    pub initial_rpc_timeout_ms: u64,
    pub rpc_timeout_multiplier: f64,
    pub max_rpc_timeout_ms: u64,
    pub total_timeout_ms: u64,
    pub no_retries_rpc_timeout_ms: u64,
    pub retryable_codes: Vec<StatusCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries_enabled: true,
            initial_retry_delay_ms: 100,
            retry_delay_multiplier: 1.3,
            max_retry_delay_ms: 60_000,
            initial_rpc_timeout_ms: 60_000,
            rpc_timeout_multiplier: 1.0,
            max_rpc_timeout_ms: 60_000,
            total_timeout_ms: 60_000,
            no_retries_rpc_timeout_ms: 60_000,
            retryable_codes: vec![StatusCode::Unavailable, StatusCode::DeadlineExceeded],
        }
    }
}

impl RetryConfig {
    /// Build the immutable settings shared by every retry executor call
    pub fn to_settings(&self) -> RetrySettings {
        RetrySettings {
            retries_enabled: self.retries_enabled,
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            retry_delay_multiplier: self.retry_delay_multiplier,
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            initial_rpc_timeout: Duration::from_millis(self.initial_rpc_timeout_ms),
            rpc_timeout_multiplier: self.rpc_timeout_multiplier,
            max_rpc_timeout: Duration::from_millis(self.max_rpc_timeout_ms),
            total_timeout: Duration::from_millis(self.total_timeout_ms),
            no_retries_rpc_timeout: Duration::from_millis(self.no_retries_rpc_timeout_ms),
            retryable_codes: self.retryable_codes.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl AnalyticsConfig {
    /// Test profile: millisecond delays and a short queue backoff
    pub fn for_test() -> Self {
        Self {
            property_id: "123456".to_string(),
            cache: CacheConfig {
                prefix: "analytics_test".to_string(),
                ..CacheConfig::default()
            },
            background_jobs: BackgroundJobsConfig {
                workers: 1,
                retry_backoff_seconds: 1,
                ..BackgroundJobsConfig::default()
            },
            realtime: RealtimeConfig {
                enabled: true,
                update_interval_seconds: 1,
            },
            retry: RetryConfig {
                initial_retry_delay_ms: 10,
                retry_delay_multiplier: 2.0,
                max_retry_delay_ms: 100,
                initial_rpc_timeout_ms: 200,
                rpc_timeout_multiplier: 1.5,
                max_rpc_timeout_ms: 500,
                total_timeout_ms: 2_000,
                no_retries_rpc_timeout_ms: 200,
                ..RetryConfig::default()
            },
            events: EventsConfig::default(),
        }
    }

    /// Fully-qualified request target, e.g. `properties/123456`
    pub fn property(&self) -> String {
        format!("properties/{}", self.property_id)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.property_id.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "property_id",
                "analytics configuration",
            ));
        }

        let retry = &self.retry;
        if retry.retry_delay_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.retry_delay_multiplier",
                retry.retry_delay_multiplier.to_string(),
                "must be >= 1.0",
            ));
        }
        if retry.rpc_timeout_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.rpc_timeout_multiplier",
                retry.rpc_timeout_multiplier.to_string(),
                "must be >= 1.0",
            ));
        }
        if retry.max_retry_delay_ms < retry.initial_retry_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_retry_delay_ms",
                retry.max_retry_delay_ms.to_string(),
                "must be >= initial_retry_delay_ms",
            ));
        }
        if retry.max_rpc_timeout_ms < retry.initial_rpc_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_rpc_timeout_ms",
                retry.max_rpc_timeout_ms.to_string(),
                "must be >= initial_rpc_timeout_ms",
            ));
        }
        if retry.total_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.total_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }

        if self.background_jobs.workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "background_jobs.workers",
                "0",
                "must be greater than 0",
            ));
        }
        if self.background_jobs.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "background_jobs.max_attempts",
                "0",
                "must be greater than 0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "must be greater than 0",
            ));
        }

        if self.cache.realtime_lifetime_seconds == 0 {
            tracing::warn!("Realtime cache lifetime is 0 - realtime entries expire immediately");
        }

        Ok(())
    }
}
