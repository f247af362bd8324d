//! # Orchestration
//!
//! Coordinates the fetch pipeline around the cache.
//!
//! ## Core Components
//!
//! - **AnalyticsService**: request-facing cache-aside policy for reports,
//!   realtime reports and dimension reports
//! - **FetchJobExecutor**: background fetch-transform-store job run by the task queue
//! - **RealtimeRescheduler**: re-enqueues realtime fetches after each cache update,
//!   owned by a cancellable [`RealtimeSubscription`]
//! - **AnalyticsSystem**: wires the components from configuration

pub mod bootstrap;
pub mod fetch_task;
pub mod realtime;
pub mod service;

pub use bootstrap::{AnalyticsSystem, SystemStatus};
pub use fetch_task::{ttl_for, FetchJobExecutor, ReportFetcher};
pub use realtime::{RealtimeRescheduler, RealtimeSubscription};
pub use service::AnalyticsService;
