#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Analytics Core Rust
//!
//! Resilient cache-aside fetch pipeline for analytical reports served by a
//! remote reporting API.
//!
//! ## Overview
//!
//! Callers ask for a report, a realtime report or a dimension report. The
//! pipeline answers from the cache when it can, refreshes entries on a
//! background queue, retries transient backend failures under a deadline and
//! keeps realtime entries fresh with a self-rescheduling refresh loop.
//!
//! ## Key Features
//!
//! - **Deterministic cache keys**: order-independent hashing of query parameters
//! - **Bounded retries**: exponential backoff with capped delay and per-attempt timeout
//! - **Background refresh**: in-process task queue with redelivery and dead letters
//! - **Lifecycle events**: broadcast bus with independent handlers
//! - **Cancellable realtime loop**: explicit subscription object instead of ambient state
//!
//! ## Module Organization
//!
//! - [`cache`] - Key generation and cache stores
//! - [`backend`] - Reporting backend boundary
//! - [`resilience`] - Retry executor
//! - [`transform`] - Response normalization
//! - [`events`] - Lifecycle events and the event bus
//! - [`messaging`] - Fetch jobs and the task queue
//! - [`orchestration`] - Service, background jobs, realtime loop and bootstrap
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use analytics_core::config::ConfigManager;
//! use analytics_core::models::DateRange;
//! use analytics_core::orchestration::AnalyticsSystem;
//! use analytics_core::test_helpers::ScriptedBackend;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let system = AnalyticsSystem::with_in_memory_cache(manager, Arc::new(ScriptedBackend::new()))?;
//!
//! let envelope = system
//!     .service()
//!     .run_report(DateRange::new("30daysAgo", "today"), ["country"], ["sessions"], false)
//!     .await;
//! println!("{}", serde_json::to_string(&envelope)?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod test_helpers;
pub mod transform;

pub use backend::{RawReport, ReportRequest, ReportingBackend};
pub use cache::{CacheKey, CacheStore, InMemoryCacheStore, KeyGenerator};
pub use config::{AnalyticsConfig, ConfigManager};
pub use error::{AnalyticsError, BackendError, FetchError, Result, StatusCode};
pub use events::{EventHandler, EventPublisher, LifecycleEvent};
pub use messaging::{FetchJob, InProcessTaskQueue, TaskQueue};
pub use models::{DateRange, NormalizedRows, QueryParameters, ReportEnvelope, ReportType};
pub use orchestration::{AnalyticsService, AnalyticsSystem, RealtimeSubscription};
pub use resilience::{RetryExecutor, RetrySettings};
