//! # Resilience Module
//!
//! Fault tolerance for calls to the reporting backend: bounded retries with
//! exponential backoff under a shared deadline.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use analytics_core::resilience::{RetryExecutor, RetrySettings};
//! use analytics_core::error::BackendError;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = RetryExecutor::new(RetrySettings::default());
//!
//! let rows = executor
//!     .execute("run_report", |_timeout| async { Ok::<_, BackendError>(vec![1, 2, 3]) }, None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{RetryDecision, RetryExecutor, RetrySettings, RetryState};
