//! # Retry Executor
//!
//! Wraps a single remote-call attempt with exponential backoff, capped delay
//! and timeout growth, and an absolute deadline shared by every attempt of one
//! logical call.
//!
//! State machine per call:
//!
//! ```text
//! Idle -> Attempting -> Success
//!                    -> Failed            (status not retryable, or retries disabled)
//!                    -> RetryScheduled -> Attempting
//!                    -> DeadlineExceeded
//! ```

use crate::error::{BackendError, FetchError, StatusCode};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Used when `now + total_timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Immutable retry policy, shared read-only by every executor call
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub retries_enabled: bool,
    pub initial_retry_delay: Duration,
    pub retry_delay_multiplier: f64,
    pub max_retry_delay: Duration,
    pub initial_rpc_timeout: Duration,
    pub rpc_timeout_multiplier: f64,
    pub max_rpc_timeout: Duration,
    pub total_timeout: Duration,
    /// Per-attempt timeout used when retries are disabled
    pub no_retries_rpc_timeout: Duration,
    pub retryable_codes: HashSet<StatusCode>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        crate::config::RetryConfig::default().to_settings()
    }
}

impl RetrySettings {
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retryable_codes.contains(&status)
    }

    /// Timeout for the first attempt of a call
    pub fn first_attempt_timeout(&self) -> Duration {
        if self.retries_enabled {
            self.initial_rpc_timeout
        } else {
            self.no_retries_rpc_timeout
        }
    }

    pub fn without_retries(mut self) -> Self {
        self.retries_enabled = false;
        self
    }
}

/// What to do after a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then attempt again with `timeout`
    Retry { delay: Duration, timeout: Duration },
    DeadlineExceeded,
}

/// Transient state of one logical call
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt_count: u32,
    current_delay: Duration,
    current_timeout: Duration,
    deadline: Instant,
}

impl RetryState {
    /// `deadline` overrides `now + total_timeout` when supplied
    pub fn new(settings: &RetrySettings, now: Instant, deadline: Option<Instant>) -> Self {
        let deadline = deadline.unwrap_or_else(|| {
            now.checked_add(settings.total_timeout)
                .unwrap_or(now + FAR_FUTURE)
        });

        Self {
            attempt_count: 0,
            current_delay: settings.initial_retry_delay,
            current_timeout: settings.first_attempt_timeout(),
            deadline,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn record_attempt(&mut self) {
        self.attempt_count += 1;
    }

    /// Advance delay and timeout after a retryable failure observed at `now`
    pub fn next_retry(&mut self, settings: &RetrySettings, now: Instant) -> RetryDecision {
        if now >= self.deadline {
            return RetryDecision::DeadlineExceeded;
        }

        let remaining = self.deadline - now;
        self.current_delay =
            scale(self.current_delay, settings.retry_delay_multiplier).min(settings.max_retry_delay);
        self.current_timeout = scale(self.current_timeout, settings.rpc_timeout_multiplier)
            .min(settings.max_rpc_timeout)
            .min(remaining);

        RetryDecision::Retry {
            delay: self.current_delay,
            timeout: self.current_timeout,
        }
    }

    /// Shrink the pending attempt's timeout to what is left before the deadline
    fn clamp_timeout(&mut self, now: Instant) {
        self.current_timeout = self
            .current_timeout
            .min(self.deadline.saturating_duration_since(now));
    }
}

fn scale(duration: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * multiplier).unwrap_or(duration)
}

/// Runs remote calls under a [`RetrySettings`] policy.
///
/// Backoff waits are `tokio::time::sleep`s: they suspend only the calling
/// task, and concurrent calls never share retry state.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    settings: RetrySettings,
}

impl RetryExecutor {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Execute `call` until it succeeds, fails terminally, or the deadline passes.
    ///
    /// `call` receives the timeout for the attempt it is about to make. An
    /// attempt that overruns its timeout counts as a `DEADLINE_EXCEEDED`
    /// failure. With retries disabled exactly one attempt is made and its
    /// failure is returned unchanged.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        mut call: F,
        deadline: Option<Instant>,
    ) -> Result<T, FetchError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let started = Instant::now();
        let mut state = RetryState::new(&self.settings, started, deadline);

        loop {
            state.record_attempt();
            let timeout = state.current_timeout();

            let error = match attempt(&mut call, timeout).await {
                Ok(value) => {
                    if state.attempt_count() > 1 {
                        info!(
                            operation = %operation,
                            attempts = state.attempt_count(),
                            "✅ Remote call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.settings.retries_enabled {
                debug!(operation = %operation, status = %error.status, "Retries disabled - failing after one attempt");
                return Err(FetchError::Backend(error));
            }

            if !self.settings.is_retryable(error.status) {
                warn!(
                    operation = %operation,
                    status = %error.status,
                    attempt = state.attempt_count(),
                    error = %error.message,
                    "Non-retryable remote failure"
                );
                return Err(FetchError::Backend(error));
            }

            match state.next_retry(&self.settings, Instant::now()) {
                RetryDecision::DeadlineExceeded => {
                    return Err(deadline_exceeded(operation, &state, started));
                }
                RetryDecision::Retry { delay, timeout } => {
                    debug!(
                        operation = %operation,
                        status = %error.status,
                        attempt = state.attempt_count(),
                        delay_ms = delay.as_millis() as u64,
                        next_timeout_ms = timeout.as_millis() as u64,
                        "🔁 Retrying remote call"
                    );
                    tokio::time::sleep(delay).await;

                    let now = Instant::now();
                    if now >= state.deadline() {
                        return Err(deadline_exceeded(operation, &state, started));
                    }
                    state.clamp_timeout(now);
                }
            }
        }
    }
}

async fn attempt<F, Fut, T>(call: &mut F, timeout: Duration) -> Result<T, BackendError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, call(timeout)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::new(
            StatusCode::DeadlineExceeded,
            format!("attempt timed out after {}ms", timeout.as_millis()),
        )),
    }
}

fn deadline_exceeded(operation: &str, state: &RetryState, started: Instant) -> FetchError {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    warn!(
        operation = %operation,
        attempts = state.attempt_count(),
        elapsed_ms = elapsed_ms,
        "⏰ Retry deadline exceeded"
    );
    FetchError::RetryDeadlineExceeded {
        attempts: state.attempt_count(),
        elapsed_ms,
    }
}
