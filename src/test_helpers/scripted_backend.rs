//! In-memory reporting backend that replays scripted outcomes.

use crate::backend::{Header, RawReport, RawRow, ReportRequest, ReportingBackend};
use crate::error::{BackendError, StatusCode};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Two-row country/sessions report
pub fn sample_report() -> RawReport {
    RawReport {
        dimension_headers: vec![Some(Header::new("country"))],
        metric_headers: vec![Some(Header::new("sessions"))],
        rows: vec![
            RawRow {
                dimension_values: vec!["New Zealand".to_string()],
                metric_values: vec!["120".to_string()],
            },
            RawRow {
                dimension_values: vec!["Australia".to_string()],
                metric_values: vec!["87".to_string()],
            },
        ],
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Respond(Result<RawReport, BackendError>),
    Hang,
}

/// Backend that answers from a FIFO script, then from a fallback.
///
/// Every call is counted and the timeout it was given recorded.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    report_calls: AtomicUsize,
    realtime_calls: AtomicUsize,
    timeouts: Mutex<Vec<Duration>>,
    requests: Mutex<Vec<ReportRequest>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// With an empty script every call fails with `UNIMPLEMENTED`
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Outcome::Respond(Err(BackendError::new(
                StatusCode::Unimplemented,
                "no scripted response",
            )))),
            report_calls: AtomicUsize::new(0),
            realtime_calls: AtomicUsize::new(0),
            timeouts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_ok(&self, report: RawReport) {
        self.script.lock().push_back(Outcome::Respond(Ok(report)));
    }

    pub fn push_err(&self, error: BackendError) {
        self.script.lock().push_back(Outcome::Respond(Err(error)));
    }

    /// Next call never completes; only its timeout ends it
    pub fn push_hang(&self) {
        self.script.lock().push_back(Outcome::Hang);
    }

    pub fn set_fallback_ok(&self, report: RawReport) {
        *self.fallback.lock() = Outcome::Respond(Ok(report));
    }

    pub fn set_fallback_err(&self, error: BackendError) {
        *self.fallback.lock() = Outcome::Respond(Err(error));
    }

    pub fn report_calls(&self) -> usize {
        self.report_calls.load(Ordering::SeqCst)
    }

    pub fn realtime_calls(&self) -> usize {
        self.realtime_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.report_calls() + self.realtime_calls()
    }

    pub fn observed_timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().clone()
    }

    pub fn requests(&self) -> Vec<ReportRequest> {
        self.requests.lock().clone()
    }

    async fn respond(&self, request: &ReportRequest, timeout: Duration) -> Result<RawReport, BackendError> {
        self.timeouts.lock().push(timeout);
        self.requests.lock().push(request.clone());

        let outcome = {
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.lock().clone())
        };

        match outcome {
            Outcome::Respond(result) => result,
            Outcome::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ReportingBackend for ScriptedBackend {
    async fn run_report(&self, request: &ReportRequest, timeout: Duration) -> Result<RawReport, BackendError> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(request, timeout).await
    }

    async fn run_realtime_report(
        &self,
        request: &ReportRequest,
        timeout: Duration,
    ) -> Result<RawReport, BackendError> {
        self.realtime_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(request, timeout).await
    }
}
