//! # Fetch Task
//!
//! The unit of background work: fetch one report through the retry executor,
//! normalize it, write it to the cache and announce the update.
//!
//! [`ReportFetcher`] is the remote half of that pipeline and is shared with
//! the synchronous request path in [`crate::orchestration::service`].

use crate::backend::{dispatch, ReportRequest, ReportingBackend};
use crate::cache::{CacheStore, KeyGenerator};
use crate::config::{AnalyticsConfig, CacheConfig};
use crate::error::FetchError;
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::log_fetch_operation;
use crate::messaging::{FetchJob, JobHandler};
use crate::models::{NormalizedRows, QueryParameters, ReportType};
use crate::resilience::RetryExecutor;
use crate::transform::transform_report;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cache lifetime for entries of a report type
pub fn ttl_for(report_type: ReportType, cache: &CacheConfig) -> Duration {
    match report_type {
        ReportType::Realtime => cache.realtime_lifetime(),
        ReportType::Report | ReportType::Dimension => cache.lifetime(),
    }
}

/// Builds the request, calls the backend under the retry policy and
/// normalizes the response
#[derive(Clone)]
pub struct ReportFetcher {
    backend: Arc<dyn ReportingBackend>,
    retry: RetryExecutor,
    property: String,
}

impl std::fmt::Debug for ReportFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportFetcher")
            .field("property", &self.property)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ReportFetcher {
    pub fn new(backend: Arc<dyn ReportingBackend>, retry: RetryExecutor, property: impl Into<String>) -> Self {
        Self {
            backend,
            retry,
            property: property.into(),
        }
    }

    pub fn from_config(backend: Arc<dyn ReportingBackend>, config: &AnalyticsConfig) -> Self {
        Self::new(
            backend,
            RetryExecutor::new(config.retry.to_settings()),
            config.property(),
        )
    }

    pub async fn fetch_rows(&self, params: &QueryParameters) -> Result<NormalizedRows, FetchError> {
        let report_type = params.report_type();
        let request = ReportRequest::for_query(&self.property, params);
        let operation = match report_type {
            ReportType::Realtime => "run_realtime_report",
            ReportType::Report | ReportType::Dimension => "run_report",
        };

        let backend = self.backend.as_ref();
        let request = &request;
        let raw = self
            .retry
            .execute(
                operation,
                move |timeout| dispatch(backend, report_type, request, timeout),
                None,
            )
            .await?;

        let rows = transform_report(&raw);
        debug!(report_type = %report_type, rows = rows.len(), "Transformed backend response");
        Ok(rows)
    }
}

/// Runs [`FetchJob`]s delivered by the task queue
pub struct FetchJobExecutor {
    fetcher: ReportFetcher,
    cache: Arc<dyn CacheStore>,
    events: EventPublisher,
    keys: KeyGenerator,
    cache_config: CacheConfig,
}

impl FetchJobExecutor {
    pub fn new(
        fetcher: ReportFetcher,
        cache: Arc<dyn CacheStore>,
        events: EventPublisher,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            events,
            keys: KeyGenerator::new(),
            cache_config,
        }
    }

    fn fail(&self, job: &FetchJob, error: FetchError) -> FetchError {
        self.events.publish(LifecycleEvent::QueryFailed {
            report_type: job.report_type,
            parameters: job.parameters.clone(),
            reason: error.reason(),
            status: error.status(),
        });
        error
    }

    async fn run(&self, job: &FetchJob) -> Result<(), FetchError> {
        let started = Instant::now();

        if job.report_type != job.parameters.report_type() {
            return Err(FetchError::InvalidReportType(format!(
                "job for {} carries {} parameters",
                job.report_type,
                job.parameters.report_type()
            )));
        }

        let cache_key = job
            .cache_key
            .clone()
            .unwrap_or_else(|| self.keys.key_for(&job.parameters));

        let rows = self.fetcher.fetch_rows(&job.parameters).await?;

        self.cache
            .put_rows(
                cache_key.as_str(),
                &rows,
                Some(ttl_for(job.report_type, &self.cache_config)),
            )
            .await?;

        self.events.publish(LifecycleEvent::CacheUpdated {
            cache_key: cache_key.clone(),
            report_type: job.report_type,
            parameters: job.parameters.clone(),
            data: rows.clone(),
        });
        self.events.publish(LifecycleEvent::Fetched {
            report_type: job.report_type,
            parameters: job.parameters.clone(),
            data: rows,
            from_cache: false,
        });

        log_fetch_operation(
            "background_fetch",
            job.report_type.as_str(),
            Some(cache_key.as_str()),
            "cache_updated",
            Some(started.elapsed().as_millis() as u64),
            None,
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for FetchJobExecutor {
    async fn handle(&self, job: &FetchJob) -> Result<(), FetchError> {
        info!(
            job_id = %job.id,
            report_type = %job.report_type,
            attempt = job.attempt,
            "Running fetch job"
        );
        self.run(job).await.map_err(|e| self.fail(job, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawReport;
    use crate::cache::{CacheKey, InMemoryCacheStore};
    use crate::error::{BackendError, StatusCode};
    use crate::models::DateRange;
    use crate::test_helpers::{sample_report, ScriptedBackend};

    struct Harness {
        backend: Arc<ScriptedBackend>,
        cache: Arc<InMemoryCacheStore>,
        events: EventPublisher,
        executor: FetchJobExecutor,
    }

    fn harness() -> Harness {
        let config = AnalyticsConfig::for_test();
        let backend = Arc::new(ScriptedBackend::new());
        let cache = Arc::new(InMemoryCacheStore::from_config(&config.cache));
        let events = EventPublisher::new(16);
        let executor = FetchJobExecutor::new(
            ReportFetcher::from_config(backend.clone(), &config),
            cache.clone(),
            events.clone(),
            config.cache.clone(),
        );
        Harness {
            backend,
            cache,
            events,
            executor,
        }
    }

    #[test]
    fn test_realtime_entries_use_short_lifetime() {
        let cache = CacheConfig::default();
        assert_eq!(ttl_for(ReportType::Realtime, &cache), Duration::from_secs(30));
        assert_eq!(ttl_for(ReportType::Report, &cache), Duration::from_secs(86_400));
        assert_eq!(ttl_for(ReportType::Dimension, &cache), Duration::from_secs(86_400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_stores_rows_under_given_key_and_announces() {
        let h = harness();
        h.backend.push_ok(sample_report());
        let mut receiver = h.events.subscribe();

        let params = QueryParameters::realtime(["country"], ["activeUsers"]);
        let job = FetchJob::new(params).with_cache_key(CacheKey::from("realtime:fixed"));

        h.executor.handle(&job).await.unwrap();

        let stored = h.cache.get_rows("realtime:fixed").await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(h.backend.realtime_calls(), 1);
        assert_eq!(h.backend.report_calls(), 0);

        match receiver.try_recv().unwrap().event {
            LifecycleEvent::CacheUpdated { cache_key, data, .. } => {
                assert_eq!(cache_key.as_str(), "realtime:fixed");
                assert_eq!(data, stored);
            }
            other => panic!("expected CacheUpdated, got {other:?}"),
        }
        assert!(matches!(
            receiver.try_recv().unwrap().event,
            LifecycleEvent::Fetched { from_cache: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_without_key_computes_one() {
        let h = harness();
        h.backend.push_ok(RawReport::default());

        let params = QueryParameters::report(DateRange::new("7daysAgo", "today"), ["city"], ["sessions"]);
        let expected_key = KeyGenerator::new().key_for(&params);

        h.executor.handle(&FetchJob::new(params)).await.unwrap();

        assert_eq!(h.backend.report_calls(), 1);
        assert_eq!(
            h.cache.get_rows(expected_key.as_str()).await.unwrap(),
            Some(Vec::new())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_publishes_query_failed_and_caches_nothing() {
        let h = harness();
        h.backend
            .push_err(BackendError::new(StatusCode::PermissionDenied, "no access"));
        let mut receiver = h.events.subscribe();

        let job = FetchJob::new(QueryParameters::realtime(["country"], ["activeUsers"]))
            .with_cache_key(CacheKey::from("realtime:denied"));
        let err = h.executor.handle(&job).await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::PermissionDenied));
        assert!(!h.cache.has("realtime:denied").await.unwrap());
        match receiver.try_recv().unwrap().event {
            LifecycleEvent::QueryFailed { status, .. } => {
                assert_eq!(status, Some(StatusCode::PermissionDenied))
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_report_type_fails_fast() {
        let h = harness();
        let mut job = FetchJob::new(QueryParameters::realtime(["country"], ["activeUsers"]));
        job.report_type = ReportType::Dimension;

        let err = h.executor.handle(&job).await.unwrap_err();

        assert!(matches!(err, FetchError::InvalidReportType(_)));
        assert_eq!(h.backend.total_calls(), 0);
    }
}
