//! # Analytics Service
//!
//! Request-facing coordinator implementing the cache-aside policy for the
//! three report shapes. Every call ends in a [`ReportEnvelope`]: failures are
//! published as `QueryFailed` events and folded into the failure envelope.
//!
//! Decision order for a request:
//!
//! 1. publish `Requested`
//! 2. derive the cache key
//! 3. cache hit (caching on, no force refresh): serve it, enqueue a
//!    background refresh when jobs are enabled
//! 4. jobs enabled, no force refresh: enqueue a fetch; serve a stale entry
//!    tagged `refreshing` if one exists
//! 5. otherwise fetch synchronously, cache and serve
//!
//! Cache and queue failures degrade to "empty cache" and "enqueue was a
//! no-op" respectively.

use super::fetch_task::{ttl_for, ReportFetcher};
use crate::cache::{CacheKey, CacheStore, KeyGenerator};
use crate::config::AnalyticsConfig;
use crate::error::FetchError;
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::{log_error, log_fetch_operation};
use crate::messaging::{FetchJob, TaskQueue};
use crate::models::{DateRange, Dimension, Metric, NormalizedRows, QueryParameters, ReportEnvelope, ResponseStatus};
use crate::transform::to_envelope;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct AnalyticsService {
    fetcher: ReportFetcher,
    cache: Arc<dyn CacheStore>,
    queue: Arc<dyn TaskQueue>,
    events: EventPublisher,
    keys: KeyGenerator,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(
        config: AnalyticsConfig,
        fetcher: ReportFetcher,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn TaskQueue>,
        events: EventPublisher,
    ) -> Self {
        Self {
            fetcher,
            cache,
            queue,
            events,
            keys: KeyGenerator::new(),
            config,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Standard report over a date range
    pub async fn run_report<D, M>(
        &self,
        date_range: DateRange,
        dimensions: D,
        metrics: M,
        force_refresh: bool,
    ) -> ReportEnvelope
    where
        D: IntoIterator,
        D::Item: Into<Dimension>,
        M: IntoIterator,
        M::Item: Into<Metric>,
    {
        self.fetch(QueryParameters::report(date_range, dimensions, metrics), force_refresh)
            .await
    }

    /// Realtime report; cached with the short realtime lifetime
    pub async fn run_realtime<D, M>(&self, dimensions: D, metrics: M, force_refresh: bool) -> ReportEnvelope
    where
        D: IntoIterator,
        D::Item: Into<Dimension>,
        M: IntoIterator,
        M::Item: Into<Metric>,
    {
        self.fetch(QueryParameters::realtime(dimensions, metrics), force_refresh)
            .await
    }

    /// Values of a single dimension over a date range
    pub async fn run_dimension_report(
        &self,
        date_range: DateRange,
        dimension: impl Into<Dimension>,
        force_refresh: bool,
    ) -> ReportEnvelope {
        self.fetch(QueryParameters::dimension_report(date_range, dimension), force_refresh)
            .await
    }

    /// Serve any prepared query
    pub async fn fetch(&self, params: QueryParameters, force_refresh: bool) -> ReportEnvelope {
        let report_type = params.report_type();
        self.events.publish(LifecycleEvent::Requested {
            report_type,
            parameters: params.clone(),
            force_refresh,
        });

        let key = self.keys.key_for(&params);
        match self.resolve(&params, &key, force_refresh).await {
            Ok(envelope) => envelope,
            Err(error) => {
                log_error(
                    "analytics_service",
                    "fetch",
                    &error.reason(),
                    Some(key.as_str()),
                );
                self.events.publish(LifecycleEvent::QueryFailed {
                    report_type,
                    parameters: params,
                    reason: error.reason(),
                    status: error.status(),
                });
                ReportEnvelope::failure(error.reason())
            }
        }
    }

    /// Serve several queries concurrently; envelopes come back in input order
    pub async fn fetch_all<I>(&self, queries: I, force_refresh: bool) -> Vec<ReportEnvelope>
    where
        I: IntoIterator<Item = QueryParameters>,
    {
        join_all(
            queries
                .into_iter()
                .map(|params| self.fetch(params, force_refresh)),
        )
        .await
    }

    async fn resolve(
        &self,
        params: &QueryParameters,
        key: &CacheKey,
        force_refresh: bool,
    ) -> Result<ReportEnvelope, FetchError> {
        let started = Instant::now();
        let report_type = params.report_type();
        let caching = self.config.cache.enabled;
        let background = self.config.background_jobs.enabled;

        if caching && !force_refresh {
            if let Some(rows) = self.cached_rows(key).await {
                if background {
                    self.enqueue_fetch(params, key).await;
                }
                self.publish_fetched(params, &rows, true);
                log_fetch_operation(
                    "fetch",
                    report_type.as_str(),
                    Some(key.as_str()),
                    "cache_hit",
                    Some(started.elapsed().as_millis() as u64),
                    None,
                );
                return Ok(to_envelope(rows, None));
            }
        }

        // background jobs write entries even when request-path caching is off
        if background && !force_refresh && self.enqueue_fetch(params, key).await {
            if let Some(stale) = self.cached_rows(key).await {
                log_fetch_operation(
                    "fetch",
                    report_type.as_str(),
                    Some(key.as_str()),
                    "stale_refreshing",
                    Some(started.elapsed().as_millis() as u64),
                    None,
                );
                return Ok(to_envelope(stale, Some(ResponseStatus::Refreshing)));
            }
            debug!(cache_key = %key, "Nothing cached yet - fetching synchronously");
        }

        let rows = self.fetcher.fetch_rows(params).await?;

        if caching {
            let ttl = ttl_for(report_type, &self.config.cache);
            if let Err(e) = self.cache.put_rows(key.as_str(), &rows, Some(ttl)).await {
                warn!(cache_key = %key, error = %e, "Failed to cache fetched rows");
            }
        }

        self.publish_fetched(params, &rows, false);
        log_fetch_operation(
            "fetch",
            report_type.as_str(),
            Some(key.as_str()),
            "fetched",
            Some(started.elapsed().as_millis() as u64),
            None,
        );
        Ok(to_envelope(rows, None))
    }

    /// Cached rows for `key`; store failures and undecodable entries read as a miss
    async fn cached_rows(&self, key: &CacheKey) -> Option<NormalizedRows> {
        match self.cache.has(key.as_str()).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache lookup failed - treating as miss");
                return None;
            }
        }

        match self.cache.get_rows(key.as_str()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed - treating as miss");
                None
            }
        }
    }

    /// Returns whether the job was accepted
    async fn enqueue_fetch(&self, params: &QueryParameters, key: &CacheKey) -> bool {
        let job = FetchJob::new(params.clone())
            .with_cache_key(key.clone())
            .on_queue(self.config.background_jobs.queue_name.clone());

        match self.queue.enqueue(job).await {
            Ok(job_id) => {
                debug!(cache_key = %key, job_id = %job_id, "Background refresh enqueued");
                true
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Enqueue failed - continuing without background refresh");
                false
            }
        }
    }

    fn publish_fetched(&self, params: &QueryParameters, rows: &NormalizedRows, from_cache: bool) {
        self.events.publish(LifecycleEvent::Fetched {
            report_type: params.report_type(),
            parameters: params.clone(),
            data: rows.clone(),
            from_cache,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::error::{BackendError, QueueError, StatusCode};
    use crate::events::PublishedEvent;
    use crate::messaging::JobId;
    use crate::test_helpers::{sample_report, ScriptedBackend};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    /// Records jobs without running them
    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<FetchJob>>,
        reject: bool,
    }

    #[async_trait]
    impl TaskQueue for RecordingQueue {
        async fn enqueue(&self, job: FetchJob) -> Result<JobId, QueueError> {
            if self.reject {
                return Err(QueueError::Rejected {
                    queue_name: job.queue_name,
                    message: "full".to_string(),
                });
            }
            let id = job.id;
            self.jobs.lock().push(job);
            Ok(id)
        }

        fn cancel(&self, _id: JobId) -> bool {
            false
        }

        fn is_pending(&self, id: JobId) -> bool {
            self.jobs.lock().iter().any(|job| job.id == id)
        }
    }

    struct Harness {
        backend: Arc<ScriptedBackend>,
        cache: Arc<InMemoryCacheStore>,
        queue: Arc<RecordingQueue>,
        service: AnalyticsService,
        receiver: broadcast::Receiver<PublishedEvent>,
    }

    fn harness(background: bool, reject: bool) -> Harness {
        let mut config = AnalyticsConfig::for_test();
        config.background_jobs.enabled = background;

        let backend = Arc::new(ScriptedBackend::new());
        let cache = Arc::new(InMemoryCacheStore::from_config(&config.cache));
        let queue = Arc::new(RecordingQueue {
            reject,
            ..RecordingQueue::default()
        });
        let events = EventPublisher::new(32);
        let receiver = events.subscribe();
        let service = AnalyticsService::new(
            config.clone(),
            ReportFetcher::from_config(backend.clone(), &config),
            cache.clone(),
            queue.clone(),
            events,
        );

        Harness {
            backend,
            cache,
            queue,
            service,
            receiver,
        }
    }

    fn drain(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(published) = receiver.try_recv() {
            events.push(published.event);
        }
        events
    }

    fn params() -> QueryParameters {
        QueryParameters::report(DateRange::new("7daysAgo", "today"), ["country"], ["sessions"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_enqueues_background_refresh() {
        let mut h = harness(true, false);
        let params = params();
        let key = KeyGenerator::new().key_for(&params);
        h.cache
            .put_rows(key.as_str(), &vec![Default::default()], None)
            .await
            .unwrap();

        let envelope = h.service.fetch(params, false).await;

        assert!(envelope.is_success());
        assert!(!envelope.is_refreshing());
        assert_eq!(h.queue.jobs.lock().len(), 1);
        assert_eq!(h.queue.jobs.lock()[0].cache_key.as_ref(), Some(&key));
        assert_eq!(h.backend.total_calls(), 0);
        assert!(drain(&mut h.receiver)
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Fetched { from_cache: true, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_written_by_job_served_as_refreshing_when_caching_off() {
        let h = harness(true, false);
        let mut service_config = h.service.config().clone();
        service_config.cache.enabled = false;
        let service = AnalyticsService::new(
            service_config.clone(),
            ReportFetcher::from_config(h.backend.clone(), &service_config),
            h.cache.clone(),
            h.queue.clone(),
            EventPublisher::new(8),
        );
        let params = params();
        let key = KeyGenerator::new().key_for(&params);
        h.cache
            .put_rows(key.as_str(), &vec![Default::default()], None)
            .await
            .unwrap();

        let envelope = service.fetch(params, false).await;

        assert!(envelope.is_refreshing());
        assert_eq!(envelope.metadata().unwrap().count, 1);
        assert_eq!(h.queue.jobs.lock().len(), 1);
        assert_eq!(h.backend.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_with_jobs_enabled_enqueues_then_fetches() {
        let h = harness(true, false);
        h.backend.push_ok(sample_report());

        let envelope = h.service.fetch(params(), false).await;

        assert!(envelope.is_success());
        assert_eq!(envelope.data().unwrap().len(), 2);
        assert_eq!(h.queue.jobs.lock().len(), 1);
        assert_eq!(h.backend.report_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_enqueue_falls_back_to_sync_fetch() {
        let h = harness(true, true);
        h.backend.push_ok(sample_report());

        let envelope = h.service.fetch(params(), false).await;

        assert!(envelope.is_success());
        assert!(h.queue.jobs.lock().is_empty());
        assert_eq!(h.backend.report_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_bypasses_cache_and_queue() {
        let h = harness(true, false);
        let params = params();
        let key = KeyGenerator::new().key_for(&params);
        h.cache.put_rows(key.as_str(), &Vec::new(), None).await.unwrap();
        h.backend.push_ok(sample_report());

        let envelope = h.service.fetch(params, true).await;

        assert_eq!(envelope.data().unwrap().len(), 2);
        assert!(h.queue.jobs.lock().is_empty());
        assert_eq!(h.cache.get_rows(key.as_str()).await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caching_disabled_skips_cache_write() {
        let mut h = harness(false, false);
        h.service.config.cache.enabled = false;
        let params = params();
        let key = KeyGenerator::new().key_for(&params);
        h.backend.push_ok(sample_report());

        let envelope = h.service.fetch(params, false).await;

        assert!(envelope.is_success());
        assert!(!h.cache.has(key.as_str()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_sync_fetch_uses_realtime_ttl() {
        let h = harness(false, false);
        h.backend.push_ok(sample_report());
        let params = QueryParameters::realtime(["country"], ["activeUsers"]);
        let key = KeyGenerator::new().key_for(&params);

        h.service.fetch(params, false).await;
        assert!(h.cache.has(key.as_str()).await.unwrap());

        tokio::time::advance(h.service.config().cache.realtime_lifetime()).await;
        assert!(!h.cache.has(key.as_str()).await.unwrap());
        assert_eq!(h.backend.realtime_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_serves_each_query() {
        let h = harness(false, false);
        h.backend.set_fallback_ok(sample_report());
        let queries = vec![
            params(),
            QueryParameters::realtime(["country"], ["activeUsers"]),
            QueryParameters::dimension_report(DateRange::new("7daysAgo", "today"), "city"),
        ];
        let keys: Vec<CacheKey> = queries.iter().map(|q| KeyGenerator::new().key_for(q)).collect();

        let envelopes = h.service.fetch_all(queries, false).await;

        assert_eq!(envelopes.len(), 3);
        assert!(envelopes.iter().all(ReportEnvelope::is_success));
        assert_eq!(h.backend.report_calls(), 2);
        assert_eq!(h.backend.realtime_calls(), 1);
        for key in keys {
            assert!(h.cache.has(key.as_str()).await.unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_failure_becomes_envelope() {
        let mut h = harness(false, false);
        h.backend
            .set_fallback_err(BackendError::new(StatusCode::Unavailable, "down"));

        let envelope = h
            .service
            .run_dimension_report(DateRange::new("7daysAgo", "today"), "city", false)
            .await;

        assert!(!envelope.is_success());
        assert!(envelope.error().unwrap().contains("Retry total timeout exceeded"));
        let events = drain(&mut h.receiver);
        assert!(matches!(events.first(), Some(LifecycleEvent::Requested { .. })));
        assert!(matches!(
            events.last(),
            Some(LifecycleEvent::QueryFailed {
                status: Some(StatusCode::DeadlineExceeded),
                ..
            })
        ));
    }
}
