//! # Realtime Refresh Loop
//!
//! Every `CacheUpdated` event for a realtime report schedules the next fetch
//! of the same query after the update interval, so a realtime entry keeps
//! refreshing itself for as long as the loop runs.
//!
//! At most one refresh is scheduled per key: a new one supersedes and cancels
//! the previous, so a refresh enqueued elsewhere for the same query joins the
//! loop instead of starting a second one.
//!
//! The loop is owned by a [`RealtimeSubscription`]. Cancelling it stops event
//! handling and cancels every job it scheduled; [`RealtimeSubscription::stop_updates`]
//! does the same for a single key. A fetch already running when either is
//! called still completes but is not redelivered.

use crate::cache::{CacheKey, CacheStore, KeyGenerator};
use crate::error::FetchError;
use crate::events::{EventHandler, EventPublisher, LifecycleEvent, Subscription};
use crate::messaging::{FetchJob, JobId, TaskQueue};
use crate::models::QueryParameters;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RealtimeRescheduler {
    queue: Arc<dyn TaskQueue>,
    interval: Duration,
    queue_name: String,
    keys: KeyGenerator,
    /// Most recent job scheduled per key, until it finishes
    pending: DashMap<CacheKey, JobId>,
    stopped: DashSet<CacheKey>,
}

impl RealtimeRescheduler {
    pub fn new(queue: Arc<dyn TaskQueue>, interval: Duration, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            interval,
            queue_name: queue_name.into(),
            keys: KeyGenerator::new(),
            pending: DashMap::new(),
            stopped: DashSet::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start handling events; the returned subscription owns the loop
    pub fn subscribe(
        self: Arc<Self>,
        events: &EventPublisher,
        cache: Arc<dyn CacheStore>,
    ) -> RealtimeSubscription {
        let subscription = events.subscribe_handler(self.clone());
        info!(
            interval_seconds = self.interval.as_secs(),
            "🔄 Realtime refresh loop started"
        );
        RealtimeSubscription {
            rescheduler: self,
            subscription,
            cache,
        }
    }

    /// Job tracked for `key`, if it has not finished yet
    pub fn pending_job(&self, key: &CacheKey) -> Option<JobId> {
        let job_id = self.pending.get(key).map(|entry| *entry.value())?;
        self.queue.is_pending(job_id).then_some(job_id)
    }

    /// Number of keys with an unfinished refresh
    pub fn pending_count(&self) -> usize {
        self.prune_finished();
        self.pending.len()
    }

    pub fn is_stopped(&self, key: &CacheKey) -> bool {
        self.stopped.contains(key)
    }

    async fn schedule(&self, params: QueryParameters, key: CacheKey) -> Result<JobId, FetchError> {
        let job = FetchJob::new(params)
            .with_cache_key(key.clone())
            .with_delay(self.interval)
            .on_queue(self.queue_name.clone());

        let job_id = self.queue.enqueue(job).await?;
        if let Some(previous) = self.pending.insert(key.clone(), job_id) {
            if previous != job_id && self.queue.cancel(previous) {
                debug!(cache_key = %key, job_id = %previous, "Superseded realtime refresh cancelled");
            }
        }

        // stop_updates may have run while the job was being enqueued
        if self.stopped.contains(&key) {
            self.queue.cancel(job_id);
            self.pending.remove(&key);
            debug!(cache_key = %key, "Updates stopped during scheduling - job cancelled");
        } else {
            debug!(
                cache_key = %key,
                job_id = %job_id,
                delay_seconds = self.interval.as_secs(),
                "Next realtime refresh scheduled"
            );
        }
        Ok(job_id)
    }

    fn cancel_pending(&self, key: &CacheKey) -> bool {
        match self.pending.remove(key) {
            Some((_, job_id)) => self.queue.cancel(job_id),
            None => false,
        }
    }

    fn cancel_all_pending(&self) -> usize {
        let keys: Vec<CacheKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.cancel_pending(key)).count()
    }

    /// Drop entries whose job completed or was dead-lettered
    fn prune_finished(&self) {
        self.pending.retain(|_, job_id| self.queue.is_pending(*job_id));
    }
}

#[async_trait]
impl EventHandler for RealtimeRescheduler {
    fn name(&self) -> &str {
        "realtime_rescheduler"
    }

    fn interested_in(&self, event: &LifecycleEvent) -> bool {
        matches!(event, LifecycleEvent::CacheUpdated { report_type, .. } if report_type.is_realtime())
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let LifecycleEvent::CacheUpdated {
            cache_key,
            parameters,
            ..
        } = event
        else {
            return Ok(());
        };

        self.prune_finished();
        if self.stopped.contains(cache_key) {
            debug!(cache_key = %cache_key, "Realtime updates stopped - not rescheduling");
            return Ok(());
        }

        self.schedule(parameters.clone(), cache_key.clone()).await?;
        Ok(())
    }
}

/// Handle to a running realtime refresh loop
pub struct RealtimeSubscription {
    rescheduler: Arc<RealtimeRescheduler>,
    subscription: Subscription,
    cache: Arc<dyn CacheStore>,
}

impl RealtimeSubscription {
    pub fn rescheduler(&self) -> &RealtimeRescheduler {
        &self.rescheduler
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Begin refreshing a realtime query, first fetch after one interval
    pub async fn schedule_updates(&self, params: QueryParameters) -> Result<CacheKey, FetchError> {
        if !params.report_type().is_realtime() {
            return Err(FetchError::InvalidReportType(format!(
                "{} queries cannot be scheduled for realtime updates",
                params.report_type()
            )));
        }

        let key = self.rescheduler.keys.key_for(&params);
        self.rescheduler.stopped.remove(&key);
        self.rescheduler.cancel_pending(&key);
        self.rescheduler.schedule(params, key.clone()).await?;

        info!(cache_key = %key, "Realtime updates scheduled");
        Ok(key)
    }

    /// Stop refreshing one key: cancel its scheduled fetch, refuse further
    /// reschedules and drop the cached entry
    pub async fn stop_updates(&self, key: &CacheKey) {
        self.rescheduler.stopped.insert(key.clone());
        let cancelled = self.rescheduler.cancel_pending(key);

        if let Err(e) = self.cache.forget(key.as_str()).await {
            warn!(cache_key = %key, error = %e, "Failed to forget realtime cache entry");
        }
        info!(cache_key = %key, cancelled_job = cancelled, "Realtime updates stopped");
    }

    /// Stop the whole loop
    pub fn cancel(&self) {
        self.subscription.cancel();
        let cancelled = self.rescheduler.cancel_all_pending();
        self.rescheduler.pending.clear();
        self.rescheduler.stopped.clear();
        info!(cancelled_jobs = cancelled, "🛑 Realtime refresh loop cancelled");
    }
}
