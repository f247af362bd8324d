//! # Analytics System Bootstrap
//!
//! Builds the dependency graph from configuration: cache, task queue, event
//! bus, fetch job workers, the request-facing service and, when enabled, the
//! realtime refresh loop. Every component receives its collaborators
//! explicitly; nothing is process-global.

use super::fetch_task::{FetchJobExecutor, ReportFetcher};
use super::realtime::{RealtimeRescheduler, RealtimeSubscription};
use super::service::AnalyticsService;
use crate::backend::ReportingBackend;
use crate::cache::{CacheStore, InMemoryCacheStore};
use crate::config::{AnalyticsConfig, ConfigManager};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::messaging::InProcessTaskQueue;
use std::sync::Arc;
use tracing::{info, warn};

/// Running analytics pipeline. Must be created inside a Tokio runtime.
pub struct AnalyticsSystem {
    config_manager: Arc<ConfigManager>,
    service: Arc<AnalyticsService>,
    cache: Arc<dyn CacheStore>,
    queue: InProcessTaskQueue,
    events: EventPublisher,
    realtime: Option<RealtimeSubscription>,
}

/// Point-in-time view of the system
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub environment: String,
    pub cache_enabled: bool,
    pub background_jobs_enabled: bool,
    pub realtime_active: bool,
    pub scheduled_jobs: usize,
    pub completed_jobs: u64,
    pub dead_letters: usize,
    pub event_subscribers: usize,
}

impl AnalyticsSystem {
    /// Validate configuration and wire every component
    pub fn bootstrap(
        config_manager: Arc<ConfigManager>,
        backend: Arc<dyn ReportingBackend>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        info!(
            environment = %config_manager.environment(),
            "🚀 BOOTSTRAP: Starting analytics system"
        );

        let config: AnalyticsConfig = config_manager.config().clone();
        config.validate()?;

        let events = EventPublisher::new(config.events.channel_capacity);
        let fetcher = ReportFetcher::from_config(backend, &config);

        let queue = InProcessTaskQueue::new(&config.background_jobs);
        let executor = FetchJobExecutor::new(
            fetcher.clone(),
            cache.clone(),
            events.clone(),
            config.cache.clone(),
        );
        queue.start(Arc::new(executor));

        let service = Arc::new(AnalyticsService::new(
            config.clone(),
            fetcher,
            cache.clone(),
            Arc::new(queue.clone()),
            events.clone(),
        ));

        let realtime = if config.realtime.enabled {
            let rescheduler = Arc::new(RealtimeRescheduler::new(
                Arc::new(queue.clone()),
                config.realtime.update_interval(),
                config.background_jobs.queue_name.clone(),
            ));
            Some(rescheduler.subscribe(&events, cache.clone()))
        } else {
            info!("Realtime refresh loop disabled");
            None
        };

        info!(
            cache_enabled = config.cache.enabled,
            background_jobs = config.background_jobs.enabled,
            workers = config.background_jobs.workers,
            realtime = realtime.is_some(),
            "✅ BOOTSTRAP: Analytics system ready"
        );

        Ok(Self {
            config_manager,
            service,
            cache,
            queue,
            events,
            realtime,
        })
    }

    /// Bootstrap with an [`InMemoryCacheStore`] built from the cache section
    pub fn with_in_memory_cache(
        config_manager: Arc<ConfigManager>,
        backend: Arc<dyn ReportingBackend>,
    ) -> Result<Self> {
        let cache = Arc::new(InMemoryCacheStore::from_config(&config_manager.config().cache));
        Self::bootstrap(config_manager, backend, cache)
    }

    pub fn service(&self) -> &Arc<AnalyticsService> {
        &self.service
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn queue(&self) -> &InProcessTaskQueue {
        &self.queue
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn realtime(&self) -> Option<&RealtimeSubscription> {
        self.realtime.as_ref()
    }

    pub fn config(&self) -> &AnalyticsConfig {
        self.config_manager.config()
    }

    pub fn status(&self) -> SystemStatus {
        let config = self.config();
        SystemStatus {
            environment: self.config_manager.environment().to_string(),
            cache_enabled: config.cache.enabled,
            background_jobs_enabled: config.background_jobs.enabled,
            realtime_active: self.realtime.as_ref().is_some_and(|r| r.is_active()),
            scheduled_jobs: self.queue.scheduled_count(),
            completed_jobs: self.queue.completed_count(),
            dead_letters: self.queue.dead_letters().len(),
            event_subscribers: self.events.subscriber_count(),
        }
    }

    /// Cancel the realtime loop and stop the queue workers
    pub fn shutdown(&mut self) {
        if let Some(realtime) = self.realtime.take() {
            realtime.cancel();
        }
        if self.queue.is_closed() {
            warn!("Analytics system already shut down");
            return;
        }
        self.queue.shutdown();
        info!("🛑 Analytics system shut down");
    }
}
