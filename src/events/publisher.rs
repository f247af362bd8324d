//! # Event Publisher
//!
//! Broadcast bus for lifecycle events. Handlers subscribe independently and
//! each runs on its own task.
//!
//! ```rust
//! use analytics_core::events::{EventPublisher, LifecycleEvent};
//! use analytics_core::models::{QueryParameters, ReportType};
//!
//! # tokio_test::block_on(async {
//! let publisher = EventPublisher::new(16);
//! let mut receiver = publisher.subscribe();
//!
//! let delivered = publisher.publish(LifecycleEvent::Requested {
//!     report_type: ReportType::Realtime,
//!     parameters: QueryParameters::realtime(["country"], ["activeUsers"]),
//!     force_refresh: false,
//! });
//! assert_eq!(delivered, 1);
//!
//! let published = receiver.recv().await.unwrap();
//! assert_eq!(published.event.name(), "analytics.query.requested");
//! # });
//! ```

use super::LifecycleEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fan-out publisher for lifecycle events.
///
/// `publish` never waits on subscribers: a slow subscriber lags and drops
/// events without holding up the publisher or its peers.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: LifecycleEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers will see it
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let name = event.name();
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed
        match self.sender.send(published) {
            Ok(receivers) => {
                debug!(event = name, receivers, "Published lifecycle event");
                receivers
            }
            Err(broadcast::error::SendError(_)) => 0,
        }
    }

    /// Subscribe to raw events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Run `handler` for every event on its own task until the returned
    /// subscription is cancelled or the publisher is dropped
    pub fn subscribe_handler(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let mut receiver = self.sender.subscribe();
        let name = handler.name().to_string();
        let task_name = name.clone();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(published) => {
                        if !handler.interested_in(&published.event) {
                            continue;
                        }
                        if let Err(e) = handler.handle(&published.event).await {
                            warn!(
                                handler = %task_name,
                                event = published.event.name(),
                                error = %e,
                                "Event handler failed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(handler = %task_name, skipped, "Event handler lagging - events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(handler = %task_name, "Event channel closed");
                        break;
                    }
                }
            }
        });

        Subscription { name, task }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

/// Consumer of lifecycle events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Filter applied before `handle`
    fn interested_in(&self, _event: &LifecycleEvent) -> bool {
        true
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

/// Handle to a running event handler task
#[derive(Debug)]
pub struct Subscription {
    name: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop delivering events to the handler
    pub fn cancel(&self) {
        self.task.abort();
        debug!(handler = %self.name, "Event subscription cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryParameters, ReportType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn requested() -> LifecycleEvent {
        LifecycleEvent::Requested {
            report_type: ReportType::Realtime,
            parameters: QueryParameters::realtime(["country"], ["activeUsers"]),
            force_refresh: false,
        }
    }

    struct Counting {
        seen: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _event: &LifecycleEvent) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("handler failure");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        assert_eq!(publisher.publish(requested()), 0);
    }

    #[tokio::test]
    async fn test_raw_subscriber_receives_in_order() {
        let publisher = EventPublisher::new(8);
        let mut receiver = publisher.subscribe();

        publisher.publish(requested());
        publisher.publish(LifecycleEvent::QueryFailed {
            report_type: ReportType::Realtime,
            parameters: QueryParameters::realtime(["country"], ["activeUsers"]),
            reason: "x".into(),
            status: None,
        });

        assert!(matches!(receiver.try_recv().unwrap().event, LifecycleEvent::Requested { .. }));
        assert!(receiver.try_recv().unwrap().event.is_failure());
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_affect_others() {
        let publisher = EventPublisher::new(8);
        let failing = Arc::new(Counting { seen: AtomicUsize::new(0), fail: true });
        let healthy = Arc::new(Counting { seen: AtomicUsize::new(0), fail: false });

        let _a = publisher.subscribe_handler(failing.clone());
        let _b = publisher.subscribe_handler(healthy.clone());

        assert_eq!(publisher.publish(requested()), 2);
        publisher.publish(requested());

        tokio::time::timeout(Duration::from_secs(1), async {
            while healthy.seen.load(Ordering::SeqCst) < 2 || failing.seen.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops_delivery() {
        let publisher = EventPublisher::new(8);
        let handler = Arc::new(Counting { seen: AtomicUsize::new(0), fail: false });
        let subscription = publisher.subscribe_handler(handler.clone());

        subscription.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while subscription.is_active() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(requested());
        tokio::task::yield_now().await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 0);
    }
}
