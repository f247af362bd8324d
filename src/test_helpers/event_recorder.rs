//! Event handler that keeps everything it sees.

use crate::events::{EventHandler, LifecycleEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<LifecycleEvent>>,
    notify: Notify,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Wait until at least `count` recorded events satisfy `predicate`.
    /// Returns false if `within` elapses first.
    pub async fn wait_for(
        &self,
        count: usize,
        within: Duration,
        predicate: impl Fn(&LifecycleEvent) -> bool,
    ) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count_matching(&predicate) >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(within, wait).await.is_ok()
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    fn name(&self) -> &str {
        "event_recorder"
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
