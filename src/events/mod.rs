//! # Event Bus
//!
//! Lifecycle events for report fetches, broadcast to zero or more handlers.
//! Publication is fire-and-forget; each handler runs on its own task.

pub mod publisher;
pub mod types;

pub use publisher::{EventHandler, EventPublisher, PublishedEvent, Subscription};
pub use types::LifecycleEvent;
