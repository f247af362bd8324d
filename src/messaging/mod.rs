//! # Messaging
//!
//! Background job descriptors and the queue that delivers them to workers.

pub mod message;
pub mod queue;

pub use message::{FetchJob, JobId};
pub use queue::{DeadLetter, InProcessTaskQueue, JobHandler, TaskQueue};
