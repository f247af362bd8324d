//! # Report Cache
//!
//! Cache-aside building blocks: deterministic key derivation and the store
//! interface the orchestration layer reads from and writes to.

pub mod key;
pub mod store;

pub use key::{CacheKey, KeyGenerator};
pub use store::{CacheStore, InMemoryCacheStore};
