//! Cache store interface and an in-process implementation.

use crate::error::CacheError;
use crate::models::NormalizedRows;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key/value store with per-entry TTL.
///
/// `put` is atomic per key: readers observe either the previous value or the
/// new one. `clear` is best-effort and may race with concurrent `put`s.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value; `None` uses the store's default lifetime
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// Returns whether an entry was removed
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Read and decode normalized rows; an undecodable entry is an error
    async fn get_rows(&self, key: &str) -> Result<Option<NormalizedRows>, CacheError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn put_rows(
        &self,
        key: &str,
        rows: &NormalizedRows,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(rows).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.put(key, value, ttl).await
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent in-memory store.
///
/// Every key is namespaced as `<prefix>:<key>`. Expired entries are evicted
/// lazily on access and in bulk by [`InMemoryCacheStore::purge_expired`].
#[derive(Debug)]
pub struct InMemoryCacheStore {
    prefix: String,
    default_ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new(prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            default_ttl,
            entries: DashMap::new(),
        }
    }

    pub fn from_config(config: &crate::config::CacheConfig) -> Self {
        Self::new(config.prefix.clone(), config.lifetime())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        let prefixed = self.prefixed_key(key);
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&prefixed) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        // only evict if it is still the expired entry we saw
        if self
            .entries
            .remove_if(&prefixed, |_, entry| entry.is_expired(now))
            .is_some()
        {
            debug!(cache_key = %key, "Evicted expired cache entry");
        }
        None
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.live_value(key))
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            warn!(cache_key = %key, "Zero TTL requested - entry expires immediately");
        }

        self.entries.insert(
            self.prefixed_key(key),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        debug!(cache_key = %key, ttl_seconds = ttl.as_secs(), "Cache entry stored");
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_value(key).is_some())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(&self.prefixed_key(key)).is_some())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let namespace = format!("{}:", self.prefix);
        self.entries.retain(|k, _| !k.starts_with(&namespace));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportRow;
    use serde_json::json;

    fn store() -> InMemoryCacheStore {
        InMemoryCacheStore::new("analytics", Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_then_get_round_trip() {
        let store = store();
        store
            .put("report:abc", json!({"rows": 3}), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(store.get("report:abc").await.unwrap(), Some(json!({"rows": 3})));
        assert!(store.has("report:abc").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = store();
        store
            .put("realtime:abc", json!([1]), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.has("realtime:abc").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!store.has("realtime:abc").await.unwrap());
        assert_eq!(store.get("realtime:abc").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let store = store();
        store.put("report:x", json!(1), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.has("report:x").await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.has("report:x").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_and_forget() {
        let store = store();
        store.put("k", json!("old"), None).await.unwrap();
        store.put("k", json!("new"), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("new")));

        assert!(store.forget("k").await.unwrap());
        assert!(!store.forget("k").await.unwrap());
        assert!(!store.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_only_touches_own_prefix() {
        let store = store();
        store.put("a", json!(1), None).await.unwrap();
        store.put("b", json!(2), None).await.unwrap();
        store.entries.insert(
            "other:c".to_string(),
            CacheEntry {
                value: json!(3),
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );

        store.clear().await.unwrap();

        assert!(!store.has("a").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = store();
        store.put("short", json!(1), Some(Duration::from_secs(1))).await.unwrap();
        store.put("long", json!(2), Some(Duration::from_secs(100))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.has("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_typed_rows_helpers() {
        let store = store();
        let rows = vec![ReportRow {
            dimensions: [("country".to_string(), "NZ".to_string())].into(),
            metrics: [("sessions".to_string(), "42".to_string())].into(),
        }];

        store.put_rows("report:rows", &rows, None).await.unwrap();
        assert_eq!(store.get_rows("report:rows").await.unwrap(), Some(rows));

        store.put("report:bad", json!("not rows"), None).await.unwrap();
        assert!(matches!(
            store.get_rows("report:bad").await,
            Err(CacheError::Serialization { .. })
        ));
    }
}
