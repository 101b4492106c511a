use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Shared key/value cache with per-entry expiry.
///
/// Concurrent writers to the same key race with last-write-wins semantics.
/// Callers only write content that is a pure function of the key, so the
/// race is benign.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry. Expired entries read as `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()>;

    /// Drop an entry. Returns `true` if a live entry existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// In-process [`CacheStore`] backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, live or not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        let live = entries
            .get(key)
            .map(|(value, expires_at)| (*expires_at > Instant::now()).then(|| value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .remove(key)
            .is_some_and(|(_, expires_at)| expires_at > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = InMemoryCache::new();
        cache.set("k", json!([1, 2]), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_read() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_liveness() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
