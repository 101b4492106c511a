//! Ranking-window cache for hybrid search.
//!
//! A cached entry is a JSON object from rank position to canonical id
//! (`{"0": "123", "1": "456"}`) for one search key. Windows fetched at
//! different offsets merge into the same entry. Writes of the same window
//! carry the same content, so concurrent writers may overwrite each other
//! freely.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use vellum_store::CacheStore;
use vellum_types::CanonicalId;

use crate::error::SearchResult;

/// Everything a cache key depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKeyParts<'a> {
    pub object_type: &'a str,
    /// `field:asc`, `field:desc` or `relevance`.
    pub sort: &'a str,
    pub user: &'a str,
    pub visibility: &'a str,
    pub normalized_query: &'a str,
    /// Canonical rendering of date bounds and filters.
    pub constraints: &'a str,
}

impl CacheKeyParts<'_> {
    /// `search:v1:{type}:{sort}:{user}:{visibility}:{hash}` where `hash`
    /// covers the query and every constraint.
    pub fn key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.normalized_query.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.constraints.as_bytes());
        format!(
            "search:v1:{}:{}:{}:{}:{}",
            self.object_type,
            self.sort,
            self.user,
            self.visibility,
            hex::encode(hasher.finalize().as_bytes())
        )
    }
}

/// Position-indexed id windows over a [`CacheStore`].
pub struct EmbeddingCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Cached ids for positions `offset, offset + 1, ...`, stopping at the
    /// first gap or after `len` ids.
    pub async fn window(&self, key: &str, offset: u64, len: u64) -> SearchResult<Vec<CanonicalId>> {
        let Some(Value::Object(entry)) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        for position in offset..offset.saturating_add(len) {
            match entry.get(&position.to_string()).and_then(CanonicalId::from_value) {
                Some(id) => ids.push(id),
                None => break,
            }
        }
        Ok(ids)
    }

    /// Record `ids` at positions starting from `start`, keeping whatever
    /// else the entry already holds.
    pub async fn store_window(&self, key: &str, start: u64, ids: &[CanonicalId]) -> SearchResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut entry = match self.store.get(key).await? {
            Some(Value::Object(entry)) => entry,
            _ => Map::new(),
        };
        for (position, id) in (start..).zip(ids) {
            entry.insert(position.to_string(), id.to_value());
        }
        self.store.set(key, Value::Object(entry), self.ttl).await?;
        Ok(())
    }
}
