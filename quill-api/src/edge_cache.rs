//! Shared edge response cache.
//!
//! Holds complete public GET responses keyed by `"GET <path?query>"`,
//! separate from the KV-backed Cache Coordinator. Stores are best-effort;
//! a full cache evicts its oldest entry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use dashmap::DashMap;
use quill_core::{Clock, Timestamp};

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: Timestamp,
    /// Earlier cutoff than the cache-wide TTL, taken from the response's
    /// `max-age`.
    pub expires_at: Option<Timestamp>,
}

impl CachedResponse {
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
    /// A fresh response stored under `key`, if any.
    async fn lookup(&self, key: &str) -> Option<CachedResponse>;

    async fn store(&self, key: String, response: CachedResponse);

    /// Drop every entry whose key starts with `prefix`.
    async fn purge_prefix(&self, prefix: &str);
}

/// Process-local [`EdgeCache`]. A capacity of zero disables it.
pub struct InMemoryEdgeCache {
    entries: DashMap<String, CachedResponse>,
    capacity: usize,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryEdgeCache {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl std::fmt::Debug for InMemoryEdgeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEdgeCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[async_trait]
impl EdgeCache for InMemoryEdgeCache {
    async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let cached = self.entries.get(key).map(|entry| entry.value().clone())?;
        let now = self.clock.now();
        let past_cutoff = cached.expires_at.is_some_and(|cutoff| now >= cutoff);
        if past_cutoff || now - cached.stored_at >= self.ttl {
            self.entries.remove(key);
            return None;
        }
        Some(cached)
    }

    async fn store(&self, key: String, response: CachedResponse) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, response);
    }

    async fn purge_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;

    fn cached(clock: &ManualClock, body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            stored_at: clock.now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::fixed());
        let cache = InMemoryEdgeCache::new(8, Duration::from_secs(300), clock.clone());
        cache.store("GET /notes".to_string(), cached(&clock, "a")).await;

        assert!(cache.lookup("GET /notes").await.is_some());
        clock.advance(Duration::from_secs(300));
        assert!(cache.lookup("GET /notes").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_entry_cutoff_precedes_ttl() {
        let clock = Arc::new(ManualClock::fixed());
        let cache = InMemoryEdgeCache::new(8, Duration::from_secs(300), clock.clone());
        let mut response = cached(&clock, "a");
        response.expires_at = Some(clock.now() + chrono::Duration::seconds(30));
        cache.store("GET /notes/1".to_string(), response).await;

        clock.advance(Duration::from_secs(29));
        assert!(cache.lookup("GET /notes/1").await.is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.lookup("GET /notes/1").await.is_none());
    }

    #[tokio::test]
    async fn test_full_cache_evicts_oldest() {
        let clock = Arc::new(ManualClock::fixed());
        let cache = InMemoryEdgeCache::new(2, Duration::from_secs(300), clock.clone());
        cache.store("GET /a".to_string(), cached(&clock, "a")).await;
        clock.advance(Duration::from_secs(1));
        cache.store("GET /b".to_string(), cached(&clock, "b")).await;
        clock.advance(Duration::from_secs(1));
        cache.store("GET /c".to_string(), cached(&clock, "c")).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("GET /a").await.is_none());
        assert!(cache.lookup("GET /c").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_capacity_stores_nothing() {
        let clock = Arc::new(ManualClock::fixed());
        let cache = InMemoryEdgeCache::new(0, Duration::from_secs(300), clock.clone());
        cache.store("GET /a".to_string(), cached(&clock, "a")).await;
        assert!(cache.lookup("GET /a").await.is_none());
    }

    #[tokio::test]
    async fn test_purge_prefix() {
        let clock = Arc::new(ManualClock::fixed());
        let cache = InMemoryEdgeCache::new(8, Duration::from_secs(300), clock.clone());
        cache.store("GET /notes".to_string(), cached(&clock, "a")).await;
        cache.store("GET /notes/1".to_string(), cached(&clock, "b")).await;
        cache.store("GET /profiles/1".to_string(), cached(&clock, "c")).await;

        cache.purge_prefix("GET /notes").await;
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("GET /profiles/1").await.is_some());
    }
}
