//! Single-key KV store abstraction and the in-process implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::{Clock, Timestamp};
use tokio::sync::RwLock;

/// Failure of the KV backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached or refused the operation.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Minimal contract of the external cache: string keys, string values,
/// per-entry TTL. No prefix scans and no pattern deletes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Timestamp,
}

/// In-process KV store with lazy expiry.
///
/// `set_available(false)` simulates an outage: every call fails with
/// [`CacheError::Unavailable`] until availability is restored.
#[derive(Debug)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory store marked down".to_string()))
        }
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub async fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it so the map does not grow without bound.
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check_available()?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let expires_at = self.clock.now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}
