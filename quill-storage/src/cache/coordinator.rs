//! Fail-open cache coordinator with tracking-set invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::keys::{CacheKey, CachePattern};
use super::kv::KvStore;

// ============================================================================
// READ RESULT
// ============================================================================

/// Outcome of a cache read.
///
/// `Unavailable` exists so outages are observable in stats and logs; callers
/// collapse it into a miss with [`CacheRead::into_option`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRead<T> {
    Hit(T),
    Miss,
    Unavailable,
}

impl<T> CacheRead<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheRead::Hit(value) => Some(value),
            CacheRead::Miss | CacheRead::Unavailable => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheRead::Hit(_))
    }
}

// ============================================================================
// TTL POLICY
// ============================================================================

/// Lifetimes of each kind of cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Resolved (note, user) permission levels.
    pub permission: Duration,
    pub public_note: Duration,
    /// Private and unlisted notes, kept short to bound staleness.
    pub private_note: Duration,
    pub profile: Duration,
    /// Owner listing pages.
    pub listing: Duration,
    /// Tracking sets outlive the keys they list.
    pub tracking: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            permission: Duration::from_secs(5 * 60),
            public_note: Duration::from_secs(60 * 60),
            private_note: Duration::from_secs(5 * 60),
            profile: Duration::from_secs(60 * 60),
            listing: Duration::from_secs(5 * 60),
            tracking: Duration::from_secs(24 * 60 * 60),
        }
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Point-in-time cache read counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that failed because the backend was unreachable.
    pub unavailable: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Outages count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.unavailable;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    unavailable: AtomicU64,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Typed get/set/delete over a [`KvStore`], plus grouped invalidation.
///
/// No method returns an error. Backend failures are logged and degrade to a
/// miss or a no-op.
pub struct CacheCoordinator {
    store: Arc<dyn KvStore>,
    tracking_ttl: Duration,
    counters: Counters,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("tracking_ttl", &self.tracking_ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn KvStore>, tracking_ttl: Duration) -> Self {
        Self {
            store,
            tracking_ttl,
            counters: Counters::default(),
        }
    }

    /// Read and decode a value. Undecodable entries are dropped and reported
    /// as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheRead<T> {
        let raw = match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
                return CacheRead::Miss;
            }
            Err(e) => {
                self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                return CacheRead::Unavailable;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                CacheRead::Hit(value)
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "undecodable cache entry, evicting");
                self.delete(key).await;
                CacheRead::Miss
            }
        }
    }

    /// Encode and store a value.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache value");
                return;
            }
        };
        if let Err(e) = self.store.set(key.as_str(), raw, ttl).await {
            warn!(key = %key, error = %e, "cache write failed, ignoring");
        }
    }

    /// Store a value and record its key in `pattern`'s tracking set.
    pub async fn set_tracked<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        pattern: &CachePattern,
    ) {
        self.set(key, value, ttl).await;
        self.track(pattern, key).await;
    }

    pub async fn delete(&self, key: &CacheKey) {
        if let Err(e) = self.store.delete(key.as_str()).await {
            warn!(key = %key, error = %e, "cache delete failed, ignoring");
        }
    }

    /// Append `key` to the tracking set for `pattern`, refreshing its TTL.
    pub async fn track(&self, pattern: &CachePattern, key: &CacheKey) {
        let tracking_key = pattern.tracking_key();
        let mut keys = match self.read_tracking_set(&tracking_key).await {
            Some(keys) => keys,
            None => return,
        };
        if keys.iter().any(|existing| existing == key.as_str()) {
            return;
        }
        keys.push(key.as_str().to_string());

        let raw = match serde_json::to_string(&keys) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "failed to encode tracking set");
                return;
            }
        };
        if let Err(e) = self.store.set(&tracking_key, raw, self.tracking_ttl).await {
            warn!(pattern = %pattern, error = %e, "tracking set write failed, ignoring");
        }
    }

    /// Delete every key recorded under `pattern`, then the tracking set.
    ///
    /// Returns the number of tracked keys that were deleted.
    pub async fn invalidate_pattern(&self, pattern: &CachePattern) -> usize {
        let tracking_key = pattern.tracking_key();
        let keys = match self.read_tracking_set(&tracking_key).await {
            Some(keys) => keys,
            None => return 0,
        };

        let mut deleted = 0;
        for key in &keys {
            match self.store.delete(key).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(key = %key, error = %e, "cache delete failed during invalidation"),
            }
        }
        if let Err(e) = self.store.delete(&tracking_key).await {
            warn!(pattern = %pattern, error = %e, "tracking set delete failed");
        }
        debug!(pattern = %pattern, deleted, "invalidated cache pattern");
        deleted
    }

    /// `None` when the backend is unavailable; an absent or corrupt set is empty.
    async fn read_tracking_set(&self, tracking_key: &str) -> Option<Vec<String>> {
        match self.store.get(tracking_key).await {
            Ok(Some(raw)) => Some(serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = tracking_key, error = %e, "corrupt tracking set, resetting");
                Vec::new()
            })),
            Ok(None) => Some(Vec::new()),
            Err(e) => {
                warn!(key = tracking_key, error = %e, "tracking set unavailable");
                None
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            unavailable: self.counters.unavailable.load(Ordering::Relaxed),
        }
    }
}
