//! LMDB-backed [`KvStore`].
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped cache
//! that survives process restarts on a single host.
//!
//! # Value Layout
//!
//! `[expires_at_millis: 8 bytes LE][utf8 value]`
//!
//! Expiry is checked on read against the injected [`Clock`]; expired entries
//! are deleted lazily.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use quill_core::Clock;

use super::kv::{CacheError, KvStore};

const HEADER_LEN: usize = 8;

fn txn_error(e: heed::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

/// LMDB key-value cache.
pub struct LmdbKvStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LmdbKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbKvStore").finish_non_exhaustive()
    }
}

impl LmdbKvStore {
    /// Open (or create) the store under `path`, sized at `max_size_mb`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&path).map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(txn_error)?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db, clock })
    }

    fn encode(expires_at_millis: i64, value: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
        bytes.extend_from_slice(&expires_at_millis.to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    /// `None` for a malformed record.
    fn decode(bytes: &[u8]) -> Option<(i64, String)> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().ok()?;
        let value = std::str::from_utf8(&bytes[HEADER_LEN..]).ok()?;
        Some((i64::from_le_bytes(header), value.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }
}

#[async_trait]
impl KvStore for LmdbKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let record = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            self.db
                .get(&rtxn, key.as_bytes())
                .map_err(txn_error)?
                .map(Self::decode)
        };

        match record {
            None => Ok(None),
            Some(Some((expires_at, value))) if expires_at > self.clock.now().timestamp_millis() => {
                Ok(Some(value))
            }
            Some(_) => {
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self
            .clock
            .now()
            .timestamp_millis()
            .saturating_add(ttl.as_millis() as i64);
        let bytes = Self::encode(expires_at, &value);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbKvStore, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let clock = Arc::new(ManualClock::fixed());
        let store =
            LmdbKvStore::open(temp_dir.path(), 10, clock.clone()).expect("store should open");
        (store, clock, temp_dir)
    }

    #[tokio::test]
    async fn test_set_get_delete() -> Result<(), CacheError> {
        let (store, _clock, _dir) = create_test_store();

        store
            .set("note:a:v1", "{\"title\":\"x\"}".to_string(), Duration::from_secs(60))
            .await?;
        assert_eq!(
            store.get("note:a:v1").await?,
            Some("{\"title\":\"x\"}".to_string())
        );

        store.delete("note:a:v1").await?;
        assert_eq!(store.get("note:a:v1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() -> Result<(), CacheError> {
        let (store, clock, _dir) = create_test_store();
        store.set("k", "v".to_string(), Duration::from_secs(5)).await?;

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[test]
    fn test_decode_rejects_short_records() {
        assert_eq!(LmdbKvStore::decode(&[1, 2, 3]), None);
        let encoded = LmdbKvStore::encode(42, "hi");
        assert_eq!(LmdbKvStore::decode(&encoded), Some((42, "hi".to_string())));
    }
}
