//! Key-value cache layer in front of the note store.
//!
//! The backing store only supports single-key `get`/`set`/`delete` with a
//! TTL. Grouped invalidation is emulated with tracking sets: every key written
//! under a [`CachePattern`] is appended to an auxiliary entry keyed by that
//! pattern, and [`CacheCoordinator::invalidate_pattern`] deletes every listed
//! key plus the tracking entry itself.
//!
//! Backend failures never leave this module. Reads come back as
//! [`CacheRead::Unavailable`] and writes become no-ops, so callers treat an
//! outage exactly like a miss.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheCoordinator::new(Arc::new(InMemoryKvStore::new(clock)), ttls.tracking);
//!
//! let key = CacheKey::note(note_id);
//! if let Some(note) = cache.get::<Note>(&key).await.into_option() {
//!     return Ok(note);
//! }
//! cache.set_tracked(&key, &note, ttls.public_note, &CachePattern::note(note_id)).await;
//! ```

pub mod coordinator;
pub mod etag;
pub mod keys;
pub mod kv;
pub mod lmdb_backend;

pub use coordinator::{CacheCoordinator, CacheRead, CacheStats, CacheTtls};
pub use etag::{etag_for, etag_for_bytes, etag_matches};
pub use keys::{CacheKey, CachePattern};
pub use kv::{CacheError, InMemoryKvStore, KvStore};
pub use lmdb_backend::LmdbKvStore;
