//! Quill Storage - Repository Trait, In-Memory Store and Cache Coordination
//!
//! Defines the seam to the durable relational store ([`NoteRepository`]) and
//! the key-value cache layer that sits in front of it. The Postgres
//! implementation of the repository lives in quill-api.

pub mod cache;
pub mod filter;
pub mod memory;
pub mod repository;

pub use cache::{
    etag_for, etag_for_bytes, etag_matches, CacheCoordinator, CacheError, CacheKey, CachePattern,
    CacheRead, CacheStats, CacheTtls, InMemoryKvStore, KvStore, LmdbKvStore,
};
pub use filter::NoteFilter;
pub use memory::InMemoryNoteRepository;
pub use repository::NoteRepository;
