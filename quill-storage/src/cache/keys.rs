//! Cache key derivation.
//!
//! Keys are namespaced by entity kind. Entity snapshots carry a version
//! suffix: bumping [`ENTITY_FORMAT_VERSION`] makes old entries unreachable
//! and they age out through their TTL.

use std::fmt;

use quill_core::{NoteId, UserId};

/// Version suffix of serialized entity snapshots.
pub const ENTITY_FORMAT_VERSION: u32 = 1;

const TRACKING_PREFIX: &str = "tracking:";

/// A concrete cache key. Only constructible through the typed builders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `note:<id>:v<N>`
    pub fn note(id: NoteId) -> Self {
        Self(format!("note:{}:v{}", id, ENTITY_FORMAT_VERSION))
    }

    /// `profile:<userId>:v<N>`
    pub fn profile(user_id: UserId) -> Self {
        Self(format!("profile:{}:v{}", user_id, ENTITY_FORMAT_VERSION))
    }

    /// `access:<noteId>:<userId>`
    pub fn access(note_id: NoteId, user_id: UserId) -> Self {
        Self(format!("access:{}:{}", note_id, user_id))
    }

    /// `user:notes:<userId>:<page>:<limit>`
    pub fn user_notes(user_id: UserId, page: u32, limit: u32) -> Self {
        Self(format!("user:notes:{}:{}:{}", user_id, page, limit))
    }

    /// `ratelimit:<client>:<route>`
    pub fn rate_limit(client: &str, route: &str) -> Self {
        Self(format!("ratelimit:{}:{}", client, route))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group of keys sharing a prefix, ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CachePattern(String);

impl CachePattern {
    /// `note:<id>:*`
    pub fn note(id: NoteId) -> Self {
        Self(format!("note:{}:*", id))
    }

    /// `access:<noteId>:*`
    pub fn access(note_id: NoteId) -> Self {
        Self(format!("access:{}:*", note_id))
    }

    /// `profile:<userId>:*`
    pub fn profile(user_id: UserId) -> Self {
        Self(format!("profile:{}:*", user_id))
    }

    /// `user:notes:<userId>:*`
    pub fn user_notes(user_id: UserId) -> Self {
        Self(format!("user:notes:{}:*", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the tracking set recording every key written under this pattern.
    pub fn tracking_key(&self) -> String {
        format!("{}{}", TRACKING_PREFIX, self.0)
    }

    /// Whether `key` falls under this pattern.
    pub fn matches(&self, key: &CacheKey) -> bool {
        let prefix = self.0.trim_end_matches('*');
        key.as_str().starts_with(prefix)
    }
}

impl fmt::Display for CachePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
