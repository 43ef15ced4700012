//! Async repository trait for the durable note store.
//!
//! The store is the source of truth. Implementations map uniqueness
//! violations to [`QuillError::Conflict`](quill_core::QuillError::Conflict)
//! and every other failure to `QuillError::Database`.

use async_trait::async_trait;
use quill_core::{
    AccessGrant, Collaborator, ListNotesQuery, Note, NoteChanges, NoteId, NotePage, Profile,
    QuillResult, Timestamp, UserId,
};

use crate::filter::NoteFilter;

#[async_trait]
pub trait NoteRepository: Send + Sync {
    // ========================================================================
    // NOTE OPERATIONS
    // ========================================================================

    /// Get a note by id, including logically expired ones.
    async fn note_get(&self, id: NoteId) -> QuillResult<Option<Note>>;

    /// Owner of a note, `None` when the note is missing or anonymous.
    async fn note_owner(&self, id: NoteId) -> QuillResult<Option<UserId>>;

    /// Insert a new note.
    async fn note_insert(&self, note: &Note) -> QuillResult<()>;

    /// Apply a partial update, bumping `updated_at` to `now`.
    ///
    /// Returns the updated row, or `None` if the note does not exist.
    async fn note_update(
        &self,
        id: NoteId,
        changes: &NoteChanges,
        now: Timestamp,
    ) -> QuillResult<Option<Note>>;

    /// Delete a note and its grants. Returns whether a row was removed.
    async fn note_delete(&self, id: NoteId) -> QuillResult<bool>;

    /// One page of notes matching `filter` (never returning notes expired at
    /// `now`) plus the unpaginated total for the same predicate.
    async fn note_list(
        &self,
        filter: &NoteFilter,
        query: &ListNotesQuery,
        now: Timestamp,
    ) -> QuillResult<NotePage>;

    /// Bump the view counter.
    async fn note_increment_views(&self, id: NoteId) -> QuillResult<()>;

    /// Bulk delete notes whose expiry has passed.
    async fn notes_delete_expired(&self, now: Timestamp) -> QuillResult<u64>;

    // ========================================================================
    // ACCESS GRANT OPERATIONS
    // ========================================================================

    async fn grant_get(&self, note_id: NoteId, user_id: UserId) -> QuillResult<Option<AccessGrant>>;

    /// Insert or replace the grant for `(note_id, user_id)`.
    async fn grant_upsert(&self, grant: &AccessGrant) -> QuillResult<()>;

    /// Remove a grant. Returns whether a row was removed.
    async fn grant_delete(&self, note_id: NoteId, user_id: UserId) -> QuillResult<bool>;

    /// All grants on a note joined with the grantees' display data.
    async fn collaborators(&self, note_id: NoteId) -> QuillResult<Vec<Collaborator>>;

    // ========================================================================
    // PROFILE OPERATIONS
    // ========================================================================

    async fn profile_get(&self, user_id: UserId) -> QuillResult<Option<Profile>>;

    async fn profile_find_by_username(&self, username: &str) -> QuillResult<Option<Profile>>;

    /// Insert or replace a profile. Duplicate usernames are a conflict.
    async fn profile_upsert(&self, profile: &Profile) -> QuillResult<()>;

    // ========================================================================
    // HEALTH
    // ========================================================================

    async fn ping(&self) -> QuillResult<()>;
}
