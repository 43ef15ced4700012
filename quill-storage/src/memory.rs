//! In-memory implementation of [`NoteRepository`].
//!
//! Used by tests and local development. Enforces the same row-level
//! constraints as the relational schema: unique slug per owner, unique
//! username, grants cascade with their note.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use quill_core::{
    AccessGrant, Collaborator, ListNotesQuery, Note, NoteChanges, NoteId, NotePage, Profile,
    QuillError, QuillResult, SortBy, SortOrder, Timestamp, UserId,
};
use tokio::sync::RwLock;

use crate::filter::NoteFilter;
use crate::repository::NoteRepository;

#[derive(Debug, Default)]
struct State {
    notes: HashMap<NoteId, Note>,
    grants: HashMap<(NoteId, UserId), AccessGrant>,
    profiles: HashMap<UserId, Profile>,
}

/// Repository backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryNoteRepository {
    state: RwLock<State>,
    failing: AtomicBool,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> QuillResult<()> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(QuillError::database("connection refused"));
        }
        Ok(())
    }

    /// Number of stored notes, expired ones included.
    pub async fn note_count(&self) -> usize {
        self.state.read().await.notes.len()
    }

    /// Number of stored grants.
    pub async fn grant_count(&self) -> usize {
        self.state.read().await.grants.len()
    }
}

fn slug_taken(state: &State, note: &Note) -> bool {
    let (Some(owner), Some(slug)) = (note.owner_id, note.slug.as_deref()) else {
        return false;
    };
    state.notes.values().any(|existing| {
        existing.id != note.id
            && existing.owner_id == Some(owner)
            && existing.slug.as_deref() == Some(slug)
    })
}

fn compare(a: &Note, b: &Note, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortBy::ViewCount => a.view_count.cmp(&b.view_count),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn matches_search(note: &Note, search: Option<&str>) -> bool {
    match search {
        Some(term) => {
            let term = term.to_lowercase();
            note.title.to_lowercase().contains(&term) || note.content.to_lowercase().contains(&term)
        }
        None => true,
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn note_get(&self, id: NoteId) -> QuillResult<Option<Note>> {
        self.check_available()?;
        Ok(self.state.read().await.notes.get(&id).cloned())
    }

    async fn note_owner(&self, id: NoteId) -> QuillResult<Option<UserId>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .notes
            .get(&id)
            .and_then(|note| note.owner_id))
    }

    async fn note_insert(&self, note: &Note) -> QuillResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.notes.contains_key(&note.id) {
            return Err(QuillError::conflict(format!("note {} already exists", note.id)));
        }
        if slug_taken(&state, note) {
            return Err(QuillError::conflict("slug already in use"));
        }
        state.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn note_update(
        &self,
        id: NoteId,
        changes: &NoteChanges,
        now: Timestamp,
    ) -> QuillResult<Option<Note>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let Some(mut updated) = state.notes.get(&id).cloned() else {
            return Ok(None);
        };
        updated.apply(changes, now);
        if slug_taken(&state, &updated) {
            return Err(QuillError::conflict("slug already in use"));
        }
        state.notes.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn note_delete(&self, id: NoteId) -> QuillResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let removed = state.notes.remove(&id).is_some();
        if removed {
            state.grants.retain(|(note_id, _), _| *note_id != id);
        }
        Ok(removed)
    }

    async fn note_list(
        &self,
        filter: &NoteFilter,
        query: &ListNotesQuery,
        now: Timestamp,
    ) -> QuillResult<NotePage> {
        self.check_available()?;
        let state = self.state.read().await;
        let grantee = filter.grantee();

        let mut matching: Vec<&Note> = state
            .notes
            .values()
            .filter(|note| {
                let granted = grantee
                    .map(|user| state.grants.contains_key(&(note.id, user)))
                    .unwrap_or(false);
                filter.matches(note, granted, now)
                    && matches_search(note, query.search.as_deref())
            })
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        let notes = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(NotePage { notes, total })
    }

    async fn note_increment_views(&self, id: NoteId) -> QuillResult<()> {
        self.check_available()?;
        if let Some(note) = self.state.write().await.notes.get_mut(&id) {
            note.view_count += 1;
        }
        Ok(())
    }

    async fn notes_delete_expired(&self, now: Timestamp) -> QuillResult<u64> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let expired: Vec<NoteId> = state
            .notes
            .values()
            .filter(|note| note.is_expired_at(now))
            .map(|note| note.id)
            .collect();
        for id in &expired {
            state.notes.remove(id);
        }
        state
            .grants
            .retain(|(note_id, _), _| !expired.contains(note_id));
        Ok(expired.len() as u64)
    }

    async fn grant_get(&self, note_id: NoteId, user_id: UserId) -> QuillResult<Option<AccessGrant>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .grants
            .get(&(note_id, user_id))
            .cloned())
    }

    async fn grant_upsert(&self, grant: &AccessGrant) -> QuillResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.notes.contains_key(&grant.note_id) {
            return Err(QuillError::database("grant references a missing note"));
        }
        let key = (grant.note_id, grant.user_id);
        let created_at = state
            .grants
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or(grant.created_at);
        state.grants.insert(
            key,
            AccessGrant {
                created_at,
                ..grant.clone()
            },
        );
        Ok(())
    }

    async fn grant_delete(&self, note_id: NoteId, user_id: UserId) -> QuillResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .write()
            .await
            .grants
            .remove(&(note_id, user_id))
            .is_some())
    }

    async fn collaborators(&self, note_id: NoteId) -> QuillResult<Vec<Collaborator>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut collaborators: Vec<Collaborator> = state
            .grants
            .values()
            .filter(|grant| grant.note_id == note_id)
            .map(|grant| {
                let profile = state.profiles.get(&grant.user_id);
                Collaborator {
                    user_id: grant.user_id,
                    username: profile.and_then(|p| p.username.clone()),
                    display_name: profile.and_then(|p| p.display_name.clone()),
                    avatar_url: profile.and_then(|p| p.avatar_url.clone()),
                    permission_level: grant.permission_level,
                    granted_by: grant.granted_by,
                    granted_at: grant.created_at,
                }
            })
            .collect();
        collaborators.sort_by(|a, b| {
            a.granted_at
                .cmp(&b.granted_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(collaborators)
    }

    async fn profile_get(&self, user_id: UserId) -> QuillResult<Option<Profile>> {
        self.check_available()?;
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn profile_find_by_username(&self, username: &str) -> QuillResult<Option<Profile>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .profiles
            .values()
            .find(|profile| profile.username.as_deref() == Some(username))
            .cloned())
    }

    async fn profile_upsert(&self, profile: &Profile) -> QuillResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(username) = profile.username.as_deref() {
            let taken = state.profiles.values().any(|existing| {
                existing.user_id != profile.user_id && existing.username.as_deref() == Some(username)
            });
            if taken {
                return Err(QuillError::conflict(format!(
                    "username '{}' is already taken",
                    username
                )));
            }
        }
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn ping(&self) -> QuillResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quill_core::{GrantLevel, NewNote, ProfileChanges, Visibility};
    use uuid::Uuid;

    fn new_note(title: &str, visibility: Visibility, slug: Option<&str>) -> NewNote {
        NewNote {
            title: title.to_string(),
            content: format!("{} body", title),
            visibility: Some(visibility),
            slug: slug.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_per_owner_conflicts() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let owner = Uuid::now_v7();
        let now = Utc::now();
        repo.note_insert(&Note::owned(new_note("a", Visibility::Private, Some("s")), owner, now))
            .await?;

        let dup = Note::owned(new_note("b", Visibility::Private, Some("s")), owner, now);
        assert!(matches!(
            repo.note_insert(&dup).await,
            Err(QuillError::Conflict { .. })
        ));

        // Same slug under a different owner is fine.
        let other = Note::owned(new_note("c", Visibility::Private, Some("s")), Uuid::now_v7(), now);
        repo.note_insert(&other).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cascades_grants() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let owner = Uuid::now_v7();
        let now = Utc::now();
        let note = Note::owned(new_note("a", Visibility::Private, None), owner, now);
        repo.note_insert(&note).await?;
        repo.grant_upsert(&AccessGrant {
            note_id: note.id,
            user_id: Uuid::now_v7(),
            permission_level: GrantLevel::Read,
            granted_by: owner,
            created_at: now,
        })
        .await?;
        assert_eq!(repo.grant_count().await, 1);

        assert!(repo.note_delete(note.id).await?);
        assert_eq!(repo.grant_count().await, 0);
        assert!(!repo.note_delete(note.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_paginates_and_counts() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let owner = Uuid::now_v7();
        let now = Utc::now();
        for i in 0..5 {
            let mut note = Note::owned(
                new_note(&format!("note {}", i), Visibility::Public, None),
                owner,
                now + Duration::seconds(i),
            );
            note.updated_at = now + Duration::seconds(i);
            repo.note_insert(&note).await?;
        }

        let query = ListNotesQuery {
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let page = repo.note_list(&NoteFilter::PublicOnly, &query, now).await?;
        assert_eq!(page.total, 5);
        let titles: Vec<&str> = page.notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["note 2", "note 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let now = Utc::now();
        repo.note_insert(&Note::owned(
            new_note("Rust Tips", Visibility::Public, None),
            Uuid::now_v7(),
            now,
        ))
        .await?;
        repo.note_insert(&Note::owned(
            new_note("Go Tips", Visibility::Public, None),
            Uuid::now_v7(),
            now,
        ))
        .await?;

        let query = ListNotesQuery {
            search: Some("rust".to_string()),
            ..Default::default()
        };
        let page = repo.note_list(&NoteFilter::PublicOnly, &query, now).await?;
        assert_eq!(page.total, 1);
        assert_eq!(page.notes[0].title, "Rust Tips");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_expired() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let now = Utc::now();
        repo.note_insert(&Note::anonymous(new_note("temp", Visibility::Public, None), now))
            .await?;
        repo.note_insert(&Note::owned(
            new_note("kept", Visibility::Public, None),
            Uuid::now_v7(),
            now,
        ))
        .await?;

        assert_eq!(repo.notes_delete_expired(now).await?, 0);
        assert_eq!(repo.notes_delete_expired(now + Duration::days(8)).await?, 1);
        assert_eq!(repo.note_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() -> QuillResult<()> {
        let repo = InMemoryNoteRepository::new();
        let now = Utc::now();
        let changes = ProfileChanges {
            username: Some("ada".to_string()),
            ..Default::default()
        };
        repo.profile_upsert(&Profile::new(Uuid::now_v7(), &changes, now))
            .await?;
        let result = repo
            .profile_upsert(&Profile::new(Uuid::now_v7(), &changes, now))
            .await;
        assert!(matches!(result, Err(QuillError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_repository() {
        let repo = InMemoryNoteRepository::new();
        repo.set_failing(true);
        assert!(matches!(
            repo.ping().await,
            Err(QuillError::Database { .. })
        ));
    }
}
