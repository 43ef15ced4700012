//! Permission Resolver
//!
//! Answers "what relationship does this user have to this note's access
//! list". Visibility is not considered here; the note store combines the
//! resolved level with the note's visibility.
//!
//! Resolution order:
//! 1. cached decision at `access:<noteId>:<userId>`
//! 2. note ownership (always outranks any grant row)
//! 3. the access grant row
//! 4. `None`, which is never cached so a later grant takes effect at once

use std::sync::Arc;

use quill_core::{
    AccessGrant, Clock, Collaborator, GrantLevel, Note, NoteId, PermissionLevel, QuillError,
    QuillResult, UserId,
};
use quill_storage::{CacheCoordinator, CacheKey, CachePattern, CacheTtls, NoteRepository};

pub struct PermissionResolver {
    repo: Arc<dyn NoteRepository>,
    cache: Arc<CacheCoordinator>,
    clock: Arc<dyn Clock>,
    ttls: CacheTtls,
}

impl PermissionResolver {
    pub fn new(
        repo: Arc<dyn NoteRepository>,
        cache: Arc<CacheCoordinator>,
        clock: Arc<dyn Clock>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            repo,
            cache,
            clock,
            ttls,
        }
    }

    /// Effective permission of `user` on `note_id`. Anonymous callers and
    /// missing notes resolve to `None`.
    pub async fn resolve(
        &self,
        note_id: NoteId,
        user: Option<UserId>,
    ) -> QuillResult<PermissionLevel> {
        let Some(user_id) = user else {
            return Ok(PermissionLevel::None);
        };

        let key = CacheKey::access(note_id, user_id);
        if let Some(level) = self.cache.get::<PermissionLevel>(&key).await.into_option() {
            return Ok(level);
        }

        if self.repo.note_owner(note_id).await? == Some(user_id) {
            self.remember(note_id, &key, PermissionLevel::Owner).await;
            return Ok(PermissionLevel::Owner);
        }

        match self.repo.grant_get(note_id, user_id).await? {
            Some(grant) => {
                let level = PermissionLevel::from(grant.permission_level);
                self.remember(note_id, &key, level).await;
                Ok(level)
            }
            None => Ok(PermissionLevel::None),
        }
    }

    /// Like [`resolve`](Self::resolve) for an already loaded note, skipping
    /// the ownership lookup.
    pub async fn resolve_for_note(
        &self,
        note: &Note,
        user: Option<UserId>,
    ) -> QuillResult<PermissionLevel> {
        match user {
            Some(user_id) if note.is_owned_by(user_id) => Ok(PermissionLevel::Owner),
            _ => self.resolve(note.id, user).await,
        }
    }

    async fn remember(&self, note_id: NoteId, key: &CacheKey, level: PermissionLevel) {
        self.cache
            .set_tracked(key, &level, self.ttls.permission, &CachePattern::access(note_id))
            .await;
    }

    // ========================================================================
    // GRANTS
    // ========================================================================

    /// Give `target` `level` access to a note. Requires owner or admin.
    pub async fn grant_access(
        &self,
        note_id: NoteId,
        target: UserId,
        level: GrantLevel,
        granted_by: UserId,
    ) -> QuillResult<AccessGrant> {
        let note = self.manageable_note(note_id, granted_by, target).await?;

        let grant = AccessGrant {
            note_id,
            user_id: target,
            permission_level: level,
            granted_by,
            created_at: self.clock.now(),
        };
        self.repo.grant_upsert(&grant).await?;
        self.invalidate_access(&note, target).await;

        tracing::info!(note_id = %note_id, target = %target, level = %level, "Access granted");
        Ok(grant)
    }

    /// Remove `target`'s grant on a note. Requires owner or admin.
    pub async fn revoke_access(
        &self,
        note_id: NoteId,
        target: UserId,
        revoked_by: UserId,
    ) -> QuillResult<()> {
        let note = self.manageable_note(note_id, revoked_by, target).await?;

        if !self.repo.grant_delete(note_id, target).await? {
            return Err(QuillError::not_found(
                "AccessGrant",
                format!("{}/{}", note_id, target),
            ));
        }
        self.invalidate_access(&note, target).await;

        tracing::info!(note_id = %note_id, target = %target, "Access revoked");
        Ok(())
    }

    /// Every grant on a note with the grantees' display data. Callers must
    /// already have checked that the requester can view the note.
    pub async fn list_collaborators(&self, note_id: NoteId) -> QuillResult<Vec<Collaborator>> {
        self.repo.collaborators(note_id).await
    }

    /// Load a live note and check that `actor` may manage its grants for
    /// `target`.
    async fn manageable_note(
        &self,
        note_id: NoteId,
        actor: UserId,
        target: UserId,
    ) -> QuillResult<Note> {
        let note = self
            .repo
            .note_get(note_id)
            .await?
            .filter(|note| !note.is_expired_at(self.clock.now()))
            .ok_or_else(|| QuillError::not_found("Note", note_id))?;

        let level = self.resolve_for_note(&note, Some(actor)).await?;
        if !level.can_manage() {
            return Err(QuillError::forbidden(
                "owner or admin permission required to manage access",
            ));
        }
        if note.is_owned_by(target) {
            return Err(QuillError::validation(
                "userId",
                "the owner's access cannot be changed",
            ));
        }
        Ok(note)
    }

    /// Drop the cached decision for `target` and every cached view of the note.
    async fn invalidate_access(&self, note: &Note, target: UserId) {
        self.cache.delete(&CacheKey::access(note.id, target)).await;
        self.cache.invalidate_pattern(&CachePattern::note(note.id)).await;
        if let Some(owner) = note.owner_id {
            self.cache
                .invalidate_pattern(&CachePattern::user_notes(owner))
                .await;
        }
    }
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use quill_core::{ManualClock, NewNote, Visibility};
    use quill_storage::{InMemoryKvStore, InMemoryNoteRepository, KvStore};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        resolver: PermissionResolver,
        repo: Arc<InMemoryNoteRepository>,
        kv: Arc<InMemoryKvStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::fixed());
        let repo = Arc::new(InMemoryNoteRepository::new());
        let kv = Arc::new(InMemoryKvStore::new(clock.clone()));
        let ttls = CacheTtls::default();
        let cache = Arc::new(CacheCoordinator::new(
            kv.clone() as Arc<dyn KvStore>,
            ttls.tracking,
        ));
        let resolver = PermissionResolver::new(repo.clone(), cache, clock.clone(), ttls);
        Fixture {
            resolver,
            repo,
            kv,
            clock,
        }
    }

    async fn owned_note(fixture: &Fixture, owner: UserId) -> QuillResult<Note> {
        let note = Note::owned(
            NewNote {
                title: "Plan".to_string(),
                content: "# plan".to_string(),
                visibility: Some(Visibility::Private),
                slug: None,
            },
            owner,
            fixture.clock.now(),
        );
        fixture.repo.note_insert(&note).await?;
        Ok(note)
    }

    #[tokio::test]
    async fn test_anonymous_resolves_to_none() -> QuillResult<()> {
        let f = fixture();
        let note = owned_note(&f, Uuid::now_v7()).await?;
        assert_eq!(f.resolver.resolve(note.id, None).await?, PermissionLevel::None);
        Ok(())
    }

    #[tokio::test]
    async fn test_owner_outranks_grant_row() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;

        f.repo
            .grant_upsert(&AccessGrant {
                note_id: note.id,
                user_id: owner,
                permission_level: GrantLevel::Read,
                granted_by: owner,
                created_at: f.clock.now(),
            })
            .await?;

        assert_eq!(
            f.resolver.resolve(note.id, Some(owner)).await?,
            PermissionLevel::Owner
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_grant_then_resolve_sees_new_level() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let friend = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;

        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::None
        );
        assert!(!f.kv.contains_key(CacheKey::access(note.id, friend).as_str()).await);

        f.resolver
            .grant_access(note.id, friend, GrantLevel::Read, owner)
            .await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::Read
        );

        f.resolver
            .grant_access(note.id, friend, GrantLevel::Write, owner)
            .await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::Write
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_revoke_then_resolve_is_none() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let friend = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;

        f.resolver
            .grant_access(note.id, friend, GrantLevel::Admin, owner)
            .await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::Admin
        );

        f.resolver.revoke_access(note.id, friend, owner).await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::None
        );

        let again = f.resolver.revoke_access(note.id, friend, owner).await;
        assert!(matches!(again, Err(QuillError::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_writer_cannot_manage_access() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let writer = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;
        f.resolver
            .grant_access(note.id, writer, GrantLevel::Write, owner)
            .await?;

        let result = f
            .resolver
            .grant_access(note.id, Uuid::now_v7(), GrantLevel::Read, writer)
            .await;
        assert!(matches!(result, Err(QuillError::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_can_grant_but_not_touch_owner() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let admin = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;
        f.resolver
            .grant_access(note.id, admin, GrantLevel::Admin, owner)
            .await?;

        let reader = Uuid::now_v7();
        f.resolver
            .grant_access(note.id, reader, GrantLevel::Read, admin)
            .await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(reader)).await?,
            PermissionLevel::Read
        );

        let result = f.resolver.revoke_access(note.id, owner, admin).await;
        assert!(matches!(result, Err(QuillError::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_grant_on_expired_note_is_not_found() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let mut note = owned_note(&f, owner).await?;
        note.expires_at = Some(f.clock.now() + ChronoDuration::seconds(10));
        f.repo.note_delete(note.id).await?;
        f.repo.note_insert(&note).await?;

        f.clock.advance(Duration::from_secs(11));
        let result = f
            .resolver
            .grant_access(note.id, Uuid::now_v7(), GrantLevel::Read, owner)
            .await;
        assert!(matches!(result, Err(QuillError::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_change_answers() -> QuillResult<()> {
        let f = fixture();
        let owner = Uuid::now_v7();
        let friend = Uuid::now_v7();
        let note = owned_note(&f, owner).await?;
        f.kv.set_available(false);

        f.resolver
            .grant_access(note.id, friend, GrantLevel::Write, owner)
            .await?;
        assert_eq!(
            f.resolver.resolve(note.id, Some(friend)).await?,
            PermissionLevel::Write
        );
        assert_eq!(
            f.resolver.resolve(note.id, Some(owner)).await?,
            PermissionLevel::Owner
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_propagates() -> QuillResult<()> {
        let f = fixture();
        let note = owned_note(&f, Uuid::now_v7()).await?;
        f.repo.set_failing(true);

        let result = f.resolver.resolve(note.id, Some(Uuid::now_v7())).await;
        assert!(matches!(result, Err(QuillError::Database { .. })));
        Ok(())
    }
}
