//! Note Store
//!
//! Read-through and write-invalidate access to notes. Every operation that
//! exposes or changes a note goes through the [`PermissionResolver`] and the
//! note's visibility; every mutation drops the cache entries that could
//! describe the old state.

use std::sync::Arc;
use std::time::Duration;

use quill_core::{
    Clock, ListNotesQuery, NewNote, Note, NoteChanges, NoteId, NotePage, NoteView, Pagination,
    QuillError, QuillResult, Timestamp, UserId, Visibility,
};
use quill_storage::{
    CacheCoordinator, CacheKey, CachePattern, CacheTtls, NoteFilter, NoteRepository,
};

use crate::permissions::PermissionResolver;

const MAX_TITLE_LEN: usize = 200;
const MAX_SLUG_LEN: usize = 100;

pub struct NoteStore {
    repo: Arc<dyn NoteRepository>,
    cache: Arc<CacheCoordinator>,
    resolver: Arc<PermissionResolver>,
    clock: Arc<dyn Clock>,
    ttls: CacheTtls,
    anonymous_lifetime: Duration,
}

impl NoteStore {
    pub fn new(
        repo: Arc<dyn NoteRepository>,
        cache: Arc<CacheCoordinator>,
        resolver: Arc<PermissionResolver>,
        clock: Arc<dyn Clock>,
        ttls: CacheTtls,
        anonymous_lifetime: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            resolver,
            clock,
            ttls,
            anonymous_lifetime,
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// List the notes `caller` may see, each annotated with the caller's
    /// permission.
    pub async fn list(
        &self,
        caller: Option<UserId>,
        query: ListNotesQuery,
    ) -> QuillResult<(Vec<NoteView>, Pagination)> {
        let query = query.normalized();
        let filter = NoteFilter::for_caller(caller, query.filter_by_user_id);
        let now = self.clock.now();

        let page = match filter {
            NoteFilter::OwnedBy { owner } if query.is_plain() => {
                self.owner_listing(owner, &filter, &query, now).await?
            }
            _ => self.repo.note_list(&filter, &query, now).await?,
        };

        let mut views = Vec::with_capacity(page.notes.len());
        for note in page.notes {
            let permission = self.resolver.resolve_for_note(&note, caller).await?;
            views.push(NoteView { note, permission });
        }

        Ok((views, Pagination::new(query.page, query.limit, page.total)))
    }

    async fn owner_listing(
        &self,
        owner: UserId,
        filter: &NoteFilter,
        query: &ListNotesQuery,
        now: Timestamp,
    ) -> QuillResult<NotePage> {
        let key = CacheKey::user_notes(owner, query.page, query.limit);
        if let Some(page) = self.cache.get::<NotePage>(&key).await.into_option() {
            // A page holding an expired note has a stale total and offset
            // window; rebuild it from the repository instead.
            if !page.notes.iter().any(|note| note.is_expired_at(now)) {
                return Ok(page);
            }
        }

        let page = self.repo.note_list(filter, query, now).await?;
        self.cache
            .set_tracked(
                &key,
                &page,
                self.ttls.listing,
                &CachePattern::user_notes(owner),
            )
            .await;
        Ok(page)
    }

    /// Fetch one note and count the view.
    pub async fn get_by_id(&self, id: NoteId, caller: Option<UserId>) -> QuillResult<NoteView> {
        let view = self.viewable(id, caller).await?;
        if let Err(e) = self.repo.note_increment_views(id).await {
            tracing::warn!(note_id = %id, error = %e, "Failed to record note view");
        }
        Ok(view)
    }

    /// Load a note `caller` may view. Expired notes are `NotFound` even
    /// while still cached; private notes need at least read permission.
    pub async fn viewable(&self, id: NoteId, caller: Option<UserId>) -> QuillResult<NoteView> {
        let key = CacheKey::note(id);
        let now = self.clock.now();

        let (note, from_cache) = match self.cache.get::<Note>(&key).await.into_option() {
            Some(note) => (note, true),
            None => {
                let note = self
                    .repo
                    .note_get(id)
                    .await?
                    .ok_or_else(|| QuillError::not_found("Note", id))?;
                (note, false)
            }
        };

        if note.is_expired_at(now) {
            if from_cache {
                self.cache.delete(&key).await;
            }
            return Err(QuillError::not_found("Note", id));
        }

        let permission = self.resolver.resolve_for_note(&note, caller).await?;
        if !note.visibility.is_link_readable() && !permission.can_read() {
            return Err(QuillError::forbidden("you do not have access to this note"));
        }

        if !from_cache {
            let ttl = match note.visibility {
                Visibility::Public => self.ttls.public_note,
                _ => self.ttls.private_note,
            };
            self.cache
                .set_tracked(&key, &note, ttl, &CachePattern::note(id))
                .await;
        }

        Ok(NoteView { note, permission })
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Create a note. Anonymous notes get an expiry and may not be private.
    pub async fn create(&self, input: NewNote, caller: Option<UserId>) -> QuillResult<NoteView> {
        validate_title(&input.title)?;
        if let Some(slug) = input.slug.as_deref() {
            validate_slug(slug)?;
        }

        let now = self.clock.now();
        let (note, permission) = match caller {
            Some(owner) => (Note::owned(input, owner, now), quill_core::PermissionLevel::Owner),
            None => {
                if input.visibility == Some(Visibility::Private) {
                    return Err(QuillError::validation(
                        "visibility",
                        "anonymous notes cannot be private",
                    ));
                }
                let lifetime = chrono::Duration::from_std(self.anonymous_lifetime)
                    .map_err(|e| QuillError::internal(format!("invalid note lifetime: {}", e)))?;
                let mut note = Note::anonymous(input, now);
                note.expires_at = Some(now + lifetime);
                (note, quill_core::PermissionLevel::None)
            }
        };

        self.repo.note_insert(&note).await?;

        self.cache.delete(&CacheKey::note(note.id)).await;
        if let Some(owner) = note.owner_id {
            self.cache
                .invalidate_pattern(&CachePattern::user_notes(owner))
                .await;
        }

        tracing::info!(
            note_id = %note.id,
            anonymous = note.is_anonymous(),
            visibility = %note.visibility,
            "Note created"
        );
        Ok(NoteView { note, permission })
    }

    /// Apply partial changes. Requires write permission.
    pub async fn update(
        &self,
        id: NoteId,
        changes: NoteChanges,
        caller: Option<UserId>,
    ) -> QuillResult<NoteView> {
        if let Some(title) = changes.title.as_deref() {
            validate_title(title)?;
        }
        if let Some(slug) = changes.slug.as_deref() {
            validate_slug(slug)?;
        }

        let current = self.live_note(id).await?;
        let permission = self.resolver.resolve_for_note(&current, caller).await?;
        if !permission.can_write() {
            return Err(QuillError::forbidden("write permission required"));
        }
        if current.is_anonymous() && changes.visibility == Some(Visibility::Private) {
            return Err(QuillError::validation(
                "visibility",
                "anonymous notes cannot be private",
            ));
        }

        let note = self
            .repo
            .note_update(id, &changes, self.clock.now())
            .await?
            .ok_or_else(|| QuillError::not_found("Note", id))?;

        self.invalidate_note(&note, false).await;

        tracing::info!(note_id = %id, "Note updated");
        Ok(NoteView { note, permission })
    }

    /// Delete a note and its grants. Requires owner or admin.
    pub async fn delete(&self, id: NoteId, caller: Option<UserId>) -> QuillResult<()> {
        let note = self.live_note(id).await?;
        let permission = self.resolver.resolve_for_note(&note, caller).await?;
        if !permission.can_manage() {
            return Err(QuillError::forbidden(
                "owner or admin permission required to delete",
            ));
        }

        if !self.repo.note_delete(id).await? {
            return Err(QuillError::not_found("Note", id));
        }

        self.invalidate_note(&note, true).await;

        tracing::info!(note_id = %id, "Note deleted");
        Ok(())
    }

    /// Remove every expired note from the store. Returns the number removed.
    pub async fn sweep_expired(&self) -> QuillResult<u64> {
        let removed = self.repo.notes_delete_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Expired notes swept");
        }
        Ok(removed)
    }

    /// Load a note straight from the store, treating expired notes as absent.
    async fn live_note(&self, id: NoteId) -> QuillResult<Note> {
        self.repo
            .note_get(id)
            .await?
            .filter(|note| !note.is_expired_at(self.clock.now()))
            .ok_or_else(|| QuillError::not_found("Note", id))
    }

    async fn invalidate_note(&self, note: &Note, include_access: bool) {
        self.cache.delete(&CacheKey::note(note.id)).await;
        self.cache
            .invalidate_pattern(&CachePattern::note(note.id))
            .await;
        if include_access {
            self.cache
                .invalidate_pattern(&CachePattern::access(note.id))
                .await;
        }
        if let Some(owner) = note.owner_id {
            self.cache
                .invalidate_pattern(&CachePattern::user_notes(owner))
                .await;
        }
    }
}

impl std::fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteStore")
            .field("ttls", &self.ttls)
            .field("anonymous_lifetime", &self.anonymous_lifetime)
            .finish_non_exhaustive()
    }
}

fn validate_title(title: &str) -> QuillResult<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(QuillError::validation("title", "title is required"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(QuillError::validation(
            "title",
            format!("title must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    Ok(())
}

fn validate_slug(slug: &str) -> QuillResult<()> {
    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN || !valid_chars {
        return Err(QuillError::validation(
            "slug",
            "slug may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}
