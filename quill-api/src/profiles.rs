//! Profile store: cached user profiles and username lookup.

use std::sync::Arc;

use quill_core::{Clock, Profile, ProfileChanges, QuillError, QuillResult, UserId};
use quill_storage::{CacheCoordinator, CacheKey, CachePattern, CacheTtls, NoteRepository};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;

pub struct ProfileStore {
    repo: Arc<dyn NoteRepository>,
    cache: Arc<CacheCoordinator>,
    clock: Arc<dyn Clock>,
    ttls: CacheTtls,
}

impl ProfileStore {
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

    pub async fn get(&self, user_id: UserId) -> QuillResult<Profile> {
        let key = CacheKey::profile(user_id);
        if let Some(profile) = self.cache.get::<Profile>(&key).await.into_option() {
            return Ok(profile);
        }

        let profile = self
            .repo
            .profile_get(user_id)
            .await?
            .ok_or_else(|| QuillError::not_found("Profile", user_id))?;
        self.cache
            .set_tracked(
                &key,
                &profile,
                self.ttls.profile,
                &CachePattern::profile(user_id),
            )
            .await;
        Ok(profile)
    }

    /// Create or update the caller's own profile. A taken username is a
    /// conflict.
    pub async fn upsert(&self, user_id: UserId, changes: ProfileChanges) -> QuillResult<Profile> {
        if let Some(username) = changes.username.as_deref() {
            validate_username(username)?;
        }

        let now = self.clock.now();
        let profile = match self.repo.profile_get(user_id).await? {
            Some(mut existing) => {
                existing.apply(&changes, now);
                existing
            }
            None => Profile::new(user_id, &changes, now),
        };
        self.repo.profile_upsert(&profile).await?;

        self.cache.delete(&CacheKey::profile(user_id)).await;
        self.cache
            .invalidate_pattern(&CachePattern::profile(user_id))
            .await;

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    pub async fn find_by_username(&self, username: &str) -> QuillResult<Profile> {
        self.repo
            .profile_find_by_username(username)
            .await?
            .ok_or_else(|| QuillError::not_found("Profile", username))
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore").finish_non_exhaustive()
    }
}

fn validate_username(username: &str) -> QuillResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(QuillError::validation(
            "username",
            format!(
                "username must be {}-{} characters",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            ),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(QuillError::validation(
            "username",
            "username may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;
    use quill_storage::{InMemoryKvStore, InMemoryNoteRepository, KvStore};
    use uuid::Uuid;

    fn store() -> (ProfileStore, Arc<InMemoryKvStore>) {
        let clock = Arc::new(ManualClock::fixed());
        let kv = Arc::new(InMemoryKvStore::new(clock.clone()));
        let ttls = CacheTtls::default();
        let cache = Arc::new(CacheCoordinator::new(
            kv.clone() as Arc<dyn KvStore>,
            ttls.tracking,
        ));
        let store = ProfileStore::new(Arc::new(InMemoryNoteRepository::new()), cache, clock, ttls);
        (store, kv)
    }

    fn named(username: &str) -> ProfileChanges {
        ProfileChanges {
            username: Some(username.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let (store, _) = store();
        let result = store.get(Uuid::now_v7()).await;
        assert!(matches!(result, Err(QuillError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_upsert_refreshes_cached_profile() -> QuillResult<()> {
        let (store, kv) = store();
        let user = Uuid::now_v7();
        store.upsert(user, named("ada")).await?;

        assert_eq!(store.get(user).await?.username.as_deref(), Some("ada"));
        assert!(kv.contains_key(CacheKey::profile(user).as_str()).await);

        store
            .upsert(
                user,
                ProfileChanges {
                    bio: Some("mathematician".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        let profile = store.get(user).await?;
        assert_eq!(profile.bio.as_deref(), Some("mathematician"));
        assert_eq!(profile.username.as_deref(), Some("ada"));
        Ok(())
    }

    #[tokio::test]
    async fn test_taken_username_conflicts() -> QuillResult<()> {
        let (store, _) = store();
        store.upsert(Uuid::now_v7(), named("grace")).await?;
        let result = store.upsert(Uuid::now_v7(), named("grace")).await;
        assert!(matches!(result, Err(QuillError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let (store, _) = store();
        let too_long = "x".repeat(33);
        for bad in ["ab", "has space", too_long.as_str()] {
            let result = store.upsert(Uuid::now_v7(), named(bad)).await;
            assert!(matches!(result, Err(QuillError::Validation { .. })), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_find_by_username() -> QuillResult<()> {
        let (store, _) = store();
        let user = Uuid::now_v7();
        store.upsert(user, named("linus")).await?;
        assert_eq!(store.find_by_username("linus").await?.user_id, user);
        assert!(store.find_by_username("nobody").await.is_err());
        Ok(())
    }
}
