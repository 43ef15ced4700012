//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quill_core::Clock;
use quill_storage::{CacheCoordinator, KvStore, NoteRepository};

use crate::auth::IdentityVerifier;
use crate::config::ApiConfig;
use crate::edge_cache::{EdgeCache, InMemoryEdgeCache};
use crate::impl_from_ref;
use crate::negotiate::Negotiator;
use crate::notes::NoteStore;
use crate::permissions::PermissionResolver;
use crate::profiles::ProfileStore;
use crate::ratelimit::RateLimiter;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Durable store, for health checks; handlers go through the stores below.
    pub repo: Arc<dyn NoteRepository>,
    pub cache: Arc<CacheCoordinator>,
    pub clock: Arc<dyn Clock>,
    pub resolver: Arc<PermissionResolver>,
    pub notes: Arc<NoteStore>,
    pub profiles: Arc<ProfileStore>,
    pub negotiator: Arc<Negotiator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub edge_cache: Arc<dyn EdgeCache>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component over one repository and one KV store.
    pub fn new(
        repo: Arc<dyn NoteRepository>,
        kv: Arc<dyn KvStore>,
        verifier: Arc<dyn IdentityVerifier>,
        clock: Arc<dyn Clock>,
        config: ApiConfig,
    ) -> Self {
        let ttls = config.cache_ttls;
        let cache = Arc::new(CacheCoordinator::new(kv, ttls.tracking));

        let resolver = Arc::new(PermissionResolver::new(
            repo.clone(),
            cache.clone(),
            clock.clone(),
            ttls,
        ));
        let notes = Arc::new(NoteStore::new(
            repo.clone(),
            cache.clone(),
            resolver.clone(),
            clock.clone(),
            ttls,
            config.anonymous_note_lifetime,
        ));
        let profiles = Arc::new(ProfileStore::new(
            repo.clone(),
            cache.clone(),
            clock.clone(),
            ttls,
        ));
        let rate_limiter = Arc::new(RateLimiter::from_config(
            cache.clone(),
            clock.clone(),
            &config,
        ));
        let edge_cache: Arc<dyn EdgeCache> = Arc::new(InMemoryEdgeCache::new(
            config.edge_cache_capacity,
            Duration::from_secs(config.public_max_age_secs),
            clock.clone(),
        ));

        Self {
            repo,
            cache,
            clock,
            resolver,
            notes,
            profiles,
            negotiator: Arc::new(Negotiator::from_config(&config)),
            rate_limiter,
            edge_cache,
            verifier,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

impl_from_ref!(Arc<dyn NoteRepository>, repo);
impl_from_ref!(Arc<CacheCoordinator>, cache);
impl_from_ref!(Arc<PermissionResolver>, resolver);
impl_from_ref!(Arc<NoteStore>, notes);
impl_from_ref!(Arc<ProfileStore>, profiles);
impl_from_ref!(Arc<Negotiator>, negotiator);
impl_from_ref!(Arc<RateLimiter>, rate_limiter);
impl_from_ref!(Arc<dyn EdgeCache>, edge_cache);
impl_from_ref!(Arc<dyn IdentityVerifier>, verifier);
impl_from_ref!(Arc<ApiConfig>, config);
