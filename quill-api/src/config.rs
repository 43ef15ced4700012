//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, response caching and the cache
//! backend. Everything is loaded from `QUILL_*` environment variables with
//! defaults suitable for local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quill_core::ANONYMOUS_NOTE_LIFETIME_DAYS;
use quill_storage::CacheTtls;

use crate::constants::{
    DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_EDGE_CACHE_CAPACITY, DEFAULT_PUBLIC_MAX_AGE_SECS,
    DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_STALE_WHILE_REVALIDATE_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::ratelimit::RateLimitRule;

// ============================================================================
// CACHE BACKEND
// ============================================================================

/// Which key-value store backs the cache coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Process-local map. Lost on restart.
    #[default]
    Memory,
    /// Memory-mapped LMDB file, survives restarts on one host.
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(CacheBackendKind::Memory),
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Ceiling and window applied when no route rule matches.
    pub rate_limit_default: RateLimitRule,

    /// Per route-prefix overrides. The longest matching prefix wins.
    pub rate_limit_rules: Vec<RateLimitRule>,

    // ========================================================================
    // Response Caching
    // ========================================================================
    /// `max-age` on public responses.
    pub public_max_age_secs: u64,

    /// `stale-while-revalidate` on public responses.
    pub stale_while_revalidate_secs: u64,

    /// Number of responses held by the edge cache. 0 disables it.
    pub edge_cache_capacity: usize,

    // ========================================================================
    // Cache Coordinator
    // ========================================================================
    pub cache_backend: CacheBackendKind,

    /// Directory of the LMDB environment.
    pub cache_path: PathBuf,

    /// LMDB map size in megabytes.
    pub cache_max_mb: usize,

    pub cache_ttls: CacheTtls,

    // ========================================================================
    // Notes
    // ========================================================================
    /// How long anonymous notes live.
    pub anonymous_note_lifetime: Duration,

    /// Interval of the expired-note sweep. Zero disables the sweep.
    pub sweep_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,

            rate_limit_enabled: true,
            rate_limit_default: RateLimitRule::fallback(
                DEFAULT_RATE_LIMIT_REQUESTS,
                Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            ),
            rate_limit_rules: Vec::new(),

            public_max_age_secs: DEFAULT_PUBLIC_MAX_AGE_SECS,
            stale_while_revalidate_secs: DEFAULT_STALE_WHILE_REVALIDATE_SECS,
            edge_cache_capacity: DEFAULT_EDGE_CACHE_CAPACITY,

            cache_backend: CacheBackendKind::Memory,
            cache_path: PathBuf::from("./data/cache"),
            cache_max_mb: 256,
            cache_ttls: CacheTtls::default(),

            anonymous_note_lifetime: Duration::from_secs(
                ANONYMOUS_NOTE_LIFETIME_DAYS as u64 * 24 * 60 * 60,
            ),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or malformed.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `QUILL_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `QUILL_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `QUILL_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `QUILL_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `QUILL_RATE_LIMIT_DEFAULT`: `<requests>/<window secs>` (default: 100/60)
    /// - `QUILL_RATE_LIMIT_RULES`: `<prefix>=<requests>/<window secs>,...`
    /// - `QUILL_PUBLIC_MAX_AGE_SECS`, `QUILL_STALE_WHILE_REVALIDATE_SECS`
    /// - `QUILL_EDGE_CACHE_CAPACITY`: responses kept by the edge cache
    /// - `QUILL_CACHE_BACKEND`: `memory` or `lmdb`
    /// - `QUILL_CACHE_PATH`, `QUILL_CACHE_MAX_MB`: LMDB location and size
    /// - `QUILL_TTL_*_SECS`: per-entry-kind cache lifetimes
    /// - `QUILL_ANONYMOUS_NOTE_LIFETIME_SECS`
    /// - `QUILL_SWEEP_INTERVAL_SECS`: expired-note sweep interval (0 disables)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("QUILL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("QUILL_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let rate_limit_enabled = std::env::var("QUILL_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let rate_limit_default = std::env::var("QUILL_RATE_LIMIT_DEFAULT")
            .ok()
            .and_then(|s| RateLimitRule::parse_quota(&s))
            .map(|(limit, window)| RateLimitRule::fallback(limit, window))
            .unwrap_or(defaults.rate_limit_default.clone());

        let rate_limit_rules = std::env::var("QUILL_RATE_LIMIT_RULES")
            .map(|s| RateLimitRule::parse_list(&s))
            .unwrap_or_default();

        let ttl_defaults = defaults.cache_ttls;
        let cache_ttls = CacheTtls {
            permission: env_secs("QUILL_TTL_PERMISSION_SECS", ttl_defaults.permission),
            public_note: env_secs("QUILL_TTL_PUBLIC_NOTE_SECS", ttl_defaults.public_note),
            private_note: env_secs("QUILL_TTL_PRIVATE_NOTE_SECS", ttl_defaults.private_note),
            profile: env_secs("QUILL_TTL_PROFILE_SECS", ttl_defaults.profile),
            listing: env_secs("QUILL_TTL_LISTING_SECS", ttl_defaults.listing),
            tracking: env_secs("QUILL_TTL_TRACKING_SECS", ttl_defaults.tracking),
        };

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("QUILL_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),
            rate_limit_enabled,
            rate_limit_default,
            rate_limit_rules,
            public_max_age_secs: env_parse(
                "QUILL_PUBLIC_MAX_AGE_SECS",
                defaults.public_max_age_secs,
            ),
            stale_while_revalidate_secs: env_parse(
                "QUILL_STALE_WHILE_REVALIDATE_SECS",
                defaults.stale_while_revalidate_secs,
            ),
            edge_cache_capacity: env_parse(
                "QUILL_EDGE_CACHE_CAPACITY",
                defaults.edge_cache_capacity,
            ),
            cache_backend: env_parse("QUILL_CACHE_BACKEND", defaults.cache_backend),
            cache_path: std::env::var("QUILL_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            cache_max_mb: env_parse("QUILL_CACHE_MAX_MB", defaults.cache_max_mb),
            cache_ttls,
            anonymous_note_lifetime: env_secs(
                "QUILL_ANONYMOUS_NOTE_LIFETIME_SECS",
                defaults.anonymous_note_lifetime,
            ),
            sweep_interval: env_secs("QUILL_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}
