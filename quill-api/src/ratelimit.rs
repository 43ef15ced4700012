//! Fixed-window rate limiting over the cache substrate.
//!
//! Each (client, route) pair owns one counter entry
//! `ratelimit:<client>:<route>` holding the request count and the end of the
//! current window. The first request of a window writes the entry with a TTL
//! equal to the window length; later requests rewrite it with the remaining
//! time so the entry disappears when the window closes.
//!
//! Read-then-write is not atomic: concurrent requests at the boundary can all
//! pass. Cache outages let every request through.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use quill_core::Clock;
use quill_storage::{CacheCoordinator, CacheKey, CacheRead};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::constants::{
    RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
};
use crate::error::ApiError;
use crate::telemetry::middleware::normalize_path;

// ============================================================================
// RULES
// ============================================================================

/// Ceiling and window for requests whose path starts with `prefix`.
///
/// The fallback rule has an empty prefix and matches every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub prefix: String,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(prefix: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            limit,
            window,
        }
    }

    /// Rule used when no prefix rule matches.
    pub fn fallback(limit: u32, window: Duration) -> Self {
        Self::new(String::new(), limit, window)
    }

    /// Parse `<requests>/<window secs>`, e.g. `60/60`.
    pub fn parse_quota(raw: &str) -> Option<(u32, Duration)> {
        let (limit, window) = raw.trim().split_once('/')?;
        let limit = limit.trim().parse().ok()?;
        let window: u64 = window.trim().parse().ok()?;
        if window == 0 {
            return None;
        }
        Some((limit, Duration::from_secs(window)))
    }

    /// Parse `<prefix>=<requests>/<window secs>` entries separated by commas.
    /// Malformed entries are skipped with a warning.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let parsed = entry.split_once('=').and_then(|(prefix, quota)| {
                    let (limit, window) = Self::parse_quota(quota)?;
                    let prefix = prefix.trim();
                    prefix
                        .starts_with('/')
                        .then(|| Self::new(prefix, limit, window))
                });
                if parsed.is_none() {
                    tracing::warn!(entry, "Ignoring malformed rate limit rule");
                }
                parsed
            })
            .collect()
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// Counter state persisted per (client, route).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct WindowState {
    count: u32,
    /// End of the window, epoch milliseconds.
    reset_at_ms: i64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// End of the current window, epoch seconds.
    pub reset_at: i64,
    /// Seconds until the window closes, at least 1.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// Attach the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let pairs = [
            (RATE_LIMIT_LIMIT_HEADER, self.limit.to_string()),
            (RATE_LIMIT_REMAINING_HEADER, self.remaining.to_string()),
            (RATE_LIMIT_RESET_HEADER, self.reset_at.to_string()),
        ];
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
}

// ============================================================================
// LIMITER
// ============================================================================

pub struct RateLimiter {
    cache: Arc<CacheCoordinator>,
    clock: Arc<dyn Clock>,
    default_rule: RateLimitRule,
    /// Sorted by descending prefix length so the first match is the longest.
    rules: Vec<RateLimitRule>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("default_rule", &self.default_rule)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(
        cache: Arc<CacheCoordinator>,
        clock: Arc<dyn Clock>,
        default_rule: RateLimitRule,
        mut rules: Vec<RateLimitRule>,
    ) -> Self {
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            cache,
            clock,
            default_rule,
            rules,
        }
    }

    pub fn from_config(
        cache: Arc<CacheCoordinator>,
        clock: Arc<dyn Clock>,
        config: &ApiConfig,
    ) -> Self {
        Self::new(
            cache,
            clock,
            config.rate_limit_default.clone(),
            config.rate_limit_rules.clone(),
        )
    }

    /// Rule for `path` plus the route component of the counter key.
    ///
    /// Prefix rules share one counter per prefix; the fallback counts each
    /// normalized path separately.
    fn rule_for(&self, path: &str) -> (&RateLimitRule, String) {
        match self.rules.iter().find(|rule| rule.matches(path)) {
            Some(rule) => (rule, rule.prefix.clone()),
            None => (&self.default_rule, normalize_path(path)),
        }
    }

    /// Count one request from `client` against `path`.
    pub async fn check(&self, client: &str, path: &str) -> RateLimitDecision {
        let (rule, route) = self.rule_for(path);
        let key = CacheKey::rate_limit(client, &route);
        let now_ms = self.clock.now().timestamp_millis();
        let window_ms = rule.window.as_millis() as i64;

        let state = match self.cache.get::<WindowState>(&key).await {
            CacheRead::Hit(state) if state.reset_at_ms > now_ms => state,
            CacheRead::Hit(_) | CacheRead::Miss => WindowState {
                count: 0,
                reset_at_ms: now_ms + window_ms,
            },
            CacheRead::Unavailable => {
                return Self::decision(rule, true, rule.limit, now_ms + window_ms, now_ms);
            }
        };

        if state.count >= rule.limit {
            tracing::debug!(client, route = %route, limit = rule.limit, "Rate limit exceeded");
            return Self::decision(rule, false, 0, state.reset_at_ms, now_ms);
        }

        let next = WindowState {
            count: state.count + 1,
            reset_at_ms: state.reset_at_ms,
        };
        let ttl = Duration::from_millis((next.reset_at_ms - now_ms).max(1) as u64);
        self.cache.set(&key, &next, ttl).await;

        Self::decision(
            rule,
            true,
            rule.limit.saturating_sub(next.count),
            next.reset_at_ms,
            now_ms,
        )
    }

    fn decision(
        rule: &RateLimitRule,
        allowed: bool,
        remaining: u32,
        reset_at_ms: i64,
        now_ms: i64,
    ) -> RateLimitDecision {
        let until_reset_ms = (reset_at_ms - now_ms).max(0) as u64;
        RateLimitDecision {
            allowed,
            limit: rule.limit,
            remaining,
            reset_at: reset_at_ms.div_euclid(1000),
            retry_after_secs: until_reset_ms.div_ceil(1000).max(1),
        }
    }
}

// ============================================================================
// ERROR RESPONSE
// ============================================================================

/// 429 response carrying `Retry-After` and the rate limit headers.
#[derive(Debug)]
pub struct RateLimitError {
    pub decision: RateLimitDecision,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let retry_after = self.decision.retry_after_secs;
        let mut response = ApiError::rate_limited(retry_after).into_response();
        let headers = response.headers_mut();
        self.decision.apply_headers(headers);
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from_str(&retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use quill_core::ManualClock;
    use quill_storage::{InMemoryKvStore, KvStore};

    fn limiter(rules: Vec<RateLimitRule>) -> (RateLimiter, Arc<ManualClock>, Arc<InMemoryKvStore>) {
        let clock = Arc::new(ManualClock::fixed());
        let store = Arc::new(InMemoryKvStore::new(clock.clone()));
        let cache = Arc::new(CacheCoordinator::new(
            store.clone() as Arc<dyn KvStore>,
            Duration::from_secs(86400),
        ));
        let limiter = RateLimiter::new(
            cache,
            clock.clone(),
            RateLimitRule::fallback(100, Duration::from_secs(60)),
            rules,
        );
        (limiter, clock, store)
    }

    #[test]
    fn test_parse_list() {
        let rules = RateLimitRule::parse_list("/notes=60/60, bogus, /profiles=120/30,/x=1/0");
        assert_eq!(
            rules,
            vec![
                RateLimitRule::new("/notes", 60, Duration::from_secs(60)),
                RateLimitRule::new("/profiles", 120, Duration::from_secs(30)),
            ]
        );
    }

    #[tokio::test]
    async fn test_sixth_request_in_window_is_rejected() {
        let (limiter, clock, _store) =
            limiter(vec![RateLimitRule::new("/notes", 5, Duration::from_secs(60))]);

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("ip:10.0.0.1", "/notes").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("ip:10.0.0.1", "/notes").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_secs, 60);

        clock.advance(Duration::from_secs(60));
        assert!(limiter.check("ip:10.0.0.1", "/notes").await.allowed);
    }

    #[tokio::test]
    async fn test_clients_and_routes_are_counted_separately() {
        let (limiter, _clock, _store) =
            limiter(vec![RateLimitRule::new("/notes", 1, Duration::from_secs(60))]);

        assert!(limiter.check("user:a", "/notes").await.allowed);
        assert!(!limiter.check("user:a", "/notes/123").await.allowed);
        assert!(limiter.check("user:b", "/notes").await.allowed);
        assert!(limiter.check("user:a", "/profiles/me").await.allowed);
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let (limiter, _clock, _store) = limiter(vec![
            RateLimitRule::new("/notes", 10, Duration::from_secs(60)),
            RateLimitRule::new("/notes/share", 2, Duration::from_secs(60)),
        ]);
        assert_eq!(limiter.check("c", "/notes/share").await.limit, 2);
        assert_eq!(limiter.check("c", "/notes").await.limit, 10);
        assert_eq!(limiter.check("c", "/health").await.limit, 100);
    }

    #[tokio::test]
    async fn test_fails_open_when_cache_is_down() {
        let (limiter, _clock, store) =
            limiter(vec![RateLimitRule::new("/notes", 1, Duration::from_secs(60))]);
        store.set_available(false);

        for _ in 0..3 {
            assert!(limiter.check("c", "/notes").await.allowed);
        }
    }

    #[tokio::test]
    async fn test_error_response_headers() -> Result<(), String> {
        let response = RateLimitError {
            decision: RateLimitDecision {
                allowed: false,
                limit: 5,
                remaining: 0,
                reset_at: 1_704_067_260,
                retry_after_secs: 42,
            },
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(
            headers.get("retry-after").and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert_eq!(
            headers.get("x-ratelimit-limit").and_then(|v| v.to_str().ok()),
            Some("5")
        );
        assert_eq!(
            headers.get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()),
            Some("0")
        );
        Ok(())
    }
}
