//! Response Negotiator
//!
//! Turns handler payloads into enveloped JSON responses with an entity tag,
//! a `Cache-Control` policy and `Vary`. Conditional reads whose
//! `If-None-Match` matches the payload's tag short-circuit to a bodyless 304.
//!
//! The tag is computed over the payload only (not the envelope), so the
//! request id and timestamp in `meta` never defeat revalidation.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use quill_core::Timestamp;
use quill_storage::{etag_for, etag_matches};
use serde::Serialize;

use crate::config::ApiConfig;
use crate::constants::{NO_STORE_CACHE_CONTROL, PRIVATE_CACHE_CONTROL, VARY_HEADER_VALUE};
use crate::types::{ApiEnvelope, ResponseMeta};

/// Caching policy chosen by a handler for its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    /// Shared caches may store the response.
    Public,
    /// Only the requesting client may reuse it, after revalidation.
    Private,
    /// Mutations and anything else that must never be stored.
    NoStore,
    /// Use this exact `Cache-Control` value.
    Override(String),
}

#[derive(Debug, Clone)]
pub struct Negotiator {
    public_max_age_secs: u64,
    stale_while_revalidate_secs: u64,
}

impl Negotiator {
    pub fn new(public_max_age_secs: u64, stale_while_revalidate_secs: u64) -> Self {
        Self {
            public_max_age_secs,
            stale_while_revalidate_secs,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.public_max_age_secs, config.stale_while_revalidate_secs)
    }

    pub fn cache_control(&self, policy: &CachePolicy) -> String {
        match policy {
            CachePolicy::Public => format!(
                "public, max-age={}, stale-while-revalidate={}",
                self.public_max_age_secs, self.stale_while_revalidate_secs
            ),
            CachePolicy::Private => PRIVATE_CACHE_CONTROL.to_string(),
            CachePolicy::NoStore => NO_STORE_CACHE_CONTROL.to_string(),
            CachePolicy::Override(value) => value.clone(),
        }
    }

    /// Public policy whose `max-age` never outlives `expires_at`.
    ///
    /// Content that expires sooner than the configured max-age gets a
    /// shortened `max-age` and no stale window, so shared caches drop it
    /// no later than the content itself disappears.
    pub fn public_until(&self, expires_at: Option<Timestamp>, now: Timestamp) -> CachePolicy {
        let Some(expires_at) = expires_at else {
            return CachePolicy::Public;
        };
        let remaining = u64::try_from((expires_at - now).num_seconds()).unwrap_or(0);
        if remaining >= self.public_max_age_secs.saturating_add(self.stale_while_revalidate_secs) {
            CachePolicy::Public
        } else {
            CachePolicy::Override(format!("public, max-age={}", remaining))
        }
    }

    /// Build the response for `data`.
    ///
    /// Only cacheable `200 OK` responses take part in conditional requests;
    /// `201 Created` and `no-store` responses always carry a body.
    pub fn respond<T: Serialize>(
        &self,
        request_headers: &HeaderMap,
        status: StatusCode,
        data: T,
        meta: ResponseMeta,
        policy: CachePolicy,
    ) -> Response {
        let cache_control = self.cache_control(&policy);
        let etag = match etag_for(&data) {
            Ok(tag) => Some(tag),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to compute entity tag");
                None
            }
        };

        if status == StatusCode::OK && policy != CachePolicy::NoStore {
            if let (Some(tag), Some(candidate)) = (
                etag.as_deref(),
                request_headers
                    .get(header::IF_NONE_MATCH)
                    .and_then(|v| v.to_str().ok()),
            ) {
                if etag_matches(candidate, tag) {
                    let mut response = Response::new(Body::empty());
                    *response.status_mut() = StatusCode::NOT_MODIFIED;
                    apply_cache_headers(response.headers_mut(), etag.as_deref(), &cache_control);
                    return response;
                }
            }
        }

        let mut response = (status, Json(ApiEnvelope::ok(data, meta))).into_response();
        apply_cache_headers(response.headers_mut(), etag.as_deref(), &cache_control);
        response
    }
}

fn apply_cache_headers(headers: &mut HeaderMap, etag: Option<&str>, cache_control: &str) {
    if let Some(value) = etag.and_then(|tag| HeaderValue::from_str(tag).ok()) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert(header::VARY, HeaderValue::from_static(VARY_HEADER_VALUE));
}

// ============================================================================
// HARDENING HEADERS
// ============================================================================

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "strict-transport-security",
        "max-age=63072000; includeSubDomains",
    ),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

/// Attach the fixed hardening headers. Values already set by a handler win.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for &(name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert_with(|| HeaderValue::from_static(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn negotiator() -> Negotiator {
        Negotiator::new(300, 60)
    }

    fn meta() -> ResponseMeta {
        ResponseMeta::new(Some("req-1".to_string()), Utc::now())
    }

    #[test]
    fn test_cache_control_policies() {
        let n = negotiator();
        assert_eq!(
            n.cache_control(&CachePolicy::Public),
            "public, max-age=300, stale-while-revalidate=60"
        );
        assert_eq!(n.cache_control(&CachePolicy::Private), PRIVATE_CACHE_CONTROL);
        assert_eq!(n.cache_control(&CachePolicy::NoStore), "no-store");
        assert_eq!(
            n.cache_control(&CachePolicy::Override("max-age=5".to_string())),
            "max-age=5"
        );
    }

    #[test]
    fn test_public_until_caps_max_age_at_expiry() {
        let n = negotiator();
        let now = Utc::now();
        assert_eq!(n.public_until(None, now), CachePolicy::Public);
        assert_eq!(
            n.public_until(Some(now + chrono::Duration::days(7)), now),
            CachePolicy::Public
        );
        assert_eq!(
            n.public_until(Some(now + chrono::Duration::seconds(90)), now),
            CachePolicy::Override("public, max-age=90".to_string())
        );
        assert_eq!(
            n.public_until(Some(now - chrono::Duration::seconds(5)), now),
            CachePolicy::Override("public, max-age=0".to_string())
        );
    }

    #[test]
    fn test_response_carries_cache_headers() -> Result<(), String> {
        let response = negotiator().respond(
            &HeaderMap::new(),
            StatusCode::OK,
            json!({"title": "a"}),
            meta(),
            CachePolicy::Public,
        );
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers.contains_key(header::ETAG));
        assert_eq!(
            headers.get(header::VARY).and_then(|v| v.to_str().ok()),
            Some("Authorization, Accept-Encoding")
        );
        let cache_control = headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .ok_or("missing cache-control")?;
        assert!(cache_control.starts_with("public"));
        Ok(())
    }

    #[tokio::test]
    async fn test_matching_etag_yields_empty_304() -> Result<(), String> {
        let n = negotiator();
        let payload = json!({"id": 1, "title": "same"});
        let first = n.respond(
            &HeaderMap::new(),
            StatusCode::OK,
            payload.clone(),
            meta(),
            CachePolicy::Private,
        );
        let etag = first
            .headers()
            .get(header::ETAG)
            .cloned()
            .ok_or("missing etag")?;

        let mut conditional = HeaderMap::new();
        conditional.insert(header::IF_NONE_MATCH, etag.clone());
        let second = n.respond(
            &conditional,
            StatusCode::OK,
            payload,
            ResponseMeta::new(Some("req-2".to_string()), Utc::now()),
            CachePolicy::Private,
        );
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers().get(header::ETAG), Some(&etag));
        assert!(second.headers().contains_key(header::CACHE_CONTROL));

        let body = axum::body::to_bytes(second.into_body(), 1024)
            .await
            .map_err(|e| e.to_string())?;
        assert!(body.is_empty());
        Ok(())
    }

    #[test]
    fn test_changed_payload_is_not_304() {
        let n = negotiator();
        let first = n.respond(
            &HeaderMap::new(),
            StatusCode::OK,
            json!({"title": "v1"}),
            meta(),
            CachePolicy::Private,
        );
        let mut conditional = HeaderMap::new();
        if let Some(etag) = first.headers().get(header::ETAG) {
            conditional.insert(header::IF_NONE_MATCH, etag.clone());
        }
        let second = n.respond(
            &conditional,
            StatusCode::OK,
            json!({"title": "v2"}),
            meta(),
            CachePolicy::Private,
        );
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[test]
    fn test_created_ignores_conditional_header() {
        let mut conditional = HeaderMap::new();
        conditional.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        let response = negotiator().respond(
            &conditional,
            StatusCode::CREATED,
            json!({"id": 2}),
            meta(),
            CachePolicy::NoStore,
        );
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_no_store_ignores_conditional_header() {
        let mut conditional = HeaderMap::new();
        conditional.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        let response = negotiator().respond(
            &conditional,
            StatusCode::OK,
            json!({"id": 3}),
            meta(),
            CachePolicy::NoStore,
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
    }

    #[test]
    fn test_security_headers_do_not_override() {
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
        apply_security_headers(&mut headers);
        assert_eq!(
            headers.get("x-frame-options").and_then(|v| v.to_str().ok()),
            Some("SAMEORIGIN")
        );
        assert_eq!(
            headers
                .get("x-content-type-options")
                .and_then(|v| v.to_str().ok()),
            Some("nosniff")
        );
        assert_eq!(headers.len(), SECURITY_HEADERS.len());
    }
}
