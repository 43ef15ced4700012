//! Edge response cache middleware.
//!
//! Anonymous GETs are answered from the edge cache when a fresh copy exists.
//! Misses run the handler and store the response if it is a `200` whose
//! `Cache-Control` is public. Successful mutations purge every cached GET
//! under the same top-level path segment.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use quill_storage::etag_matches;

use crate::constants::{EDGE_CACHE_HEADER, EDGE_CACHE_MAX_BODY_BYTES};
use crate::edge_cache::CachedResponse;
use crate::state::AppState;
use crate::telemetry::metrics::with_metrics;

/// Cache key for a request: method plus path and query.
pub fn edge_cache_key(request: &Request) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| request.uri().path());
    format!("{} {}", request.method(), target)
}

/// `GET /<first segment>`, covering every cached read of the resource.
fn purge_prefix(path: &str) -> String {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    format!("GET /{}", first)
}

fn is_storable(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }
    let public = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("public") && !v.contains("no-store"))
        .unwrap_or(false);
    let small_enough = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= EDGE_CACHE_MAX_BODY_BYTES as u64);
    public && small_enough
}

/// `max-age` from a `Cache-Control` value, if present.
fn max_age_secs(cache_control: &str) -> Option<i64> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.parse().ok())
}

fn mark(response: &mut Response, outcome: &'static str) {
    response.headers_mut().insert(
        HeaderName::from_static(EDGE_CACHE_HEADER),
        HeaderValue::from_static(outcome),
    );
}

pub async fn edge_cache_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();

    if method != Method::GET {
        let path = request.uri().path().to_string();
        let response = next.run(request).await;
        if response.status().is_success() && method != Method::HEAD && method != Method::OPTIONS {
            state.edge_cache.purge_prefix(&purge_prefix(&path)).await;
        }
        return response;
    }

    if request.headers().contains_key(header::AUTHORIZATION) {
        return next.run(request).await;
    }

    let key = edge_cache_key(&request);
    let if_none_match = request
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(cached) = state.edge_cache.lookup(&key).await {
        with_metrics(|metrics| metrics.record_edge_cache("hit"));
        let cached_etag = cached
            .headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok());
        if let (Some(candidate), Some(etag)) = (if_none_match.as_deref(), cached_etag) {
            if etag_matches(candidate, etag) {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                for name in [header::ETAG, header::CACHE_CONTROL, header::VARY] {
                    if let Some(value) = cached.headers.get(&name) {
                        response.headers_mut().insert(name, value.clone());
                    }
                }
                mark(&mut response, "HIT");
                return response;
            }
        }
        let mut response = cached.to_response();
        mark(&mut response, "HIT");
        return response;
    }

    let response = next.run(request).await;
    if !is_storable(&response) {
        return response;
    }

    with_metrics(|metrics| metrics.record_edge_cache("miss"));
    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, EDGE_CACHE_MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "Failed to buffer response for edge cache");
            let mut response = Response::from_parts(parts, Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        }
    };

    let stored_at = state.clock.now();
    let expires_at = parts
        .headers
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(max_age_secs)
        .map(|secs| stored_at + chrono::Duration::seconds(secs));
    state
        .edge_cache
        .store(
            key,
            CachedResponse {
                status: parts.status,
                headers: parts.headers.clone(),
                body: bytes.clone(),
                stored_at,
                expires_at,
            },
        )
        .await;
    with_metrics(|metrics| metrics.record_edge_cache("store"));

    let mut response = Response::from_parts(parts, Body::from(bytes));
    mark(&mut response, "MISS");
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_prefix_uses_first_segment() {
        assert_eq!(purge_prefix("/notes/abc/share"), "GET /notes");
        assert_eq!(purge_prefix("/profiles/me"), "GET /profiles");
        assert_eq!(purge_prefix("/"), "GET /");
    }

    #[test]
    fn test_key_includes_query() -> Result<(), String> {
        let request = axum::http::Request::builder()
            .uri("/notes?page=2&limit=10")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        assert_eq!(edge_cache_key(&request), "GET /notes?page=2&limit=10");
        Ok(())
    }

    #[test]
    fn test_max_age_is_read_from_any_position() {
        assert_eq!(max_age_secs("public, max-age=300, stale-while-revalidate=60"), Some(300));
        assert_eq!(max_age_secs("public,max-age=12"), Some(12));
        assert_eq!(max_age_secs("public, s-maxage=5"), None);
        assert_eq!(max_age_secs("no-store"), None);
    }

    #[test]
    fn test_only_public_ok_is_storable() {
        let mut response = Response::new(Body::from("{}"));
        assert!(!is_storable(&response));

        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=300, stale-while-revalidate=60"),
        );
        assert!(is_storable(&response));

        *response.status_mut() = StatusCode::CREATED;
        assert!(!is_storable(&response));
    }
}
