//! Rate limit middleware.
//!
//! Authenticated callers are counted per user, anonymous callers per client
//! IP. Allowed responses carry the `X-RateLimit-*` headers; rejected ones
//! are 429 with `Retry-After`.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::Identity;
use crate::ratelimit::RateLimitError;
use crate::state::AppState;
use crate::telemetry::{middleware::normalize_path, metrics::with_metrics};

/// Client IP from proxy headers, then the socket address.
pub fn extract_client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        // May be a list; the first entry is the original client.
        if let Some(first) = forwarded_for.split(',').next() {
            if let Ok(ip) = first.trim().parse::<std::net::IpAddr>() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse::<std::net::IpAddr>() {
            return Some(ip.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Counter identity for the request: `user:<id>` or `ip:<addr>`.
pub fn client_key(request: &Request) -> String {
    match request.extensions().get::<Identity>() {
        Some(identity) => format!("user:{}", identity.user_id),
        None => format!(
            "ip:{}",
            extract_client_ip(request).unwrap_or_else(|| "unknown".to_string())
        ),
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let client = client_key(&request);
    let path = request.uri().path().to_string();
    let decision = state.rate_limiter.check(&client, &path).await;

    if !decision.allowed {
        with_metrics(|metrics| metrics.record_rate_limit_rejection(&normalize_path(&path)));
        tracing::info!(client = %client, path = %path, "Request rate limited");
        return Err(RateLimitError { decision });
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(headers: &[(&str, &str)]) -> Result<Request, String> {
        let mut builder = axum::http::Request::builder().uri("/notes");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).map_err(|e| e.to_string())
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() -> Result<(), String> {
        let request = request_with(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")])?;
        assert_eq!(extract_client_ip(&request).as_deref(), Some("203.0.113.7"));
        Ok(())
    }

    #[test]
    fn test_real_ip_fallback() -> Result<(), String> {
        let request = request_with(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")])?;
        assert_eq!(extract_client_ip(&request).as_deref(), Some("198.51.100.2"));
        Ok(())
    }

    #[test]
    fn test_connect_info_fallback() -> Result<(), String> {
        let mut request = request_with(&[])?;
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_key(&request), "ip:127.0.0.1");
        Ok(())
    }

    #[test]
    fn test_authenticated_client_key() -> Result<(), String> {
        let mut request = request_with(&[("x-real-ip", "198.51.100.2")])?;
        let user_id = uuid::Uuid::now_v7();
        request.extensions_mut().insert(Identity {
            user_id,
            email: None,
        });
        assert_eq!(client_key(&request), format!("user:{}", user_id));
        Ok(())
    }

    #[test]
    fn test_unknown_client() -> Result<(), String> {
        assert_eq!(client_key(&request_with(&[])?), "ip:unknown");
        Ok(())
    }
}
