//! Request ids and hardening headers.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::constants::REQUEST_ID_HEADER;
use crate::negotiate::apply_security_headers;

/// Request id stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdValue(pub String);

const MAX_INCOMING_ID_LEN: usize = 128;

/// Reuse a sane incoming `X-Request-Id` or mint a new one, and echo it on
/// the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_INCOMING_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    request
        .extensions_mut()
        .insert(RequestIdValue(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::extractors::RequestId;

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|RequestId(id): RequestId| async move { id.unwrap_or_default() }),
            )
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_echoed() -> Result<(), String> {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or("missing request id")?;
        assert!(Uuid::parse_str(&header).is_ok());
        assert!(response.headers().contains_key("x-content-type-options"));

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(body.as_ref(), header.as_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() -> Result<(), String> {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "trace-abc")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(
            response
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("trace-abc")
        );
        Ok(())
    }
}
