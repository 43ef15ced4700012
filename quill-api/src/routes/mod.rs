//! REST API Routes
//!
//! Route modules and the assembly of the full router with its middleware
//! stack.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::constants::{
    EDGE_CACHE_HEADER, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER,
    RATE_LIMIT_RESET_HEADER, REQUEST_ID_HEADER,
};
use crate::middleware::{
    edge_cache_middleware, identity_middleware, rate_limit_middleware, request_id_middleware,
    security_headers_middleware,
};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod health;
pub mod notes;
pub mod profiles;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete router over `state`.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - answers preflight requests
/// 2. Observability - request span and HTTP metrics
/// 3. Request id - minted or echoed before anything can fail
/// 4. Hardening headers - applied to every response, errors included
/// 5. Identity - verifies the bearer token, if any
/// 6. Rate limiting - per user, or per client address when anonymous
/// 7. Edge cache - serves and stores public GET responses
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);
    let verifier = state.verifier.clone();

    Router::new()
        .nest("/notes", notes::create_router())
        .nest("/profiles", profiles::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        // Execution order is the reverse of the order layers are added
        .layer(from_fn_with_state(state.clone(), edge_cache_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(verifier, identity_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(observability_middleware))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed; otherwise only the
/// configured ones are.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::IF_NONE_MATCH,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            header::ETAG,
            header::RETRY_AFTER,
            HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
            HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
            HeaderName::from_static(RATE_LIMIT_RESET_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(EDGE_CACHE_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}
