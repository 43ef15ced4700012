//! Health Check Endpoints
//!
//! - /health - store reachability, cache statistics and uptime
//! - /health/ping - simple liveness check
//!
//! No authentication required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// Store reachable but the cache is failing every read
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub cache: CacheHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CacheHealth {
    pub hits: u64,
    pub misses: u64,
    pub unavailable: u64,
    pub hit_rate: f64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health - Store connectivity and cache statistics
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let database = match state.repo.ping().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unreachable");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some("store unreachable".to_string()),
            }
        }
    };

    let stats = state.cache.stats();
    let cache_failing = stats.unavailable > 0 && stats.hits == 0 && stats.misses == 0;

    let overall = match (database.status, cache_failing) {
        (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
        (_, true) => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    };

    let response = HealthResponse {
        status: overall,
        message: None,
        details: Some(HealthDetails {
            database,
            cache: CacheHealth {
                hits: stats.hits,
                misses: stats.misses,
                unavailable: stats.unavailable,
                hit_rate: stats.hit_rate(),
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/ping", get(ping))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() -> Result<(), String> {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            message: Some("cache failing".to_string()),
            details: None,
        };
        let json = serde_json::to_string(&response).map_err(|e| e.to_string())?;
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(!json.contains("details"));
        Ok(())
    }

    #[test]
    fn test_component_health_with_error() -> Result<(), String> {
        let component = ComponentHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some("store unreachable".to_string()),
        };
        let json = serde_json::to_string(&component).map_err(|e| e.to_string())?;
        assert!(json.contains("\"status\":\"unhealthy\""));
        assert!(!json.contains("latency_ms"));
        Ok(())
    }
}
