//! Quill API Server Entry Point
//!
//! Reads configuration from the environment, wires the repository, cache
//! backend and identity verifier, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use quill_api::jobs::expiry_sweep_task;
use quill_api::telemetry::{init_tracing, TelemetryConfig};
use quill_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, CacheBackendKind,
    DbClient, DbConfig, JwtVerifier,
};
use quill_core::{Clock, SystemClock};
use quill_storage::{InMemoryKvStore, KvStore, LmdbKvStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    let db_config = DbConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let kv: Arc<dyn KvStore> = match api_config.cache_backend {
        CacheBackendKind::Memory => Arc::new(InMemoryKvStore::new(clock.clone())),
        CacheBackendKind::Lmdb => Arc::new(
            LmdbKvStore::open(&api_config.cache_path, api_config.cache_max_mb, clock.clone())
                .map_err(|e| ApiError::internal_error(format!("Failed to open cache: {}", e)))?,
        ),
    };
    tracing::info!(backend = ?api_config.cache_backend, "Cache backend ready");

    let db = DbClient::from_config(&db_config)?;
    let verifier = Arc::new(JwtVerifier::new(auth_config));
    let sweep_interval = api_config.sweep_interval;

    let state = AppState::new(Arc::new(db), kv, verifier, clock, api_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = (!sweep_interval.is_zero()).then(|| {
        tokio::spawn(expiry_sweep_task(
            state.notes.clone(),
            sweep_interval,
            shutdown_rx,
        ))
    });

    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Quill API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweep {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Expiry sweep task ended abnormally");
        }
    }
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("QUILL_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("QUILL_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::validation(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation(format!("Invalid bind address {}: {}", addr, e)))
}
