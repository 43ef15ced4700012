//! Quill API - REST layer for the Quill notes service
//!
//! Axum routes over the note store, permission resolver and profile store,
//! with conditional responses, an edge response cache and fixed-window rate
//! limiting. Durable state lives in PostgreSQL behind
//! [`quill_storage::NoteRepository`]; cached state lives in a key-value
//! store behind [`quill_storage::KvStore`].

#[macro_use]
pub mod macros;

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod edge_cache;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod middleware;
pub mod negotiate;
pub mod notes;
pub mod openapi;
pub mod permissions;
pub mod profiles;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use auth::{generate_token, AuthConfig, Claims, Identity, IdentityVerifier, JwtVerifier};
pub use config::{ApiConfig, CacheBackendKind};
pub use db::{DbClient, DbConfig};
pub use edge_cache::{EdgeCache, InMemoryEdgeCache};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use negotiate::{CachePolicy, Negotiator};
pub use notes::NoteStore;
pub use openapi::ApiDoc;
pub use permissions::PermissionResolver;
pub use profiles::ProfileStore;
pub use ratelimit::{RateLimitDecision, RateLimiter};
pub use routes::create_api_router;
pub use state::AppState;
