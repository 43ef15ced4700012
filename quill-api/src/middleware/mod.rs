//! Axum middleware.
//!
//! Layer order, outermost first: CORS, observability, request id, hardening
//! headers, identity, rate limit, edge cache, handler. The rate limiter sits
//! outside the edge cache so cached hits still count against the caller.

mod edge;
mod identity;
mod rate_limit;
mod request;

pub use edge::{edge_cache_key, edge_cache_middleware};
pub use identity::identity_middleware;
pub use rate_limit::{client_key, extract_client_ip, rate_limit_middleware};
pub use request::{request_id_middleware, security_headers_middleware, RequestIdValue};
