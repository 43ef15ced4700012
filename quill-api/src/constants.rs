//! Constants for Quill API
//!
//! Defaults for configuration values and the names of the headers the API
//! reads and writes.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Default JWT token expiration time in seconds (1 hour)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 3600;

/// Allowed clock skew when checking `exp`
pub const DEFAULT_JWT_LEEWAY_SECS: i64 = 30;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Requests allowed per window when no route rule matches
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;

/// Default fixed window length in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// ============================================================================
// RESPONSE CACHING
// ============================================================================

/// `max-age` for public responses
pub const DEFAULT_PUBLIC_MAX_AGE_SECS: u64 = 300;

/// `stale-while-revalidate` for public responses
pub const DEFAULT_STALE_WHILE_REVALIDATE_SECS: u64 = 60;

/// Number of responses held by the edge cache
pub const DEFAULT_EDGE_CACHE_CAPACITY: usize = 1024;

/// Largest response body the edge cache will buffer
pub const EDGE_CACHE_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cache-Control for responses that may only be reused after revalidation
pub const PRIVATE_CACHE_CONTROL: &str = "private, max-age=0, must-revalidate";

/// Cache-Control for responses that must never be stored
pub const NO_STORE_CACHE_CONTROL: &str = "no-store";

/// Vary header on negotiated responses
pub const VARY_HEADER_VALUE: &str = "Authorization, Accept-Encoding";

// ============================================================================
// HEADERS
// ============================================================================

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
pub const EDGE_CACHE_HEADER: &str = "x-edge-cache";

// ============================================================================
// JOBS
// ============================================================================

/// Interval of the expired-note sweep in seconds (0 disables it)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
