//! Error Types for Quill API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation rendering the shared response envelope
//!
//! Every error leaves the service as
//! `{ "success": false, "error": { code, message, details? }, "meta": { timestamp } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use quill_core::QuillError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Clients branch on these; each maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or invalid identity
    Unauthorized,

    /// Authenticated but the resolved permission is insufficient
    Forbidden,

    NotFound,

    /// Uniqueness violation, e.g. duplicate slug or username
    Conflict,

    /// Malformed input
    ValidationError,

    RateLimitExceeded,

    /// A store call failed
    DatabaseError,

    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Conflict => "Resource already exists",
            ErrorCode::ValidationError => "Request validation failed",
            ErrorCode::RateLimitExceeded => "Rate limit exceeded",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by all API endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error, utoipa::ToSchema)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (offending field, retry hints, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create a NotFound error for a specific entity.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} {} not found", entity_type, id),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a ValidationError naming the offending field.
    pub fn invalid_field(field: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ValidationError,
            format!("Invalid value for {}: {}", field, reason),
        )
        .with_details(serde_json::json!({ "field": field }))
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a RateLimitExceeded error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
        .with_details(serde_json::json!({ "retryAfter": retry_after_secs }))
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Wire shape of an error response.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ApiError,
    pub meta: ErrorMeta,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMeta {
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: chrono::DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            success: false,
            error: self,
            meta: ErrorMeta {
                timestamp: Utc::now(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Domain errors carry their own category. Store failures are reduced to a
/// generic message so no internal detail leaks.
impl From<QuillError> for ApiError {
    fn from(err: QuillError) -> Self {
        match err {
            QuillError::NotFound { entity, id } => ApiError::entity_not_found(entity, id),
            QuillError::Forbidden { reason } => ApiError::forbidden(reason),
            QuillError::Conflict { reason } => ApiError::conflict(reason),
            QuillError::Validation { field, reason } => ApiError::invalid_field(&field, reason),
            QuillError::Database { reason } => {
                tracing::error!(reason = %reason, "Database error");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
            QuillError::Internal { reason } => {
                tracing::error!(reason = %reason, "Internal error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

/// Map a driver error into the domain taxonomy.
///
/// SQLSTATE 23505 (unique violation) becomes a conflict; anything else is
/// logged in full and reduced to a generic database error.
pub fn map_pg_error(err: tokio_postgres::Error) -> QuillError {
    if err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
        let constraint = err
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("unique constraint")
            .to_string();
        return QuillError::conflict(format!("{} violated", constraint));
    }
    tracing::error!("Database error: {:?}", err);
    QuillError::database("Database operation failed")
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        ApiError::from(map_pg_error(err))
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        ApiError::database_error("Failed to acquire database connection")
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::validation(format!("Invalid id: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
