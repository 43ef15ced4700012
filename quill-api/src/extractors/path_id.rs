//! Path extractors for note and user ids.
//!
//! Malformed ids are rejected with the standard error envelope
//! (`VALIDATION_ERROR`, `details.field` naming the segment) instead of
//! axum's plain-text path rejection.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

/// A single UUID path parameter, e.g. `/notes/:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_field("id", e))?;
        parse_id("id", &raw).map(PathId)
    }
}

/// Two UUID path parameters, e.g. `/notes/:id/access/:userId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathIds(pub Uuid, pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathIds
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((first, second)): Path<(String, String)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_field("path", e))?;
        Ok(PathIds(parse_id("id", &first)?, parse_id("userId", &second)?))
    }
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid_field(field, format!("'{}' is not a valid id", raw)))
}
