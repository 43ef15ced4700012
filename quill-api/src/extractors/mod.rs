//! Request extractors: caller identity, request id, typed path ids and
//! envelope-aware JSON and query extractors.

mod body;
mod path_id;

pub use body::{ApiJson, ApiQuery};
pub use path_id::{PathId, PathIds};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use quill_core::UserId;

use crate::auth::Identity;
use crate::error::ApiError;

/// The verified caller, if the request carried a valid bearer token.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Identity>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<UserId> {
        self.0.as_ref().map(|identity| identity.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<Identity>().cloned()))
    }
}

/// The verified caller; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(RequireUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Id assigned to the request by the request id middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestId(
            parts
                .extensions
                .get::<crate::middleware::RequestIdValue>()
                .map(|value| value.0.clone()),
        ))
    }
}
