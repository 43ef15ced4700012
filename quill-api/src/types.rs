//! Request and response types for the REST surface.

use chrono::{DateTime, Utc};
use quill_core::{GrantLevel, Pagination, UserId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Metadata attached to every successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl ResponseMeta {
    pub fn new(request_id: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            request_id,
            timestamp,
            pagination: None,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// `{ success, data?, error?, meta? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T, meta: ResponseMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(meta),
        }
    }
}

// ============================================================================
// SHARING
// ============================================================================

/// Body of `POST /notes/:id/share`. Exactly one of `userId` and `username`
/// identifies the grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    pub permission: GrantLevel,
}

/// Response of a successful share or revoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessChange {
    #[schema(value_type = String, format = "uuid")]
    pub note_id: uuid::Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<GrantLevel>,
}

/// Response of `DELETE /notes/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    #[schema(value_type = String, format = "uuid")]
    pub id: uuid::Uuid,
    pub deleted: bool,
}
