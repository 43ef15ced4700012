//! Profile REST API Routes

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, put},
    Router,
};
use quill_core::{Profile, ProfileChanges};

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, MaybeUser, PathId, RequestId, RequireUser},
    negotiate::CachePolicy,
    state::AppState,
    types::ResponseMeta,
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/me", put(update_my_profile))
        .route("/:user_id", get(get_profile))
}

/// GET /profiles/{userId} - Public profile of a user
#[utoipa::path(
    get,
    path = "/profiles/{userId}",
    tag = "Profiles",
    params(("userId" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 304, description = "Not modified"),
        (status = 404, description = "No profile", body = ApiError),
    ),
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: MaybeUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(user_id): PathId,
) -> ApiResult<Response> {
    let profile = state.profiles.get(user_id).await?;
    let policy = if user.0.is_none() {
        CachePolicy::Public
    } else {
        CachePolicy::Private
    };
    let meta = ResponseMeta::new(request_id.0, state.clock.now());
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::OK, profile, meta, policy))
}

/// PUT /profiles/me - Create or update the caller's profile
#[utoipa::path(
    put,
    path = "/profiles/me",
    tag = "Profiles",
    request_body = ProfileChanges,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 400, description = "Invalid username", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Username taken", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_my_profile(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> ApiResult<Response> {
    let profile = state.profiles.upsert(identity.user_id, changes).await?;
    let meta = ResponseMeta::new(request_id.0, state.clock.now());
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::OK, profile, meta, CachePolicy::NoStore))
}
