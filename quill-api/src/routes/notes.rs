//! Note REST API Routes
//!
//! Handlers stay thin: they pick the caller and cache policy, call the note
//! store or permission resolver, and hand the payload to the negotiator.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use quill_core::{ListNotesQuery, NewNote, NoteChanges, NoteView, Visibility};

use crate::{
    error::{ApiError, ApiResult},
    extractors::{ApiJson, ApiQuery, MaybeUser, PathId, PathIds, RequestId, RequireUser},
    negotiate::CachePolicy,
    state::AppState,
    types::{AccessChange, Deleted, ResponseMeta, ShareRequest},
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notes).post(create_note))
        .route("/:id", get(get_note).put(update_note).delete(delete_note))
        .route("/:id/share", post(share_note))
        .route("/:id/access/:user_id", delete(revoke_access))
        .route("/:id/collaborators", get(list_collaborators))
}

fn meta(state: &AppState, request_id: RequestId) -> ResponseMeta {
    ResponseMeta::new(request_id.0, state.clock.now())
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /notes - List the notes visible to the caller
#[utoipa::path(
    get,
    path = "/notes",
    tag = "Notes",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("limit" = Option<u32>, Query, description = "Page size (max 100)"),
        ("search" = Option<String>, Query, description = "Case-insensitive title/content search"),
        ("sortBy" = Option<String>, Query, description = "createdAt, updatedAt, title or viewCount"),
        ("sortOrder" = Option<String>, Query, description = "asc or desc"),
        ("filterByUserId" = Option<String>, Query, description = "Only notes owned by this user"),
    ),
    responses(
        (status = 200, description = "Page of notes in the response envelope", body = [NoteView]),
        (status = 304, description = "Not modified"),
        (status = 401, description = "Invalid bearer token", body = ApiError),
    ),
)]
pub async fn list_notes(
    State(state): State<AppState>,
    user: MaybeUser,
    request_id: RequestId,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ListNotesQuery>,
) -> ApiResult<Response> {
    let caller = user.user_id();
    let (notes, pagination) = state.notes.list(caller, query).await?;

    // Anonymous listings only ever contain public notes.
    let policy = if caller.is_none() {
        let soonest = notes.iter().filter_map(|view| view.note.expires_at).min();
        state.negotiator.public_until(soonest, state.clock.now())
    } else {
        CachePolicy::Private
    };
    let meta = meta(&state, request_id).with_pagination(pagination);
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::OK, notes, meta, policy))
}

/// GET /notes/{id} - Fetch one note
#[utoipa::path(
    get,
    path = "/notes/{id}",
    tag = "Notes",
    params(("id" = String, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Note with the caller's permission", body = NoteView),
        (status = 304, description = "Not modified"),
        (status = 403, description = "Private note", body = ApiError),
        (status = 404, description = "Missing or expired", body = ApiError),
    ),
)]
pub async fn get_note(
    State(state): State<AppState>,
    user: MaybeUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(id): PathId,
) -> ApiResult<Response> {
    let view = state.notes.get_by_id(id, user.user_id()).await?;

    let policy = if user.0.is_none() && view.note.visibility == Visibility::Public {
        state
            .negotiator
            .public_until(view.note.expires_at, state.clock.now())
    } else {
        CachePolicy::Private
    };
    let meta = meta(&state, request_id);
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::OK, view, meta, policy))
}

/// POST /notes - Create a note (anonymous notes expire)
#[utoipa::path(
    post,
    path = "/notes",
    tag = "Notes",
    request_body = NewNote,
    responses(
        (status = 201, description = "Note created", body = NoteView),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 409, description = "Slug already in use", body = ApiError),
    ),
)]
pub async fn create_note(
    State(state): State<AppState>,
    user: MaybeUser,
    request_id: RequestId,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewNote>,
) -> ApiResult<Response> {
    let view = state.notes.create(input, user.user_id()).await?;
    let meta = meta(&state, request_id);
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::CREATED, view, meta, CachePolicy::NoStore))
}

/// PUT /notes/{id} - Partially update a note
#[utoipa::path(
    put,
    path = "/notes/{id}",
    tag = "Notes",
    params(("id" = String, Path, description = "Note ID")),
    request_body = NoteChanges,
    responses(
        (status = 200, description = "Updated note", body = NoteView),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Write permission required", body = ApiError),
        (status = 404, description = "Missing or expired", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_note(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(id): PathId,
    ApiJson(changes): ApiJson<NoteChanges>,
) -> ApiResult<Response> {
    if changes.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }
    let view = state
        .notes
        .update(id, changes, Some(identity.user_id))
        .await?;
    let meta = meta(&state, request_id);
    Ok(state
        .negotiator
        .respond(&headers, StatusCode::OK, view, meta, CachePolicy::NoStore))
}

/// DELETE /notes/{id} - Delete a note and its grants
#[utoipa::path(
    delete,
    path = "/notes/{id}",
    tag = "Notes",
    params(("id" = String, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Note deleted", body = Deleted),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Owner or admin required", body = ApiError),
        (status = 404, description = "Missing or already deleted", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_note(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(id): PathId,
) -> ApiResult<Response> {
    state.notes.delete(id, Some(identity.user_id)).await?;
    let meta = meta(&state, request_id);
    Ok(state.negotiator.respond(
        &headers,
        StatusCode::OK,
        Deleted { id, deleted: true },
        meta,
        CachePolicy::NoStore,
    ))
}

/// POST /notes/{id}/share - Grant a user access to a note
#[utoipa::path(
    post,
    path = "/notes/{id}/share",
    tag = "Sharing",
    params(("id" = String, Path, description = "Note ID")),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Access granted", body = AccessChange),
        (status = 400, description = "No grantee or grantee is the owner", body = ApiError),
        (status = 403, description = "Owner or admin required", body = ApiError),
        (status = 404, description = "Note or user not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn share_note(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(id): PathId,
    ApiJson(req): ApiJson<ShareRequest>,
) -> ApiResult<Response> {
    let target = match (req.user_id, req.username.as_deref()) {
        (Some(user_id), _) => user_id,
        (None, Some(username)) => state.profiles.find_by_username(username).await?.user_id,
        (None, None) => {
            return Err(ApiError::invalid_field(
                "userId",
                "either userId or username is required",
            ))
        }
    };

    let grant = state
        .resolver
        .grant_access(id, target, req.permission, identity.user_id)
        .await?;
    let meta = meta(&state, request_id);
    Ok(state.negotiator.respond(
        &headers,
        StatusCode::OK,
        AccessChange {
            note_id: grant.note_id,
            user_id: grant.user_id,
            permission: Some(grant.permission_level),
        },
        meta,
        CachePolicy::NoStore,
    ))
}

/// DELETE /notes/{id}/access/{userId} - Revoke a user's access
#[utoipa::path(
    delete,
    path = "/notes/{id}/access/{userId}",
    tag = "Sharing",
    params(
        ("id" = String, Path, description = "Note ID"),
        ("userId" = String, Path, description = "Grantee user ID"),
    ),
    responses(
        (status = 200, description = "Access revoked", body = AccessChange),
        (status = 403, description = "Owner or admin required", body = ApiError),
        (status = 404, description = "Note or grant not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_access(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathIds(note_id, user_id): PathIds,
) -> ApiResult<Response> {
    state
        .resolver
        .revoke_access(note_id, user_id, identity.user_id)
        .await?;
    let meta = meta(&state, request_id);
    Ok(state.negotiator.respond(
        &headers,
        StatusCode::OK,
        AccessChange {
            note_id,
            user_id,
            permission: None,
        },
        meta,
        CachePolicy::NoStore,
    ))
}

/// GET /notes/{id}/collaborators - Users with access grants on a note
#[utoipa::path(
    get,
    path = "/notes/{id}/collaborators",
    tag = "Sharing",
    params(("id" = String, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Collaborators", body = [quill_core::Collaborator]),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Caller cannot view the note", body = ApiError),
        (status = 404, description = "Missing or expired", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_collaborators(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    request_id: RequestId,
    headers: HeaderMap,
    PathId(id): PathId,
) -> ApiResult<Response> {
    state.notes.viewable(id, Some(identity.user_id)).await?;
    let collaborators = state.resolver.list_collaborators(id).await?;
    let meta = meta(&state, request_id);
    Ok(state.negotiator.respond(
        &headers,
        StatusCode::OK,
        collaborators,
        meta,
        CachePolicy::Private,
    ))
}
