//! Identity middleware.
//!
//! With an `Authorization` header the bearer token must verify, otherwise
//! the request is rejected with 401. Without the header the request
//! proceeds anonymously; routes that need a caller use `RequireUser`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{bearer_token, IdentityVerifier};

pub async fn identity_middleware(
    State(verifier): State<Arc<dyn IdentityVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(raw) = request.headers().get(header::AUTHORIZATION) else {
        return next.run(request).await;
    };

    let verified = match raw.to_str() {
        Ok(value) => match bearer_token(value) {
            Ok(token) => verifier.verify(token).await,
            Err(e) => Err(e),
        },
        Err(_) => Err(crate::error::ApiError::unauthorized(
            "Authorization header is not valid text",
        )),
    };

    match verified {
        Ok(identity) => {
            tracing::debug!(user_id = %identity.user_id, "Caller authenticated");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            e.into_response()
        }
    }
}
