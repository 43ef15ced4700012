//! Quill Test Utilities
//!
//! Shared test infrastructure for the Quill workspace:
//! - Proptest generators for the domain types
//! - Fixtures for common notes
//! - [`app::TestApp`], the full router over in-memory backends and a manual
//!   clock

pub use quill_core::{
    GrantLevel, ManualClock, NewNote, Note, NoteId, PermissionLevel, Timestamp, UserId,
    Visibility,
};
pub use quill_storage::{InMemoryKvStore, InMemoryNoteRepository};

use chrono::Utc;
use uuid::Uuid;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Quill domain types.

    use super::*;
    use proptest::prelude::*;
    use quill_core::{ListNotesQuery, SortBy, SortOrder};

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    pub fn arb_visibility() -> impl Strategy<Value = Visibility> {
        prop_oneof![
            Just(Visibility::Private),
            Just(Visibility::Unlisted),
            Just(Visibility::Public),
        ]
    }

    pub fn arb_grant_level() -> impl Strategy<Value = GrantLevel> {
        prop_oneof![
            Just(GrantLevel::Read),
            Just(GrantLevel::Write),
            Just(GrantLevel::Admin),
        ]
    }

    pub fn arb_permission_level() -> impl Strategy<Value = PermissionLevel> {
        prop_oneof![
            Just(PermissionLevel::None),
            Just(PermissionLevel::Read),
            Just(PermissionLevel::Write),
            Just(PermissionLevel::Admin),
            Just(PermissionLevel::Owner),
        ]
    }

    /// Titles that pass validation.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9 .,!?]{0,60}"
    }

    pub fn arb_new_note() -> impl Strategy<Value = NewNote> {
        (
            arb_title(),
            "[a-zA-Z0-9 .,!?#*\n]{0,500}",
            proptest::option::of(arb_visibility()),
        )
            .prop_map(|(title, content, visibility)| NewNote {
                title,
                content,
                visibility,
                slug: None,
            })
    }

    /// An owned note when `owner` is set, otherwise an anonymous one.
    pub fn arb_note(owner: Option<UserId>) -> impl Strategy<Value = Note> {
        (arb_new_note(), arb_timestamp(), 0i64..10_000).prop_map(
            move |(input, created_at, view_count)| {
                let mut note = match owner {
                    Some(owner) => Note::owned(input, owner, created_at),
                    None => Note::anonymous(input, created_at),
                };
                note.view_count = view_count;
                note
            },
        )
    }

    pub fn arb_list_query() -> impl Strategy<Value = ListNotesQuery> {
        (
            0u32..10,
            0u32..200,
            proptest::option::of("[a-z]{1,8}"),
            prop_oneof![
                Just(SortBy::CreatedAt),
                Just(SortBy::UpdatedAt),
                Just(SortBy::Title),
                Just(SortBy::ViewCount),
            ],
            prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)],
        )
            .prop_map(|(page, limit, search, sort_by, sort_order)| ListNotesQuery {
                page,
                limit,
                search,
                sort_by,
                sort_order,
                filter_by_user_id: None,
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built notes for common scenarios.

    use super::*;

    pub fn note_input(title: &str, visibility: Visibility) -> NewNote {
        NewNote {
            title: title.to_string(),
            content: format!("# {}\n\nbody", title),
            visibility: Some(visibility),
            slug: None,
        }
    }

    pub fn owned_note(owner: UserId, visibility: Visibility, now: Timestamp) -> Note {
        Note::owned(note_input("owned", visibility), owner, now)
    }

    /// An anonymous note whose expiry passed one second before `now`.
    pub fn expired_anonymous_note(now: Timestamp) -> Note {
        let mut note = Note::anonymous(note_input("expired", Visibility::Unlisted), now);
        note.expires_at = Some(now - chrono::Duration::seconds(1));
        note
    }
}

// ============================================================================
// IN-PROCESS APP
// ============================================================================

pub mod app {
    //! The full router over in-memory backends.

    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
        response::Response,
    };
    use quill_api::{
        create_api_router, generate_token, ApiConfig, AppState, AuthConfig, JwtVerifier,
    };
    use quill_core::Clock;
    use quill_storage::{KvStore, NoteRepository};
    use serde_json::Value;
    use tower::ServiceExt;

    pub const TEST_SECRET: &str = "quill-test-secret";

    /// Defaults for router tests: no edge cache and no rate limiting, so
    /// each test opts into the layer it exercises.
    pub fn test_config() -> ApiConfig {
        ApiConfig {
            edge_cache_capacity: 0,
            rate_limit_enabled: false,
            ..ApiConfig::default()
        }
    }

    pub struct TestApp {
        pub state: AppState,
        pub repo: Arc<InMemoryNoteRepository>,
        pub kv: Arc<InMemoryKvStore>,
        pub clock: Arc<ManualClock>,
        auth: AuthConfig,
    }

    impl TestApp {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: ApiConfig) -> Self {
            let clock = Arc::new(ManualClock::fixed());
            let repo = Arc::new(InMemoryNoteRepository::new());
            let kv = Arc::new(InMemoryKvStore::new(clock.clone()));
            let auth = match AuthConfig::with_secret(TEST_SECRET, clock.clone()) {
                Ok(auth) => auth,
                Err(e) => panic!("test secret rejected: {}", e),
            };
            let state = AppState::new(
                repo.clone() as Arc<dyn NoteRepository>,
                kv.clone() as Arc<dyn KvStore>,
                Arc::new(JwtVerifier::new(auth.clone())),
                clock.clone() as Arc<dyn Clock>,
                config,
            );
            Self {
                state,
                repo,
                kv,
                clock,
                auth,
            }
        }

        /// A valid bearer token for `user`.
        pub fn token(&self, user: UserId) -> String {
            match generate_token(&self.auth, user, None) {
                Ok(token) => token,
                Err(e) => panic!("failed to mint token: {}", e),
            }
        }

        pub async fn send(&self, request: Request<Body>) -> Response {
            match create_api_router(self.state.clone()).oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }

        pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
            self.send(request(Method::GET, uri, token, None)).await
        }

        pub async fn send_json(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Value,
        ) -> Response {
            self.send(request(method, uri, token, Some(body))).await
        }
    }

    impl Default for TestApp {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Build a request with an optional bearer token and JSON body.
    pub fn request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        match builder.body(body) {
            Ok(request) => request,
            Err(e) => panic!("invalid test request: {}", e),
        }
    }

    /// Read a response body as JSON. Empty bodies read as `Value::Null`.
    pub async fn body_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => panic!("failed to read body: {}", e),
        };
        if bytes.is_empty() {
            return Value::Null;
        }
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => panic!("body is not JSON: {}", e),
        }
    }
}
