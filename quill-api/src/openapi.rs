//! OpenAPI document for the Quill API, generated with utoipa from the route
//! annotations and the schema derives on the core types.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode, ErrorEnvelope, ErrorMeta};
use crate::routes::{health, notes, profiles};
use crate::types::{AccessChange, Deleted, ResponseMeta, ShareRequest};

use quill_core::{
    Collaborator, GrantLevel, ListNotesQuery, NewNote, Note, NoteChanges, NoteView,
    OwnershipType, Pagination, PermissionLevel, Profile, ProfileChanges, SortBy, SortOrder,
    Visibility,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quill API",
        version = "0.2.0",
        description = "Notes service with sharing, response caching and rate limiting",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Notes", description = "Note CRUD and listing"),
        (name = "Sharing", description = "Access grants and collaborators"),
        (name = "Profiles", description = "User profiles"),
        (name = "Health", description = "Liveness and readiness")
    ),
    paths(
        notes::list_notes,
        notes::get_note,
        notes::create_note,
        notes::update_note,
        notes::delete_note,
        notes::share_note,
        notes::revoke_access,
        notes::list_collaborators,
        profiles::get_profile,
        profiles::update_my_profile,
        health::ping,
        health::health,
    ),
    components(
        schemas(
            ApiError, ErrorCode, ErrorEnvelope, ErrorMeta,
            ResponseMeta, ShareRequest, AccessChange, Deleted,

            Note, NoteView, NewNote, NoteChanges, Visibility, OwnershipType,
            PermissionLevel, GrantLevel, Collaborator, Profile, ProfileChanges,
            ListNotesQuery, SortBy, SortOrder, Pagination,

            health::HealthResponse, health::HealthStatus, health::HealthDetails,
            health::ComponentHealth, health::CacheHealth
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("HS256 JWT whose subject is the user id"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() -> Result<(), String> {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Quill API");

        let components = openapi
            .components
            .as_ref()
            .ok_or_else(|| "OpenAPI components missing".to_string())?;
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("NoteView"));

        let paths = &openapi.paths.paths;
        assert!(paths.contains_key("/notes"));
        assert!(paths.contains_key("/notes/{id}/share"));
        assert!(paths.contains_key("/profiles/me"));
        Ok(())
    }

    #[test]
    fn test_id_and_time_fields_are_formatted_strings() -> Result<(), String> {
        let doc = serde_json::to_value(ApiDoc::openapi()).map_err(|e| e.to_string())?;
        let schemas = &doc["components"]["schemas"];

        let note = &schemas["Note"]["properties"];
        assert_eq!(note["id"]["type"], "string");
        assert_eq!(note["id"]["format"], "uuid");
        assert_eq!(note["createdAt"]["format"], "date-time");

        let grant = &schemas["AccessChange"]["properties"];
        assert_eq!(grant["noteId"]["format"], "uuid");
        assert_eq!(schemas["ResponseMeta"]["properties"]["timestamp"]["format"], "date-time");
        Ok(())
    }

    #[test]
    fn test_openapi_json_serialization() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| format!("Failed to serialize OpenAPI: {}", e))?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        assert!(json.contains("Quill API"));
        Ok(())
    }
}
