//! Quill Core - Entity Types
//!
//! Pure data structures shared by every other crate: notes, access grants,
//! permission levels, profiles and list queries. This crate performs no I/O.

pub mod clock;
pub mod error;
pub mod permission;
pub mod query;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{QuillError, QuillResult};
pub use permission::{GrantLevel, PermissionLevel};
pub use query::{ListNotesQuery, NotePage, Pagination, SortBy, SortOrder};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Note identifier. UUIDv7 so ids sort by creation time.
pub type NoteId = Uuid;

/// User identifier as issued by the identity provider.
pub type UserId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 entity id (timestamp-sortable).
pub fn new_entity_id() -> Uuid {
    Uuid::now_v7()
}

/// Lifetime of a note created without an authenticated owner.
pub const ANONYMOUS_NOTE_LIFETIME_DAYS: i64 = 7;

/// Expiry timestamp for an anonymous note created at `now`.
pub fn anonymous_expiry(now: Timestamp) -> Timestamp {
    now + Duration::days(ANONYMOUS_NOTE_LIFETIME_DAYS)
}

// ============================================================================
// ENUMS
// ============================================================================

/// Note-level flag controlling default listability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only the owner and explicit grantees can read it.
    #[default]
    Private,
    /// Readable by anyone holding the id, never listed.
    Unlisted,
    /// Listed and readable by everyone.
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
            Visibility::Public => "public",
        }
    }

    /// Whether a caller without any grant may read a note with this visibility.
    pub fn is_link_readable(&self) -> bool {
        !matches!(self, Visibility::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            "public" => Ok(Visibility::Public),
            other => Err(QuillError::validation(
                "visibility",
                format!("unknown visibility '{}'", other),
            )),
        }
    }
}

/// Whether a note belongs to a user account or was created anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum OwnershipType {
    User,
    Anonymous,
}

impl OwnershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipType::User => "user",
            OwnershipType::Anonymous => "anonymous",
        }
    }
}

impl FromStr for OwnershipType {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(OwnershipType::User),
            "anonymous" => Ok(OwnershipType::Anonymous),
            other => Err(QuillError::internal(format!(
                "unknown ownership type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// NOTE
// ============================================================================

/// A markdown document.
///
/// Anonymous notes always carry `expires_at`; owned notes may be permanent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub visibility: Visibility,
    pub ownership_type: OwnershipType,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub owner_id: Option<UserId>,
    pub slug: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub expires_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub view_count: i64,
}

impl Note {
    /// Build an anonymous note. It is never linked to an owner and expires
    /// after [`ANONYMOUS_NOTE_LIFETIME_DAYS`].
    pub fn anonymous(input: NewNote, now: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            title: input.title,
            content: input.content,
            visibility: input.visibility.unwrap_or(Visibility::Unlisted),
            ownership_type: OwnershipType::Anonymous,
            owner_id: None,
            slug: None,
            expires_at: Some(anonymous_expiry(now)),
            created_at: now,
            updated_at: now,
            view_count: 0,
        }
    }

    /// Build a permanent note owned by `owner_id`.
    pub fn owned(input: NewNote, owner_id: UserId, now: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            title: input.title,
            content: input.content,
            visibility: input.visibility.unwrap_or_default(),
            ownership_type: OwnershipType::User,
            owner_id: Some(owner_id),
            slug: input.slug,
            expires_at: None,
            created_at: now,
            updated_at: now,
            view_count: 0,
        }
    }

    /// Whether the note is logically gone at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == Some(user_id)
    }

    pub fn is_anonymous(&self) -> bool {
        self.ownership_type == OwnershipType::Anonymous
    }

    /// Apply a partial update and bump `updated_at`.
    pub fn apply(&mut self, changes: &NoteChanges, now: Timestamp) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(content) = &changes.content {
            self.content = content.clone();
        }
        if let Some(visibility) = changes.visibility {
            self.visibility = visibility;
        }
        if let Some(slug) = &changes.slug {
            self.slug = Some(slug.clone());
        }
        self.updated_at = now;
    }
}

/// Input for creating a note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Partial update for a note. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NoteChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl NoteChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.visibility.is_none()
            && self.slug.is_none()
    }
}

/// A note enriched with the caller's effective permission on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    #[serde(flatten)]
    pub note: Note,
    pub permission: PermissionLevel,
}

// ============================================================================
// ACCESS GRANTS
// ============================================================================

/// Explicit per-user access to a note. The owner never has a grant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub note_id: NoteId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub permission_level: GrantLevel,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub granted_by: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// A grant joined with the grantee's display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub permission_level: GrantLevel,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub granted_by: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub granted_at: Timestamp,
}

// ============================================================================
// PROFILES
// ============================================================================

/// Public profile of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// Upsert payload for the caller's own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Profile {
    /// A fresh profile for `user_id` with the given changes applied.
    pub fn new(user_id: UserId, changes: &ProfileChanges, now: Timestamp) -> Self {
        let mut profile = Self {
            user_id,
            username: None,
            display_name: None,
            avatar_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        };
        profile.apply(changes, now);
        profile
    }

    pub fn apply(&mut self, changes: &ProfileChanges, now: Timestamp) {
        if let Some(username) = &changes.username {
            self.username = Some(username.clone());
        }
        if let Some(display_name) = &changes.display_name {
            self.display_name = Some(display_name.clone());
        }
        if let Some(avatar_url) = &changes.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(bio) = &changes.bio {
            self.bio = Some(bio.clone());
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewNote {
        NewNote {
            title: "Groceries".to_string(),
            content: "- milk".to_string(),
            visibility: None,
            slug: Some("groceries".to_string()),
        }
    }

    #[test]
    fn test_anonymous_note_always_expires() {
        let now = Utc::now();
        let note = Note::anonymous(input(), now);
        assert!(note.is_anonymous());
        assert_eq!(note.owner_id, None);
        assert_eq!(note.slug, None);
        assert_eq!(note.expires_at, Some(now + Duration::days(7)));
        assert_eq!(note.visibility, Visibility::Unlisted);
    }

    #[test]
    fn test_owned_note_is_permanent() {
        let now = Utc::now();
        let owner = Uuid::now_v7();
        let note = Note::owned(input(), owner, now);
        assert!(note.is_owned_by(owner));
        assert_eq!(note.expires_at, None);
        assert!(!note.is_expired_at(now + Duration::days(3650)));
        assert_eq!(note.visibility, Visibility::Private);
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let note = Note::anonymous(input(), now);
        let expires_at = note.expires_at.unwrap_or(now);
        assert!(!note.is_expired_at(expires_at - Duration::seconds(1)));
        assert!(note.is_expired_at(expires_at));
    }

    #[test]
    fn test_apply_changes_bumps_updated_at() {
        let now = Utc::now();
        let mut note = Note::owned(input(), Uuid::now_v7(), now);
        let later = now + Duration::minutes(5);
        note.apply(
            &NoteChanges {
                title: Some("Errands".to_string()),
                ..Default::default()
            },
            later,
        );
        assert_eq!(note.title, "Errands");
        assert_eq!(note.content, "- milk");
        assert_eq!(note.updated_at, later);
    }

    #[test]
    fn test_visibility_parsing() {
        assert_eq!("public".parse::<Visibility>().ok(), Some(Visibility::Public));
        assert!("secret".parse::<Visibility>().is_err());
        assert!(!Visibility::Private.is_link_readable());
        assert!(Visibility::Unlisted.is_link_readable());
    }

    #[test]
    fn test_note_view_flattens() -> Result<(), serde_json::Error> {
        let note = Note::owned(input(), Uuid::now_v7(), Utc::now());
        let view = NoteView {
            note,
            permission: PermissionLevel::Owner,
        };
        let json = serde_json::to_value(&view)?;
        assert_eq!(json["permission"], "owner");
        assert_eq!(json["ownershipType"], "user");
        assert!(json.get("note").is_none());
        Ok(())
    }
}
