//! List query and pagination types.

use serde::{Deserialize, Serialize};

use crate::{Note, UserId};

/// Default page size for note listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum page size for note listings.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[serde(alias = "created_at")]
    CreatedAt,
    #[default]
    #[serde(alias = "updated_at")]
    UpdatedAt,
    Title,
    #[serde(alias = "view_count")]
    ViewCount,
}

impl SortBy {
    /// Column name in the notes table.
    pub fn column(&self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
            SortBy::Title => "title",
            SortBy::ViewCount => "view_count",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Parameters of a note listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ListNotesQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    /// Restrict the listing to notes owned by this user.
    #[serde(default, alias = "userId")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub filter_by_user_id: Option<UserId>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ListNotesQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            search: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            filter_by_user_id: None,
        }
    }
}

impl ListNotesQuery {
    /// Clamp page and limit into range and drop blank search terms.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Whether this listing uses the default ordering and no search term.
    pub fn is_plain(&self) -> bool {
        self.search.is_none()
            && self.sort_by == SortBy::default()
            && self.sort_order == SortOrder::default()
    }
}

/// One page of notes plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub total: u64,
}

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            has_more: u64::from(page) * u64::from(limit) < total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        let query = ListNotesQuery {
            page: 0,
            limit: 5000,
            search: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, MAX_PAGE_SIZE);
        assert_eq!(query.search, None);
        assert!(query.is_plain());
    }

    #[test]
    fn test_offset() {
        let query = ListNotesQuery {
            page: 3,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn test_has_more() {
        assert!(Pagination::new(1, 20, 21).has_more);
        assert!(!Pagination::new(1, 20, 20).has_more);
        assert!(!Pagination::new(2, 20, 35).has_more);
        assert!(!Pagination::new(1, 20, 0).has_more);
    }

    #[test]
    fn test_query_deserializes_with_defaults() -> Result<(), serde_json::Error> {
        let query: ListNotesQuery = serde_json::from_str(r#"{"sortBy":"title","sortOrder":"asc"}"#)?;
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort_by, SortBy::Title);
        assert_eq!(query.sort_order, SortOrder::Asc);
        assert!(!query.is_plain());
        Ok(())
    }
}
