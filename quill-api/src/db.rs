//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres and the
//! [`NoteRepository`] implementation over the tables in `sql/schema.sql`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use quill_core::{
    AccessGrant, Collaborator, GrantLevel, ListNotesQuery, Note, NoteChanges, NoteId, NotePage,
    OwnershipType, Profile, QuillError, QuillResult, SortBy, Timestamp, UserId, Visibility,
};
use quill_storage::{NoteFilter, NoteRepository};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::error::{map_pg_error, ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait and connect timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "quill".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read `QUILL_DB_HOST`, `QUILL_DB_PORT`, `QUILL_DB_NAME`, `QUILL_DB_USER`,
    /// `QUILL_DB_PASSWORD`, `QUILL_DB_POOL_SIZE` and `QUILL_DB_TIMEOUT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("QUILL_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("QUILL_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("QUILL_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("QUILL_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("QUILL_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("QUILL_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("QUILL_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: self.max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: None,
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

const NOTE_COLUMNS: &str = "n.id, n.title, n.content, n.visibility, n.ownership_type, \
     n.owner_id, n.slug, n.expires_at, n.created_at, n.updated_at, n.view_count";

const PROFILE_COLUMNS: &str =
    "user_id, username, display_name, avatar_url, bio, created_at, updated_at";

/// Postgres-backed [`NoteRepository`].
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> QuillResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

fn map_pool_error(err: PoolError) -> QuillError {
    tracing::error!("Connection pool error: {:?}", err);
    QuillError::database("Failed to acquire database connection")
}

fn parse_column<T: FromStr<Err = QuillError>>(row: &Row, column: &str) -> QuillResult<T> {
    let raw: String = row.try_get(column).map_err(map_pg_error)?;
    raw.parse()
}

fn note_from_row(row: &Row) -> QuillResult<Note> {
    Ok(Note {
        id: row.try_get("id").map_err(map_pg_error)?,
        title: row.try_get("title").map_err(map_pg_error)?,
        content: row.try_get("content").map_err(map_pg_error)?,
        visibility: parse_column::<Visibility>(row, "visibility")?,
        ownership_type: parse_column::<OwnershipType>(row, "ownership_type")?,
        owner_id: row.try_get("owner_id").map_err(map_pg_error)?,
        slug: row.try_get("slug").map_err(map_pg_error)?,
        expires_at: row.try_get("expires_at").map_err(map_pg_error)?,
        created_at: row.try_get("created_at").map_err(map_pg_error)?,
        updated_at: row.try_get("updated_at").map_err(map_pg_error)?,
        view_count: row.try_get("view_count").map_err(map_pg_error)?,
    })
}

fn grant_from_row(row: &Row) -> QuillResult<AccessGrant> {
    Ok(AccessGrant {
        note_id: row.try_get("note_id").map_err(map_pg_error)?,
        user_id: row.try_get("user_id").map_err(map_pg_error)?,
        permission_level: parse_column::<GrantLevel>(row, "permission_level")?,
        granted_by: row.try_get("granted_by").map_err(map_pg_error)?,
        created_at: row.try_get("created_at").map_err(map_pg_error)?,
    })
}

fn profile_from_row(row: &Row) -> QuillResult<Profile> {
    Ok(Profile {
        user_id: row.try_get("user_id").map_err(map_pg_error)?,
        username: row.try_get("username").map_err(map_pg_error)?,
        display_name: row.try_get("display_name").map_err(map_pg_error)?,
        avatar_url: row.try_get("avatar_url").map_err(map_pg_error)?,
        bio: row.try_get("bio").map_err(map_pg_error)?,
        created_at: row.try_get("created_at").map_err(map_pg_error)?,
        updated_at: row.try_get("updated_at").map_err(map_pg_error)?,
    })
}

// ============================================================================
// LISTING SQL
// ============================================================================

/// User id bound as `$2` by the listing predicate, if the rule needs one.
fn filter_subject(filter: &NoteFilter) -> Option<UserId> {
    match *filter {
        NoteFilter::OwnedBy { owner } | NoteFilter::PublicOwnedBy { owner } => Some(owner),
        NoteFilter::VisibleTo { user } => Some(user),
        NoteFilter::PublicOnly => None,
    }
}

/// Visibility half of the listing predicate. Always parenthesized by the
/// caller so the expiry check covers every alternative.
fn visibility_sql(filter: &NoteFilter) -> &'static str {
    match filter {
        NoteFilter::OwnedBy { .. } => "n.owner_id = $2",
        NoteFilter::PublicOwnedBy { .. } => "n.owner_id = $2 AND n.visibility = 'public'",
        NoteFilter::VisibleTo { .. } => {
            "n.visibility = 'public' OR n.owner_id = $2 OR EXISTS \
             (SELECT 1 FROM note_access a WHERE a.note_id = n.id AND a.user_id = $2)"
        }
        NoteFilter::PublicOnly => "n.visibility = 'public'",
    }
}

fn order_sql(query: &ListNotesQuery) -> String {
    let column = match query.sort_by {
        SortBy::Title => "LOWER(n.title)".to_string(),
        other => format!("n.{}", other.column()),
    };
    let keyword = query.sort_order.keyword();
    format!("{} {}, n.id {}", column, keyword, keyword)
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// ============================================================================
// REPOSITORY
// ============================================================================

#[async_trait]
impl NoteRepository for DbClient {
    async fn note_get(&self, id: NoteId) -> QuillResult<Option<Note>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM notes n WHERE n.id = $1", NOTE_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await.map_err(map_pg_error)?;
        row.as_ref().map(note_from_row).transpose()
    }

    async fn note_owner(&self, id: NoteId) -> QuillResult<Option<UserId>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt("SELECT owner_id FROM notes WHERE id = $1", &[&id])
            .await
            .map_err(map_pg_error)?;
        match row {
            Some(row) => row.try_get("owner_id").map_err(map_pg_error),
            None => Ok(None),
        }
    }

    async fn note_insert(&self, note: &Note) -> QuillResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notes (id, title, content, visibility, ownership_type, owner_id, \
             slug, expires_at, created_at, updated_at, view_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &note.id,
                &note.title,
                &note.content,
                &note.visibility.as_str(),
                &note.ownership_type.as_str(),
                &note.owner_id,
                &note.slug,
                &note.expires_at,
                &note.created_at,
                &note.updated_at,
                &note.view_count,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn note_update(
        &self,
        id: NoteId,
        changes: &NoteChanges,
        now: Timestamp,
    ) -> QuillResult<Option<Note>> {
        let conn = self.get_conn().await?;
        let visibility = changes.visibility.map(|v| v.as_str());
        let sql = format!(
            "UPDATE notes n SET \
             title = COALESCE($2, n.title), \
             content = COALESCE($3, n.content), \
             visibility = COALESCE($4, n.visibility), \
             slug = COALESCE($5, n.slug), \
             updated_at = $6 \
             WHERE n.id = $1 RETURNING {}",
            NOTE_COLUMNS
        );
        let row = conn
            .query_opt(
                &sql,
                &[
                    &id,
                    &changes.title,
                    &changes.content,
                    &visibility,
                    &changes.slug,
                    &now,
                ],
            )
            .await
            .map_err(map_pg_error)?;
        row.as_ref().map(note_from_row).transpose()
    }

    async fn note_delete(&self, id: NoteId) -> QuillResult<bool> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute("DELETE FROM notes WHERE id = $1", &[&id])
            .await
            .map_err(map_pg_error)?;
        Ok(removed > 0)
    }

    async fn note_list(
        &self,
        filter: &NoteFilter,
        query: &ListNotesQuery,
        now: Timestamp,
    ) -> QuillResult<NotePage> {
        let conn = self.get_conn().await?;

        let subject = filter_subject(filter);
        let pattern = query.search.as_deref().map(like_pattern);
        let limit = i64::from(query.limit);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&now];
        let mut clauses = vec!["(n.expires_at IS NULL OR n.expires_at > $1)".to_string()];
        if let Some(subject) = subject.as_ref() {
            params.push(subject);
        }
        clauses.push(format!("({})", visibility_sql(filter)));
        if let Some(pattern) = pattern.as_ref() {
            params.push(pattern);
            let n = params.len();
            clauses.push(format!("(n.title ILIKE ${n} OR n.content ILIKE ${n})"));
        }
        let predicate = clauses.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM notes n WHERE {}", predicate);
        let total: i64 = conn
            .query_one(&count_sql, &params)
            .await
            .map_err(map_pg_error)?
            .try_get(0)
            .map_err(map_pg_error)?;

        params.push(&limit);
        params.push(&offset);
        let page_sql = format!(
            "SELECT {} FROM notes n WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            NOTE_COLUMNS,
            predicate,
            order_sql(query),
            params.len() - 1,
            params.len()
        );
        let rows = conn.query(&page_sql, &params).await.map_err(map_pg_error)?;
        let notes = rows.iter().map(note_from_row).collect::<QuillResult<Vec<_>>>()?;

        Ok(NotePage {
            notes,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn note_increment_views(&self, id: NoteId) -> QuillResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE notes SET view_count = view_count + 1 WHERE id = $1",
            &[&id],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn notes_delete_expired(&self, now: Timestamp) -> QuillResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM notes WHERE expires_at IS NOT NULL AND expires_at <= $1",
            &[&now],
        )
        .await
        .map_err(map_pg_error)
    }

    async fn grant_get(&self, note_id: NoteId, user_id: UserId) -> QuillResult<Option<AccessGrant>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT note_id, user_id, permission_level, granted_by, created_at \
                 FROM note_access WHERE note_id = $1 AND user_id = $2",
                &[&note_id, &user_id],
            )
            .await
            .map_err(map_pg_error)?;
        row.as_ref().map(grant_from_row).transpose()
    }

    async fn grant_upsert(&self, grant: &AccessGrant) -> QuillResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO note_access (note_id, user_id, permission_level, granted_by, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (note_id, user_id) DO UPDATE SET \
             permission_level = EXCLUDED.permission_level, \
             granted_by = EXCLUDED.granted_by",
            &[
                &grant.note_id,
                &grant.user_id,
                &grant.permission_level.as_str(),
                &grant.granted_by,
                &grant.created_at,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn grant_delete(&self, note_id: NoteId, user_id: UserId) -> QuillResult<bool> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM note_access WHERE note_id = $1 AND user_id = $2",
                &[&note_id, &user_id],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(removed > 0)
    }

    async fn collaborators(&self, note_id: NoteId) -> QuillResult<Vec<Collaborator>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT a.user_id, p.username, p.display_name, p.avatar_url, \
                 a.permission_level, a.granted_by, a.created_at \
                 FROM note_access a LEFT JOIN profiles p ON p.user_id = a.user_id \
                 WHERE a.note_id = $1 \
                 ORDER BY a.created_at ASC, a.user_id ASC",
                &[&note_id],
            )
            .await
            .map_err(map_pg_error)?;

        rows.iter()
            .map(|row| -> QuillResult<Collaborator> {
                Ok(Collaborator {
                    user_id: row.try_get("user_id").map_err(map_pg_error)?,
                    username: row.try_get("username").map_err(map_pg_error)?,
                    display_name: row.try_get("display_name").map_err(map_pg_error)?,
                    avatar_url: row.try_get("avatar_url").map_err(map_pg_error)?,
                    permission_level: parse_column::<GrantLevel>(row, "permission_level")?,
                    granted_by: row.try_get("granted_by").map_err(map_pg_error)?,
                    granted_at: row.try_get("created_at").map_err(map_pg_error)?,
                })
            })
            .collect()
    }

    async fn profile_get(&self, user_id: UserId) -> QuillResult<Option<Profile>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM profiles WHERE user_id = $1", PROFILE_COLUMNS);
        let row = conn.query_opt(&sql, &[&user_id]).await.map_err(map_pg_error)?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn profile_find_by_username(&self, username: &str) -> QuillResult<Option<Profile>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM profiles WHERE username = $1", PROFILE_COLUMNS);
        let row = conn.query_opt(&sql, &[&username]).await.map_err(map_pg_error)?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn profile_upsert(&self, profile: &Profile) -> QuillResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO profiles (user_id, username, display_name, avatar_url, bio, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO UPDATE SET \
             username = EXCLUDED.username, \
             display_name = EXCLUDED.display_name, \
             avatar_url = EXCLUDED.avatar_url, \
             bio = EXCLUDED.bio, \
             updated_at = EXCLUDED.updated_at",
            &[
                &profile.user_id,
                &profile.username,
                &profile.display_name,
                &profile.avatar_url,
                &profile.bio,
                &profile.created_at,
                &profile.updated_at,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn ping(&self) -> QuillResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(map_pg_error)?;
        Ok(())
    }
}
