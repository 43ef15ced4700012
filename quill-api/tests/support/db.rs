use quill_api::db::{DbClient, DbConfig};

/// Client for the database named by `QUILL_DB_*`, with `sql/schema.sql`
/// already applied.
pub fn test_db_client() -> Result<DbClient, String> {
    let config = DbConfig::from_env();
    DbClient::from_config(&config).map_err(|e| format!("Failed to create database client: {}", e))
}
