//! SQLite access for the durable response cache

use crate::error::CacheError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if needed) the cache database and ensure its schema
pub async fn init_cache_pool(db_path: &Path) -> Result<SqlitePool, CacheError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!(url = %db_url, "Connecting to cache database");

    let options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the `response_cache` table if it does not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<(), CacheError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS response_cache (
            fingerprint TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Cache tables initialized (response_cache)");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_file_and_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sub").join("cache.sqlite");

        let pool = init_cache_pool(&path).await.unwrap();
        assert!(path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        // Idempotent
        init_tables(&pool).await.unwrap();
    }
}
