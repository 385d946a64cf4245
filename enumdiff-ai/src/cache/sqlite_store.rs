//! SQLite cache backend (`response_cache` table)

use super::{CacheEntry, CacheStore, Fingerprint};
use crate::error::CacheError;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Default bound on lock-contention retries
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Durable store shared across runs
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    /// Wrap a pool whose schema is already initialized
    /// (see [`crate::db::init_cache_pool`])
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored entries
    pub async fn count(&self) -> Result<i64, CacheError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(String, DateTime<Utc>)> =
            retry_on_lock("cache lookup", self.max_lock_wait_ms, || async {
                sqlx::query_as("SELECT payload, created_at FROM response_cache WHERE fingerprint = ?")
                    .bind(fingerprint.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(CacheError::from)
            })
            .await?;

        Ok(row.map(|(payload, created_at)| CacheEntry {
            fingerprint: fingerprint.clone(),
            payload,
            created_at,
        }))
    }

    async fn store(&self, fingerprint: &Fingerprint, payload: &str) -> Result<(), CacheError> {
        let created_at = Utc::now();
        retry_on_lock("cache store", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO response_cache (fingerprint, payload, created_at)
                VALUES (?, ?, ?)
                ON CONFLICT(fingerprint) DO UPDATE SET
                    payload = excluded.payload,
                    created_at = excluded.created_at
                "#,
            )
            .bind(fingerprint.as_str())
            .bind(payload)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(CacheError::from)
        })
        .await
    }
}
