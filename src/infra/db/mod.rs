//! SQLite-backed cache store.
//!
//! One file on local disk, two tables: `api_cache` for full request
//! fingerprints and `identity_cache` for single-handle identity lookups.
//! The schema is internal; nothing outside this module reads it.
//!
//! Reads run concurrently through the pool; writes serialize through
//! SQLite's own locking. Expiry on reads is lazy: an expired row is
//! reported absent but left in place for the sweeper.

mod entries;
mod identities;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use crate::domain::CacheStats;

use super::error::InfraError;

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS api_cache (
        cache_key TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        payload BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0,
        last_accessed INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS identity_cache (
        handle TEXT PRIMARY KEY,
        payload BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_api_cache_category ON api_cache(category)",
    "CREATE INDEX IF NOT EXISTS idx_api_cache_expires ON api_cache(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_identity_cache_expires ON identity_cache(expires_at)",
];

/// Embedded keyed store with expiry metadata and hit counters.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store file and ensure the schema exists.
    ///
    /// Persistence is expected but correctness never depends on it: when
    /// the existing file cannot be opened or migrated, it is discarded and
    /// the store starts empty instead of failing process startup.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let path = path.as_ref();
        match Self::try_open(path).await {
            Ok(store) => Ok(store),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "cache store unreadable; discarding and starting empty"
                );
                Self::discard_files(path);
                Self::try_open(path).await
            }
        }
    }

    async fn try_open(path: &Path) -> Result<Self, InfraError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        debug!(path = %path.display(), "cache store opened");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Remove the store file plus its WAL/SHM siblings, ignoring failures.
    fn discard_files(path: &Path) {
        let mut targets = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut sibling = OsString::from(path.as_os_str());
            sibling.push(suffix);
            targets.push(PathBuf::from(sibling));
        }
        for target in targets {
            let _ = std::fs::remove_file(target);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool. Outstanding operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Aggregate row counts and hit totals across both tables.
    pub async fn stats(&self, now: i64) -> Result<CacheStats, InfraError> {
        let api: (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(hit_count), 0)
             FROM api_cache",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let identity: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM identity_cache",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(CacheStats {
            total_entries: api.0.max(0) as u64,
            valid_entries: api.1.max(0) as u64,
            expired_entries: api.2.max(0) as u64,
            total_hits: api.3.max(0) as u64,
            identity_entries: identity.0.max(0) as u64,
            identity_hits: identity.1.max(0) as u64,
        })
    }

    /// Physically delete every expired row in both tables.
    pub async fn delete_all_expired(&self, now: i64) -> Result<u64, InfraError> {
        let api = sqlx::query("DELETE FROM api_cache WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let identity = sqlx::query("DELETE FROM identity_cache WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        Ok(api + identity)
    }

    /// Empty both tables.
    pub async fn delete_all(&self) -> Result<u64, InfraError> {
        let api = sqlx::query("DELETE FROM api_cache")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let identity = sqlx::query("DELETE FROM identity_cache")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        Ok(api + identity)
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> InfraError {
    InfraError::store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("cache.db")
    }

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(store_path(&dir)).await.expect("open");

        let stats = store.stats(0).await.expect("stats");
        assert_eq!(stats, CacheStats::default());
        assert!(store.path().exists());
        store.close().await;
    }

    #[tokio::test]
    async fn corrupt_file_recovers_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = store_path(&dir);
        std::fs::write(&path, b"this is not a sqlite database").expect("write garbage");

        let store = SqliteStore::open(&path).await.expect("open after corruption");
        let stats = store.stats(0).await.expect("stats");
        assert_eq!(stats.total_entries, 0);
        store.close().await;
    }
}
