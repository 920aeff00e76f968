//! `api_cache` table operations.

use crate::domain::{CacheEntry, CacheKey, EntrySummary};
use crate::util::time::millis_between;

use super::{SqliteStore, map_sqlx_error};
use crate::infra::error::InfraError;

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    cache_key: String,
    category: String,
    payload: Vec<u8>,
    created_at: i64,
    expires_at: i64,
    hit_count: i64,
    last_accessed: Option<i64>,
}

impl From<EntryRow> for CacheEntry {
    fn from(row: EntryRow) -> Self {
        CacheEntry {
            key: CacheKey::from_digest(row.cache_key),
            category: row.category,
            payload: row.payload,
            created_at: row.created_at,
            expires_at: row.expires_at,
            hit_count: row.hit_count,
            last_accessed: row.last_accessed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    category: String,
    created_at: i64,
    expires_at: i64,
    hit_count: i64,
    last_accessed: Option<i64>,
}

impl SqliteStore {
    /// Fetch a live entry. Expired rows are reported absent, not deleted.
    pub async fn get(&self, key: &CacheKey, now: i64) -> Result<Option<CacheEntry>, InfraError> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT cache_key, category, payload, created_at, expires_at, hit_count, last_accessed
             FROM api_cache
             WHERE cache_key = ?1 AND expires_at > ?2",
        )
        .bind(key.as_str())
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CacheEntry::from))
    }

    /// Upsert. An overwrite replaces the payload and timestamps and resets
    /// the hit counter: the entry now holds a new answer.
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), InfraError> {
        sqlx::query(
            "INSERT INTO api_cache
                (cache_key, category, payload, created_at, expires_at, hit_count, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)
             ON CONFLICT(cache_key) DO UPDATE SET
                category = excluded.category,
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                hit_count = 0,
                last_accessed = NULL",
        )
        .bind(entry.key.as_str())
        .bind(&entry.category)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Best-effort hit accounting. Losing an increment to a concurrent
    /// expiry or overwrite is accepted; callers never fail a read on it.
    pub async fn increment_hit(&self, key: &CacheKey, now: i64) -> Result<(), InfraError> {
        sqlx::query(
            "UPDATE api_cache
             SET hit_count = hit_count + 1, last_accessed = ?2
             WHERE cache_key = ?1",
        )
        .bind(key.as_str())
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Delete every entry of one category.
    pub async fn delete_by_category(&self, category: &str) -> Result<u64, InfraError> {
        let deleted = sqlx::query("DELETE FROM api_cache WHERE category = ?1")
            .bind(category)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        Ok(deleted)
    }

    /// Delete one exact entry by key.
    pub async fn delete_entry(&self, key: &CacheKey) -> Result<u64, InfraError> {
        let deleted = sqlx::query("DELETE FROM api_cache WHERE cache_key = ?1")
            .bind(key.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        Ok(deleted)
    }

    /// Categories ranked by accumulated hits.
    pub async fn top_categories(&self, limit: u32) -> Result<Vec<(String, u64)>, InfraError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COALESCE(SUM(hit_count), 0) AS hits
             FROM api_cache
             GROUP BY category
             ORDER BY hits DESC
             LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(category, hits)| (category, hits.max(0) as u64))
            .collect())
    }

    /// Payload-free listing of entries, newest first, for inspection.
    pub async fn list_entries(
        &self,
        limit: u32,
        include_expired: bool,
        now: i64,
    ) -> Result<Vec<EntrySummary>, InfraError> {
        let query = if include_expired {
            sqlx::query_as::<_, SummaryRow>(
                "SELECT category, created_at, expires_at, hit_count, last_accessed
                 FROM api_cache
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )
            .bind(i64::from(limit))
        } else {
            sqlx::query_as::<_, SummaryRow>(
                "SELECT category, created_at, expires_at, hit_count, last_accessed
                 FROM api_cache
                 WHERE expires_at > ?2
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )
            .bind(i64::from(limit))
            .bind(now)
        };

        let rows = query.fetch_all(self.pool()).await.map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| EntrySummary {
                expired: now >= row.expires_at,
                age_secs: millis_between(row.created_at, now).as_secs_f64(),
                ttl_remaining_secs: millis_between(now, row.expires_at).as_secs_f64(),
                category: row.category,
                created_at: row.created_at,
                expires_at: row.expires_at,
                hit_count: row.hit_count,
                last_accessed: row.last_accessed,
            })
            .collect())
    }
}
