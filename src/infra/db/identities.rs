//! `identity_cache` table operations.
//!
//! Same TTL/expiry contract as `api_cache`, keyed purely by the natural
//! handle so the hot "who is this identity" lookups skip key derivation.

use crate::domain::IdentityLookupEntry;
use crate::infra::error::InfraError;

use super::{SqliteStore, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    handle: String,
    payload: Vec<u8>,
    created_at: i64,
    expires_at: i64,
    hit_count: i64,
}

impl From<IdentityRow> for IdentityLookupEntry {
    fn from(row: IdentityRow) -> Self {
        IdentityLookupEntry {
            handle: row.handle,
            payload: row.payload,
            created_at: row.created_at,
            expires_at: row.expires_at,
            hit_count: row.hit_count,
        }
    }
}

impl SqliteStore {
    pub async fn get_identity(
        &self,
        handle: &str,
        now: i64,
    ) -> Result<Option<IdentityLookupEntry>, InfraError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT handle, payload, created_at, expires_at, hit_count
             FROM identity_cache
             WHERE handle = ?1 AND expires_at > ?2",
        )
        .bind(handle)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(IdentityLookupEntry::from))
    }

    pub async fn put_identity(&self, entry: &IdentityLookupEntry) -> Result<(), InfraError> {
        sqlx::query(
            "INSERT INTO identity_cache (handle, payload, created_at, expires_at, hit_count)
             VALUES (?1, ?2, ?3, ?4, 0)
             ON CONFLICT(handle) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                hit_count = 0",
        )
        .bind(&entry.handle)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub async fn increment_identity_hit(&self, handle: &str) -> Result<(), InfraError> {
        sqlx::query("UPDATE identity_cache SET hit_count = hit_count + 1 WHERE handle = ?1")
            .bind(handle)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
