//! Cache entry records.
//!
//! Caller identity is folded into `CacheKey` at derivation time, so
//! isolation between callers is a property of the key itself rather than a
//! runtime filter on reads.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::util::time::millis_between;

/// Fixed-length digest identifying one `(category, params, caller)` triple.
///
/// Always a 64-character lowercase hex string (SHA-256). Log lines print
/// only a short prefix so parameter material never round-trips through a
/// key that ends up in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn prefix(&self) -> &str {
        &self.0[..self.0.len().min(16)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached upstream response.
///
/// Timestamps are unix milliseconds. An entry is logically absent once
/// `now >= expires_at`, whether or not the row still exists on disk.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub category: String,
    pub payload: Vec<u8>,
    pub created_at: i64,
    pub expires_at: i64,
    pub hit_count: i64,
    pub last_accessed: Option<i64>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self, now: i64) -> Duration {
        millis_between(self.created_at, now)
    }
}

/// A resolved identity record cached under its natural handle.
///
/// Narrower than [`CacheEntry`]: "who is this identity" lookups are
/// disproportionately frequent and always single-field exact matches, so
/// they get their own table keyed by handle instead of a request digest.
#[derive(Debug, Clone)]
pub struct IdentityLookupEntry {
    pub handle: String,
    pub payload: Vec<u8>,
    pub created_at: i64,
    pub expires_at: i64,
    pub hit_count: i64,
}

impl IdentityLookupEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn age(&self, now: i64) -> Duration {
        millis_between(self.created_at, now)
    }
}

/// Aggregate row counts and hit totals from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub valid_entries: u64,
    pub expired_entries: u64,
    pub total_hits: u64,
    pub identity_entries: u64,
    pub identity_hits: u64,
}

/// Payload-free listing row for operator inspection.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub category: String,
    pub expired: bool,
    pub created_at: i64,
    pub expires_at: i64,
    pub age_secs: f64,
    pub ttl_remaining_secs: f64,
    pub hit_count: i64,
    pub last_accessed: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(created_at: i64, expires_at: i64) -> CacheEntry {
        CacheEntry {
            key: CacheKey::from_digest("ab".repeat(32)),
            category: "identities".to_string(),
            payload: b"{}".to_vec(),
            created_at,
            expires_at,
            hit_count: 0,
            last_accessed: None,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let e = entry(0, 1_000);
        assert!(!e.is_expired(999));
        assert!(e.is_expired(1_000));
        assert!(e.is_expired(1_001));
    }

    #[test]
    fn age_tracks_created_at() {
        let e = entry(1_000, 5_000);
        assert_eq!(e.age(3_500), Duration::from_millis(2_500));
    }

    #[test]
    fn key_prefix_is_bounded() {
        let key = CacheKey::from_digest("ab".repeat(32));
        assert_eq!(key.prefix().len(), 16);
        assert_eq!(key.as_str().len(), 64);
    }
}
