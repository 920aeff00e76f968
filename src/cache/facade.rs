//! Cache facade: the only surface the surrounding proxy calls.
//!
//! Decides cacheability, derives keys, and fronts the store with
//! fail-open error handling: a broken store degrades every lookup to a
//! miss (forcing a fresh upstream fetch) and every write to a logged
//! no-op. Stale or cross-caller data is never the failure mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::domain::{CacheEntry, CacheStats, EntrySummary, IdentityLookupEntry};
use crate::infra::db::SqliteStore;
use crate::infra::error::InfraError;
use crate::util::time::now_millis;

use super::identity::caller_identity;
use super::keys::derive_key;
use super::sweeper::EvictionSweeper;
use super::ttl::{CachePolicy, TtlPolicy};

const METRIC_CACHE_HIT_TOTAL: &str = "ombra_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "ombra_cache_miss_total";
const METRIC_CACHE_STORE_TOTAL: &str = "ombra_cache_store_total";
const METRIC_CACHE_BYPASS_TOTAL: &str = "ombra_cache_bypass_total";
const METRIC_CACHE_INVALIDATE_TOTAL: &str = "ombra_cache_invalidate_total";

/// The category governing identity-handle lookups.
const IDENTITY_CATEGORY: &str = "identities";

const TOP_CATEGORY_LIMIT: u32 = 5;

/// Outcome of a lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub hit: bool,
    pub payload: Option<Value>,
    /// Time since the entry was stored; only present on a hit.
    pub age: Option<Duration>,
}

impl CacheLookup {
    fn miss() -> Self {
        Self {
            hit: false,
            payload: None,
            age: None,
        }
    }

    fn hit(payload: Value, age: Duration) -> Self {
        Self {
            hit: true,
            payload: Some(payload),
            age: Some(age),
        }
    }
}

/// Store aggregates plus the facade's own running counters.
///
/// The store only knows about rows it holds; miss attempts exist only
/// here, which is why the efficiency figure lives on the facade.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacadeStats {
    pub store: CacheStats,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0.0 when no cacheable traffic has arrived.
    pub hit_rate: f64,
    pub top_categories: Vec<(String, u64)>,
}

/// Per-caller response cache with TTL expiry and structural isolation.
///
/// Explicitly constructed via [`CacheFacade::init`] and passed by
/// reference; owns the background sweeper and releases it in
/// [`CacheFacade::close`].
pub struct CacheFacade {
    store: Option<SqliteStore>,
    policy: TtlPolicy,
    sweeper: Option<EvictionSweeper>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheFacade {
    /// Build the cache from settings: open the store, fix the TTL policy,
    /// and start the sweeper when configured.
    ///
    /// A disabled cache opens nothing — every lookup degrades to a miss
    /// without touching disk.
    pub async fn init(settings: &Settings) -> Result<Self, InfraError> {
        let policy = TtlPolicy::from_settings(&settings.cache);

        if !settings.cache.enabled {
            info!("cache disabled; all lookups will miss");
            return Ok(Self {
                store: None,
                policy,
                sweeper: None,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            });
        }

        let store = SqliteStore::open(&settings.cache.db_path).await?;

        let sweeper = settings.sweep.enabled.then(|| {
            EvictionSweeper::spawn(
                store.clone(),
                Duration::from_secs(settings.sweep.interval_secs),
            )
        });

        info!(
            path = %store.path().display(),
            default_ttl_secs = settings.cache.default_ttl_secs,
            sweep = sweeper.is_some(),
            "cache initialized"
        );

        Ok(Self {
            store: Some(store),
            policy,
            sweeper,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Stop the sweeper and close the store.
    pub async fn close(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
        if let Some(store) = &self.store {
            store.close().await;
        }
        debug!("cache closed");
    }

    /// Look up the cached response for a request on behalf of a caller.
    ///
    /// Non-cacheable categories return a miss without touching the store:
    /// mutation traffic must neither read stale answers nor pollute the
    /// hit/miss statistics.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn lookup(
        &self,
        category: &str,
        params: &Map<String, Value>,
        credential: &str,
    ) -> CacheLookup {
        let Some(store) = &self.store else {
            return CacheLookup::miss();
        };

        if !matches!(self.policy.policy_for(category), CachePolicy::Cache(_)) {
            counter!(METRIC_CACHE_BYPASS_TOTAL).increment(1);
            debug!(category, "lookup bypassed: category is never cached");
            return CacheLookup::miss();
        }

        let identity = caller_identity(credential);
        let key = derive_key(category, params, &identity);
        let now = now_millis();

        let entry = match store.get(&key, now).await {
            Ok(found) => found,
            Err(error) => {
                warn!(error = %error, category, "store read failed; treating as miss");
                return self.record_miss(category, &key);
            }
        };

        let Some(entry) = entry else {
            return self.record_miss(category, &key);
        };

        let payload: Value = match serde_json::from_slice(&entry.payload) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, category, key = key.prefix(), "cached payload undecodable; treating as miss");
                return self.record_miss(category, &key);
            }
        };

        // Best-effort accounting; a lost increment never fails the read.
        if let Err(error) = store.increment_hit(&key, now).await {
            warn!(error = %error, key = key.prefix(), "hit count update failed");
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
        let age = entry.age(now);
        info!(
            category,
            key = key.prefix(),
            age_secs = age.as_secs_f64(),
            "cache hit"
        );

        CacheLookup::hit(payload, age)
    }

    /// Store a freshly fetched payload.
    ///
    /// No-op for non-cacheable categories. A write failure is logged and
    /// swallowed: the caller already holds the fresh payload, and failing
    /// to cache it is never worth escalating.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn store(
        &self,
        category: &str,
        params: &Map<String, Value>,
        credential: &str,
        payload: &Value,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let ttl = match self.policy.policy_for(category) {
            CachePolicy::Cache(ttl) => ttl,
            CachePolicy::Bypass => {
                counter!(METRIC_CACHE_BYPASS_TOTAL).increment(1);
                debug!(category, "store skipped: category is never cached");
                return;
            }
        };

        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(error = %error, category, "payload not serializable; skipping cache write");
                return;
            }
        };

        let identity = caller_identity(credential);
        let now = now_millis();
        let entry = CacheEntry {
            key: derive_key(category, params, &identity),
            category: category.to_string(),
            payload: bytes,
            created_at: now,
            expires_at: now + ttl.as_millis() as i64,
            hit_count: 0,
            last_accessed: None,
        };

        match store.put(&entry).await {
            Ok(()) => {
                counter!(METRIC_CACHE_STORE_TOTAL).increment(1);
                info!(
                    category,
                    key = entry.key.prefix(),
                    ttl_secs = ttl.as_secs_f64(),
                    "cache stored"
                );
            }
            Err(error) => {
                warn!(error = %error, category, "store write failed; serving fresh without caching");
            }
        }
    }

    /// Cache a resolved identity record under its natural handle.
    pub async fn cache_identity(&self, handle: &str, payload: &Value) {
        let Some(store) = &self.store else {
            return;
        };

        let CachePolicy::Cache(ttl) = self.policy.policy_for(IDENTITY_CATEGORY) else {
            return;
        };

        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(error = %error, handle, "identity payload not serializable; skipping");
                return;
            }
        };

        let now = now_millis();
        let entry = IdentityLookupEntry {
            handle: handle.to_string(),
            payload: bytes,
            created_at: now,
            expires_at: now + ttl.as_millis() as i64,
            hit_count: 0,
        };

        match store.put_identity(&entry).await {
            Ok(()) => {
                counter!(METRIC_CACHE_STORE_TOTAL).increment(1);
                info!(handle, ttl_secs = ttl.as_secs_f64(), "identity cached");
            }
            Err(error) => {
                warn!(error = %error, handle, "identity cache write failed");
            }
        }
    }

    /// Fast single-handle identity lookup.
    pub async fn lookup_identity(&self, handle: &str) -> CacheLookup {
        let Some(store) = &self.store else {
            return CacheLookup::miss();
        };

        let now = now_millis();
        let entry = match store.get_identity(handle, now).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                info!(handle, "identity cache miss");
                return CacheLookup::miss();
            }
            Err(error) => {
                warn!(error = %error, handle, "identity read failed; treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                return CacheLookup::miss();
            }
        };

        let payload: Value = match serde_json::from_slice(&entry.payload) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, handle, "identity payload undecodable; treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                return CacheLookup::miss();
            }
        };

        if let Err(error) = store.increment_identity_hit(handle).await {
            warn!(error = %error, handle, "identity hit count update failed");
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
        let age = entry.age(now);
        info!(handle, age_secs = age.as_secs_f64(), "identity cache hit");

        CacheLookup::hit(payload, age)
    }

    /// Clear one category, or everything (both tables) with `None`.
    pub async fn invalidate(&self, category: Option<&str>) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };

        let result = match category {
            Some(category) => store.delete_by_category(category).await,
            None => store.delete_all().await,
        };

        match result {
            Ok(deleted) => {
                counter!(METRIC_CACHE_INVALIDATE_TOTAL).increment(deleted);
                info!(category = category.unwrap_or("<all>"), deleted, "cache invalidated");
                deleted
            }
            Err(error) => {
                warn!(error = %error, "invalidation failed");
                0
            }
        }
    }

    /// Remove the single entry for one exact request of one caller.
    pub async fn invalidate_entry(
        &self,
        category: &str,
        params: &Map<String, Value>,
        credential: &str,
    ) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };

        let identity = caller_identity(credential);
        let key = derive_key(category, params, &identity);

        match store.delete_entry(&key).await {
            Ok(deleted) => {
                counter!(METRIC_CACHE_INVALIDATE_TOTAL).increment(deleted);
                info!(category, key = key.prefix(), deleted, "cache entry invalidated");
                deleted
            }
            Err(error) => {
                warn!(error = %error, category, "entry invalidation failed");
                0
            }
        }
    }

    /// Aggregate statistics: store counts plus running hit/miss figures.
    pub async fn statistics(&self) -> FacadeStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let (store_stats, top_categories) = match &self.store {
            Some(store) => {
                let now = now_millis();
                let stats = store.stats(now).await.unwrap_or_else(|error| {
                    warn!(error = %error, "stats query failed; reporting empty store");
                    CacheStats::default()
                });
                let top = store.top_categories(TOP_CATEGORY_LIMIT).await.unwrap_or_default();
                (stats, top)
            }
            None => (CacheStats::default(), Vec::new()),
        };

        FacadeStats {
            store: store_stats,
            lookups: total,
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            top_categories,
        }
    }

    /// Payload-free listing of cached entries for operator inspection.
    pub async fn view_contents(&self, limit: u32, include_expired: bool) -> Vec<EntrySummary> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        match store.list_entries(limit, include_expired, now_millis()).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(error = %error, "contents listing failed");
                Vec::new()
            }
        }
    }

    fn record_miss(&self, category: &str, key: &crate::domain::CacheKey) -> CacheLookup {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
        info!(category, key = key.prefix(), "cache miss");
        CacheLookup::miss()
    }
}
