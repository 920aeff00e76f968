//! Store-level contracts: persistence, lazy expiry, overwrite semantics,
//! the identity-lookup table, and physical reclamation by the sweeper.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use ombra::cache::EvictionSweeper;
use ombra::domain::{CacheEntry, IdentityLookupEntry};
use ombra::infra::db::SqliteStore;
use ombra::util::time::now_millis;
use ombra::{CacheFacade, Settings};

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("cache.db")
}

fn entry(key_byte: &str, category: &str, created_at: i64, ttl_ms: i64) -> CacheEntry {
    CacheEntry {
        key: ombra::cache::derive_key(
            category,
            &serde_json::Map::new(),
            &format!("caller-{key_byte}"),
        ),
        category: category.to_string(),
        payload: json!({"marker": key_byte}).to_string().into_bytes(),
        created_at,
        expires_at: created_at + ttl_ms,
        hit_count: 0,
        last_accessed: None,
    }
}

#[tokio::test]
async fn entries_survive_a_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut settings = Settings::default();
    settings.cache.db_path = db_path(&dir);
    settings.sweep.enabled = false;

    let credential = "persistent-caller";
    let params = serde_json::Map::new();

    let cache = CacheFacade::init(&settings).await.expect("init");
    cache.store("systems", &params, credential, &json!({"v": 7})).await;
    cache.close().await;

    let cache = CacheFacade::init(&settings).await.expect("reopen");
    let found = cache.lookup("systems", &params, credential).await;
    assert!(found.hit);
    assert_eq!(found.payload, Some(json!({"v": 7})));
    cache.close().await;
}

#[tokio::test]
async fn expired_rows_are_absent_but_not_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(db_path(&dir)).await.expect("open");

    let now = now_millis();
    let e = entry("a", "roles", now, 100);
    store.put(&e).await.expect("put");

    assert!(store.get(&e.key, now + 50).await.expect("get").is_some());
    assert!(store.get(&e.key, now + 100).await.expect("get").is_none());
    assert!(store.get(&e.key, now + 500).await.expect("get").is_none());

    // Lazy expiry: the row is still physically present.
    let stats = store.stats(now + 500).await.expect("stats");
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.valid_entries, 0);
    assert_eq!(stats.expired_entries, 1);

    store.close().await;
}

#[tokio::test]
async fn overwrite_resets_hit_count_and_refreshes_expiry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(db_path(&dir)).await.expect("open");

    let now = now_millis();
    let first = entry("a", "roles", now, 10_000);
    store.put(&first).await.expect("put");
    store.increment_hit(&first.key, now).await.expect("hit");
    store.increment_hit(&first.key, now).await.expect("hit");

    let before = store.get(&first.key, now).await.expect("get").expect("entry");
    assert_eq!(before.hit_count, 2);
    assert!(before.last_accessed.is_some());

    let second = CacheEntry {
        payload: json!({"marker": "fresh"}).to_string().into_bytes(),
        created_at: now + 1_000,
        expires_at: now + 1_000 + 10_000,
        ..first.clone()
    };
    store.put(&second).await.expect("overwrite");

    let after = store.get(&first.key, now + 1_000).await.expect("get").expect("entry");
    assert_eq!(after.hit_count, 0);
    assert_eq!(after.last_accessed, None);
    assert_eq!(after.created_at, now + 1_000);
    assert_eq!(after.payload, second.payload);

    let stats = store.stats(now + 1_000).await.expect("stats");
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.total_hits, 0);

    store.close().await;
}

#[tokio::test]
async fn identity_table_follows_the_same_expiry_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(db_path(&dir)).await.expect("open");

    let now = now_millis();
    let entry = IdentityLookupEntry {
        handle: "ada@example.com".to_string(),
        payload: json!({"uid": "c0ffee", "display_name": "Ada"}).to_string().into_bytes(),
        created_at: now,
        expires_at: now + 200,
        hit_count: 0,
    };
    store.put_identity(&entry).await.expect("put");

    let live = store
        .get_identity("ada@example.com", now + 100)
        .await
        .expect("get")
        .expect("live entry");
    assert_eq!(live.payload, entry.payload);

    store
        .increment_identity_hit("ada@example.com")
        .await
        .expect("hit");
    let stats = store.stats(now + 100).await.expect("stats");
    assert_eq!(stats.identity_entries, 1);
    assert_eq!(stats.identity_hits, 1);

    assert!(
        store
            .get_identity("ada@example.com", now + 200)
            .await
            .expect("get")
            .is_none()
    );

    store.close().await;
}

#[tokio::test]
async fn scenario_c_sweeper_reclaims_expired_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(db_path(&dir)).await.expect("open");

    let now = now_millis();
    store.put(&entry("a", "roles", now, 50)).await.expect("put");

    let sweeper = EvictionSweeper::spawn(store.clone(), Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(250)).await;
    sweeper.shutdown().await;

    // Physically removed, not merely logically expired.
    let stats = store.stats(now_millis()).await.expect("stats");
    assert_eq!(stats.total_entries, 0);

    store.close().await;
}

#[tokio::test]
async fn delete_all_expired_spares_live_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(db_path(&dir)).await.expect("open");

    let now = now_millis();
    store.put(&entry("a", "roles", now, 100)).await.expect("put");
    store.put(&entry("b", "roles", now, 60_000)).await.expect("put");
    store
        .put_identity(&IdentityLookupEntry {
            handle: "stale@example.com".to_string(),
            payload: b"{}".to_vec(),
            created_at: now,
            expires_at: now + 100,
            hit_count: 0,
        })
        .await
        .expect("put identity");

    let removed = store.delete_all_expired(now + 1_000).await.expect("sweep");
    assert_eq!(removed, 2);

    let stats = store.stats(now + 1_000).await.expect("stats");
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.identity_entries, 0);

    store.close().await;
}
