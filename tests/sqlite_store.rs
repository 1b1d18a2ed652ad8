use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use evidence_harness::db;
use evidence_harness::migrate::run_migrations;
use evidence_harness::sqlite_store::SqliteStore;
use evidence_harness_core::chunk::chunk_key;
use evidence_harness_core::models::CacheChunk;
use evidence_harness_core::store::VectorStore;

async fn open(tmp: &TempDir, collection: &str) -> SqliteStore {
    let pool = db::connect(&tmp.path().join("data/cache.sqlite")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool, collection)
}

fn chunk(url: &str, index: usize, vector: Vec<f32>, text: &str) -> CacheChunk {
    let start = index * 100;
    let end = start + text.len();
    CacheChunk {
        id: chunk_key(url, index, start, end),
        vector,
        url: url.to_string(),
        title: "Title".to_string(),
        site: "example.com".to_string(),
        chunk_index: index,
        start_offset: start,
        end_offset: end,
        text: text.to_string(),
        fetched_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_ensure_collection_checks_dims() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, "evidence").await;

    store.ensure_collection(3).await.unwrap();
    store.ensure_collection(3).await.unwrap();
    let err = store.ensure_collection(4).await.unwrap_err();
    assert!(err.to_string().contains("3 dims"));
}

#[tokio::test]
async fn test_upsert_overwrites_same_id() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, "evidence").await;
    store.ensure_collection(2).await.unwrap();

    let url = "https://example.com/a";
    store
        .upsert(&[chunk(url, 0, vec![1.0, 0.0], "first")])
        .await
        .unwrap();
    let mut second = chunk(url, 0, vec![0.0, 1.0], "first");
    second.title = "Updated".to_string();
    store.upsert(&[second]).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let found = store.find_by_url(url, 10).await.unwrap();
    assert_eq!(found[0].title, "Updated");
    assert_eq!(found[0].vector, vec![0.0, 1.0]);
    assert_eq!(found[0].fetched_at, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
}

#[tokio::test]
async fn test_upsert_rejects_wrong_dims() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, "evidence").await;
    store.ensure_collection(2).await.unwrap();

    let err = store
        .upsert(&[
            chunk("https://a.test/", 0, vec![1.0, 0.0], "fits"),
            chunk("https://b.test/", 0, vec![1.0, 0.0, 0.0], "too wide"),
        ])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expects 2"), "{}", err);
    // the whole batch is refused
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_find_by_url_orders_by_chunk_index() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, "evidence").await;
    store.ensure_collection(2).await.unwrap();

    let url = "https://example.com/long";
    store
        .upsert(&[
            chunk(url, 2, vec![1.0, 0.0], "third"),
            chunk(url, 0, vec![1.0, 0.0], "first"),
            chunk(url, 1, vec![1.0, 0.0], "second"),
            chunk("https://example.com/other", 0, vec![1.0, 0.0], "other"),
        ])
        .await
        .unwrap();

    let found = store.find_by_url(url, 10).await.unwrap();
    let texts: Vec<&str> = found.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert_eq!(store.find_by_url(url, 1).await.unwrap().len(), 1);
    assert!(store.find_by_url("https://nowhere.test/", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_ranks_by_cosine() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp, "evidence").await;
    store.ensure_collection(2).await.unwrap();

    store
        .upsert(&[
            chunk("https://a.test/", 0, vec![1.0, 0.0], "east"),
            chunk("https://b.test/", 0, vec![0.7, 0.7], "northeast"),
            chunk("https://c.test/", 0, vec![0.0, 1.0], "north"),
        ])
        .await
        .unwrap();

    let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.text, "east");
    assert_eq!(hits[1].chunk.text, "northeast");
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let a = open(&tmp, "alpha").await;
    let b = SqliteStore::new(a.pool().clone(), "beta");
    a.ensure_collection(2).await.unwrap();
    b.ensure_collection(2).await.unwrap();

    a.upsert(&[chunk("https://a.test/", 0, vec![1.0, 0.0], "only in alpha")])
        .await
        .unwrap();

    assert_eq!(a.count().await.unwrap(), 1);
    assert_eq!(b.count().await.unwrap(), 0);
    assert!(b.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
}
