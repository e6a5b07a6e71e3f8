//! Store tests against an in-memory database.

use super::db::now_utc;
use super::{DownloadRecord, DownloadStatus, Store};

fn sample(url: &str) -> DownloadRecord {
    DownloadRecord::new(url, "/tmp/idm-test", "sample.bin")
}

#[tokio::test]
async fn insert_get_roundtrip_is_field_identical() {
    let store = Store::open_memory().await.unwrap();
    let mut rec = sample("https://example.com/sample.bin");
    rec.total_size = 4096;

    let id = store.insert(&rec).await.unwrap();
    assert!(id > 0);
    rec.id = id;

    let loaded = store.get(id).await.unwrap().expect("row exists");
    assert_eq!(loaded, rec);

    // Persist the loaded copy again; a second load must be identical.
    store.update(&loaded).await.unwrap();
    let loaded2 = store.get(id).await.unwrap().expect("row exists");
    assert_eq!(loaded2, loaded);
}

#[tokio::test]
async fn get_unknown_id_is_none() {
    let store = Store::open_memory().await.unwrap();
    assert!(store.get(999).await.unwrap().is_none());
}

#[tokio::test]
async fn update_overwrites_mutable_fields() {
    let store = Store::open_memory().await.unwrap();
    let mut rec = sample("https://example.com/a");
    rec.total_size = 1000;
    rec.id = store.insert(&rec).await.unwrap();

    rec.status = DownloadStatus::Downloading;
    rec.downloaded = 512;
    rec.speed = 256;
    rec.progress = 51.2;
    rec.started_at = Some(now_utc());
    store.update(&rec).await.unwrap();

    let loaded = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, DownloadStatus::Downloading);
    assert_eq!(loaded.downloaded, 512);
    assert_eq!(loaded.speed, 256);
    assert_eq!(loaded.started_at, rec.started_at);
    assert!(loaded.completed_at.is_none());

    rec.status = DownloadStatus::Failed;
    rec.error = Some("connection reset".to_string());
    store.update(&rec).await.unwrap();
    let loaded = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, DownloadStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn list_is_newest_first() {
    let store = Store::open_memory().await.unwrap();
    let mut a = sample("https://a.example/one");
    let mut b = sample("https://b.example/two");
    // Same created_at second is possible; id breaks the tie.
    a.id = store.insert(&a).await.unwrap();
    b.id = store.insert(&b).await.unwrap();

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, b.id);
    assert_eq!(all[1].id, a.id);
}

#[tokio::test]
async fn delete_removes_row() {
    let store = Store::open_memory().await.unwrap();
    let rec = sample("https://example.com/x");
    let id = store.insert(&rec).await.unwrap();
    store.delete(id).await.unwrap();
    assert!(store.get(id).await.unwrap().is_none());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_interrupted_pauses_stranded_rows() {
    let store = Store::open_memory().await.unwrap();
    let mut rec = sample("https://example.com/y");
    rec.id = store.insert(&rec).await.unwrap();
    rec.status = DownloadStatus::Downloading;
    rec.speed = 1024;
    store.update(&rec).await.unwrap();

    let n = store.reset_interrupted().await.unwrap();
    assert_eq!(n, 1);
    let loaded = store.get(rec.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, DownloadStatus::Paused);
    assert_eq!(loaded.speed, 0);

    // Terminal rows are untouched.
    assert_eq!(store.reset_interrupted().await.unwrap(), 0);
}
