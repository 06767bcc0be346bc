//! Integration tests for the SQLite backends against an in-memory
//! database.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use grange_core::Clock;
use grange_core::event::SerializedEvent;
use grange_core::event_store::EventStore;
use grange_core::read_store::ReadStore;
use grange_core::stream::{StreamId, Version};
use grange_sqlite::{SqliteEventStore, SqliteReadStore, connect, migrate};
use grange_testing::test_clock;
use std::sync::Arc;

async fn pool() -> sqlx::SqlitePool {
    let pool = connect("sqlite::memory:").await.expect("failed to connect");
    migrate(&pool).await.expect("migration failed");
    pool
}

fn wire(event_type: &str, data: serde_json::Value) -> SerializedEvent {
    SerializedEvent {
        event_type: event_type.to_string(),
        data,
    }
}

#[tokio::test]
async fn append_load_round_trip() {
    let store = SqliteEventStore::with_clock(pool().await, Arc::new(test_clock()));
    let id = StreamId::new("farm-1");

    let appended = store
        .append(
            id.clone(),
            Version::INITIAL,
            vec![
                wire("FarmCreated", serde_json::json!({ "Name": "Acme Farm" })),
                wire("FarmNameChanged", serde_json::json!({ "Name": "Acme Fields" })),
            ],
        )
        .await
        .expect("append failed");
    assert_eq!(appended.len(), 2);
    assert_eq!(appended[1].version, Version::new(2));

    let history = store.load(id).await.expect("load failed");
    // What append handed back is exactly what a later load reads.
    assert_eq!(history, appended);
    assert_eq!(history[0].event_type, "FarmCreated");
    assert_eq!(history[0].version, Version::new(1));
    assert_eq!(history[0].created_at, test_clock().now());
    assert_eq!(history[1].data, serde_json::json!({ "Name": "Acme Fields" }));
}

#[tokio::test]
async fn versions_continue_from_base() {
    let store = SqliteEventStore::new(pool().await);
    let id = StreamId::new("area-1");

    let first = store
        .append(
            id.clone(),
            Version::INITIAL,
            vec![wire("AreaCreated", serde_json::json!({ "Name": "bed 1" }))],
        )
        .await
        .expect("append failed");
    let base = first.last().expect("no record appended").version;
    let rest = store
        .append(
            id.clone(),
            base,
            vec![
                wire("AreaNameChanged", serde_json::json!({ "Name": "bed 2" })),
                wire("AreaNameChanged", serde_json::json!({ "Name": "bed 3" })),
            ],
        )
        .await
        .expect("append failed");
    assert_eq!(rest.last().expect("no record appended").version, Version::new(3));

    let versions: Vec<u64> = store
        .load(id)
        .await
        .expect("load failed")
        .iter()
        .map(|r| r.version.value())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn unknown_stream_is_empty() {
    let store = SqliteEventStore::new(pool().await);
    let history = store
        .load(StreamId::new("farm-missing"))
        .await
        .expect("load failed");
    assert!(history.is_empty());
}

#[tokio::test]
async fn duplicate_versions_are_accepted() {
    // No optimistic-concurrency check: both appends from version 0 land.
    let store = SqliteEventStore::new(pool().await);
    let id = StreamId::new("farm-1");

    for _ in 0..2 {
        store
            .append(
                id.clone(),
                Version::INITIAL,
                vec![wire("FarmCreated", serde_json::json!({ "Name": "Acme Farm" }))],
            )
            .await
            .expect("append failed");
    }

    let versions: Vec<u64> = store
        .load(id)
        .await
        .expect("load failed")
        .iter()
        .map(|r| r.version.value())
        .collect();
    assert_eq!(versions, vec![1, 1]);
}

#[tokio::test]
async fn read_store_upsert_and_lookup() {
    let store = SqliteReadStore::new(pool().await);
    let id = StreamId::new("farm-1");

    store
        .upsert("Farm", id.clone(), serde_json::json!({ "Name": "Old" }))
        .await
        .expect("upsert failed");
    store
        .upsert("Farm", id.clone(), serde_json::json!({ "Name": "New" }))
        .await
        .expect("upsert failed");

    let row = store
        .find_by_id("Farm", id.clone())
        .await
        .expect("find failed");
    assert_eq!(row, Some(serde_json::json!({ "Name": "New" })));

    let missing = store
        .find_by_id("Farm", StreamId::new("farm-missing"))
        .await
        .expect("find failed");
    assert_eq!(missing, None);

    assert_eq!(store.find_all("Farm").await.expect("scan failed").len(), 1);
}
