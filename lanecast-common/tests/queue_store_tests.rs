//! Queue store behaviour against a real database file
//!
//! Covers:
//! - FIFO ordering of append/pop
//! - Concurrent appends from many tasks (and two pools on one file)
//! - Index removal order and out-of-range rejection
//! - Idempotent clear

use std::sync::Arc;
use tempfile::TempDir;

use lanecast_common::db::{init_database, init_memory_database};
use lanecast_common::{Error, LaneKey, QueueStore, SqliteQueueStore, TrackEntry};

const GUILD: &str = "123456789012345678";
const CHANNEL: &str = "876543210987654321";

fn lane() -> LaneKey {
    LaneKey::new(GUILD, CHANNEL).unwrap()
}

fn track(name: &str) -> TrackEntry {
    TrackEntry::placeholder(format!("https://youtu.be/{}", name), "tester", "1")
}

fn urls(tracks: &[TrackEntry]) -> Vec<String> {
    tracks.iter().map(|t| t.url.clone()).collect()
}

async fn memory_store() -> SqliteQueueStore {
    SqliteQueueStore::new(init_memory_database().await.unwrap())
}

#[tokio::test]
async fn test_fifo_order() {
    let store = memory_store().await;
    let lane = lane();

    for name in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
        store.append(&lane, &track(name)).await.unwrap();
    }

    assert_eq!(store.pop_next(&lane).await.unwrap(), Some(track("aaaaaaaaaaa")));
    assert_eq!(store.pop_next(&lane).await.unwrap(), Some(track("bbbbbbbbbbb")));
    assert_eq!(store.pop_next(&lane).await.unwrap(), Some(track("ccccccccccc")));
    assert_eq!(store.pop_next(&lane).await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_appends_all_land() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("lanecast.db")).await.unwrap();
    let store = Arc::new(SqliteQueueStore::new(pool));
    let lane = lane();

    let mut handles = Vec::new();
    for n in 0..32 {
        let store = Arc::clone(&store);
        let lane = lane.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(&lane, &track(&format!("t{:010}", n)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.length(&lane).await.unwrap(), 32);
}

#[tokio::test]
async fn test_two_pools_share_one_queue() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lanecast.db");

    let player_side = SqliteQueueStore::new(init_database(&path).await.unwrap());
    let web_side = SqliteQueueStore::new(init_database(&path).await.unwrap());
    let lane = lane();

    web_side.append(&lane, &track("aaaaaaaaaaa")).await.unwrap();
    web_side.set_paused(&lane, true).await.unwrap();

    assert!(player_side.is_paused(&lane).await.unwrap());
    assert_eq!(
        player_side.pop_next(&lane).await.unwrap(),
        Some(track("aaaaaaaaaaa"))
    );
    assert_eq!(web_side.length(&lane).await.unwrap(), 0);
}

#[tokio::test]
async fn test_remove_at_preserves_order() {
    let store = memory_store().await;
    let lane = lane();

    for name in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
        store.append(&lane, &track(name)).await.unwrap();
    }

    store.remove_at(&lane, 1).await.unwrap();

    let remaining = store.snapshot(&lane).await.unwrap();
    assert_eq!(
        urls(&remaining),
        vec![track("aaaaaaaaaaa").url, track("ccccccccccc").url]
    );
}

#[tokio::test]
async fn test_remove_at_out_of_range_leaves_queue() {
    let store = memory_store().await;
    let lane = lane();

    store.append(&lane, &track("aaaaaaaaaaa")).await.unwrap();
    store.append(&lane, &track("bbbbbbbbbbb")).await.unwrap();

    let err = store.remove_at(&lane, 5).await.unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { index: 5, len: 2 }));
    assert_eq!(store.length(&lane).await.unwrap(), 2);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let store = memory_store().await;
    let lane = lane();

    store.append(&lane, &track("aaaaaaaaaaa")).await.unwrap();
    store
        .save_metadata(&lane, &track("aaaaaaaaaaa").url, &track("aaaaaaaaaaa"))
        .await
        .unwrap();

    store.clear(&lane).await.unwrap();
    store.clear_metadata(&lane).await.unwrap();
    store.clear(&lane).await.unwrap();
    store.clear_metadata(&lane).await.unwrap();

    assert_eq!(store.length(&lane).await.unwrap(), 0);
    assert!(store
        .lookup_metadata(&lane, &track("aaaaaaaaaaa").url)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_metadata_overwrite() {
    let store = memory_store().await;
    let lane = lane();
    let placeholder = track("aaaaaaaaaaa");

    store
        .save_metadata(&lane, &placeholder.url, &placeholder)
        .await
        .unwrap();

    let mut enriched = placeholder.clone();
    enriched.title = "Song".to_string();
    store
        .save_metadata(&lane, &placeholder.url, &enriched)
        .await
        .unwrap();

    let found = store
        .lookup_metadata(&lane, &placeholder.url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.title, "Song");
}
