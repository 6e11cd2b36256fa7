mod common;

use std::sync::Arc;

use common::image;
use swipefeed_core::app::anonymous::{AnonymousState, MAX_LOCAL_SEEN_PER_FEED};
use swipefeed_core::infra::local_file::{FileLocalState, MemoryLocalState};
use swipefeed_core::infra::memory_store::MemoryStore;
use swipefeed_core::ports::local::LocalState;
use swipefeed_core::ports::store::{LikeStore, SeenStore};

#[tokio::test]
async fn like_upsert_is_idempotent_and_keeps_latest_snapshot() {
    let store = MemoryStore::new();
    let mut post = image("p1");
    store.upsert_like("u1", &post).await.unwrap();
    post.title = "edited".into();
    store.upsert_like("u1", &post).await.unwrap();

    let likes = store.list_likes("u1").await.unwrap();
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0].title, "edited");
}

#[tokio::test]
async fn likes_are_listed_newest_first_per_user() {
    let store = MemoryStore::new();
    store.upsert_like("u1", &image("a")).await.unwrap();
    store.upsert_like("u1", &image("b")).await.unwrap();
    store.upsert_like("u2", &image("c")).await.unwrap();

    let ids: Vec<_> = store
        .list_likes("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn deleting_an_absent_like_is_a_no_op() {
    let store = MemoryStore::new();
    store.delete_like("u1", "nope").await.unwrap();
    assert_eq!(store.like_count("u1"), 0);
}

#[tokio::test]
async fn seen_batches_merge_without_duplicates() {
    let store = MemoryStore::new();
    store
        .upsert_seen_batch("u1", "r:memes", &["a".into(), "b".into()])
        .await
        .unwrap();
    let first = store.seen_records("u1", "r:memes")[0].created_at;
    store
        .upsert_seen_batch("u1", "r:memes", &["a".into(), "c".into()])
        .await
        .unwrap();

    let records = store.seen_records("u1", "r:memes");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].created_at, first);
    assert!(store.list_seen_ids("u1", "r:pics").await.unwrap().is_empty());
}

#[test]
fn anonymous_seen_ids_are_capped_per_feed() {
    let local = Arc::new(MemoryLocalState::new());
    let state = AnonymousState::new(local);
    let ids: Vec<String> = (0..MAX_LOCAL_SEEN_PER_FEED + 10)
        .map(|i| format!("p{i}"))
        .collect();
    state.add_seen("r:memes", &ids);

    let seen = state.seen_ids("r:memes");
    assert_eq!(seen.len(), MAX_LOCAL_SEEN_PER_FEED);
    assert!(!seen.contains("p0"));
    assert!(seen.contains(&format!("p{}", MAX_LOCAL_SEEN_PER_FEED + 9)));
    assert!(state.seen_ids("r:pics").is_empty());
}

#[test]
fn unreadable_local_value_is_treated_as_empty() {
    let local = Arc::new(MemoryLocalState::new());
    local.write("likes", "{not json");
    let state = AnonymousState::new(local);
    assert!(state.likes().is_empty());
}

#[test]
fn file_local_state_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("swipefeed-local-{}", std::process::id()));
    let path = dir.join("state.json");
    let _ = std::fs::remove_file(&path);

    let first = FileLocalState::open(&path);
    first.write("seen:r:memes", "[\"a\"]");
    first.write("scratch", "1");
    first.remove("scratch");

    let reopened = FileLocalState::open(&path);
    assert_eq!(reopened.read("seen:r:memes").as_deref(), Some("[\"a\"]"));
    assert!(reopened.read("scratch").is_none());

    let _ = std::fs::remove_dir_all(&dir);
}
