mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, image, video};
use swipefeed_core::app::likes::LikeController;
use swipefeed_core::domain::model::{Post, Viewer};
use swipefeed_core::error::{PipelineError, StoreError};
use swipefeed_core::ports::local::LocalState;
use swipefeed_core::ports::store::LikeStore;
use tokio::sync::Notify;

/// Holds every write until released.
struct GatedLikes {
    gate: Notify,
    inner: swipefeed_core::infra::memory_store::MemoryStore,
}

#[async_trait::async_trait]
impl LikeStore for GatedLikes {
    async fn list_likes(&self, user_id: &str) -> Result<Vec<Post>, StoreError> {
        self.inner.list_likes(user_id).await
    }

    async fn upsert_like(&self, user_id: &str, post: &Post) -> Result<(), StoreError> {
        self.gate.notified().await;
        self.inner.upsert_like(user_id, post).await
    }

    async fn delete_like(&self, user_id: &str, post_id: &str) -> Result<(), StoreError> {
        self.gate.notified().await;
        self.inner.delete_like(user_id, post_id).await
    }
}

/// Upserts take longer than deletes.
#[derive(Default)]
struct SlowUpsertLikes {
    inner: swipefeed_core::infra::memory_store::MemoryStore,
}

#[async_trait::async_trait]
impl LikeStore for SlowUpsertLikes {
    async fn list_likes(&self, user_id: &str) -> Result<Vec<Post>, StoreError> {
        self.inner.list_likes(user_id).await
    }

    async fn upsert_like(&self, user_id: &str, post: &Post) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.upsert_like(user_id, post).await
    }

    async fn delete_like(&self, user_id: &str, post_id: &str) -> Result<(), StoreError> {
        self.inner.delete_like(user_id, post_id).await
    }
}

struct DownLikes;

#[async_trait::async_trait]
impl LikeStore for DownLikes {
    async fn list_likes(&self, _: &str) -> Result<Vec<Post>, StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }

    async fn upsert_like(&self, _: &str, _: &Post) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }

    async fn delete_like(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("down".into()))
    }
}

fn user() -> Viewer {
    Viewer::SignedIn("u1".to_string())
}

#[tokio::test]
async fn toggle_is_visible_before_the_store_answers() {
    let h = Harness::new();
    let store = Arc::new(GatedLikes {
        gate: Notify::new(),
        inner: Default::default(),
    });
    let mut ctx = h.context();
    ctx.likes = store.clone() as Arc<dyn LikeStore>;
    let likes = LikeController::new(&ctx);
    likes.load(user()).await.unwrap();

    let toggle = likes.toggle_like(&video("p3"));

    assert!(toggle.liked);
    assert!(likes.is_liked("p3"));
    let write = toggle.write.expect("signed-in toggle writes remotely");
    assert!(!write.is_finished());
    assert!(store.inner.list_likes("u1").await.unwrap().is_empty());

    store.gate.notify_one();
    write.await.unwrap();
    assert_eq!(store.inner.like_count("u1"), 1);
}

#[tokio::test]
async fn toggling_twice_removes_the_like_everywhere() {
    let h = Harness::new();
    let likes = LikeController::new(&h.context());
    likes.load(user()).await.unwrap();

    let on = likes.toggle_like(&image("p1"));
    on.write.unwrap().await.unwrap();
    assert_eq!(h.likes.like_count("u1"), 1);

    let off = likes.toggle_like(&image("p1"));
    assert!(!off.liked);
    assert!(!likes.is_liked("p1"));
    off.write.unwrap().await.unwrap();
    assert_eq!(h.likes.like_count("u1"), 0);
}

#[tokio::test]
async fn anonymous_likes_live_in_local_state_only() {
    let h = Harness::new();
    let likes = LikeController::new(&h.context());
    likes.load(Viewer::Anonymous).await.unwrap();

    let toggle = likes.toggle_like(&image("p1"));
    assert!(toggle.write.is_none());
    likes.toggle_like(&image("p2"));

    assert!(h.local.read("likes").is_some());
    assert_eq!(h.likes.like_count("u1"), 0);

    let reloaded = LikeController::new(&h.context());
    reloaded.load(Viewer::Anonymous).await.unwrap();
    let order: Vec<_> = reloaded.liked_posts().into_iter().map(|p| p.id).collect();
    assert_eq!(order, vec!["p2", "p1"]);
}

#[tokio::test]
async fn signing_in_replaces_the_local_set_with_the_store() {
    let h = Harness::new();
    h.likes.upsert_like("u1", &image("remote")).await.unwrap();
    let likes = LikeController::new(&h.context());
    likes.load(Viewer::Anonymous).await.unwrap();
    likes.toggle_like(&image("local"));

    assert_eq!(likes.load(user()).await.unwrap(), 1);

    assert!(likes.is_liked("remote"));
    assert!(!likes.is_liked("local"));
    assert_eq!(likes.viewer(), user());
}

#[tokio::test]
async fn failed_remote_write_keeps_optimistic_state() {
    let h = Harness::new();
    let mut ctx = h.context();
    ctx.likes = Arc::new(DownLikes);
    let likes = LikeController::new(&ctx);

    assert!(matches!(
        likes.load(user()).await,
        Err(PipelineError::StoreWriteFailed(_))
    ));
    assert_eq!(likes.viewer(), user());

    let toggle = likes.toggle_like(&image("p1"));
    toggle.write.unwrap().await.unwrap();

    assert!(likes.is_liked("p1"));
    assert!(h.local.read("likes").is_none());
}

#[tokio::test]
async fn relike_moves_post_to_the_front() {
    let h = Harness::new();
    let likes = LikeController::new(&h.context());
    likes.load(Viewer::Anonymous).await.unwrap();

    likes.toggle_like(&image("a"));
    likes.toggle_like(&image("b"));
    likes.toggle_like(&image("a"));
    likes.toggle_like(&image("a"));

    let order: Vec<_> = likes.liked_posts().into_iter().map(|p| p.id).collect();
    assert_eq!(order, vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn like_then_unlike_reaches_the_store_in_order() {
    let h = Harness::new();
    let store = Arc::new(SlowUpsertLikes::default());
    let mut ctx = h.context();
    ctx.likes = store.clone() as Arc<dyn LikeStore>;
    let likes = LikeController::new(&ctx);
    likes.load(user()).await.unwrap();

    let on = likes.toggle_like(&video("p3"));
    let off = likes.toggle_like(&video("p3"));
    assert!(on.liked);
    assert!(!off.liked);

    off.write.unwrap().await.unwrap();
    on.write.unwrap().await.unwrap();

    assert!(!likes.is_liked("p3"));
    assert!(store.inner.list_likes("u1").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn writes_for_different_posts_do_not_wait_on_each_other() {
    let h = Harness::new();
    let store = Arc::new(SlowUpsertLikes::default());
    let mut ctx = h.context();
    ctx.likes = store.clone() as Arc<dyn LikeStore>;
    let likes = LikeController::new(&ctx);
    likes.load(user()).await.unwrap();
    likes.toggle_like(&image("p1")).write.unwrap().await.unwrap();

    let slow = likes.toggle_like(&image("p2"));
    let fast = likes.toggle_like(&image("p1"));

    fast.write.unwrap().await.unwrap();
    assert_eq!(store.inner.like_count("u1"), 0);
    slow.write.unwrap().await.unwrap();
    assert_eq!(store.inner.like_count("u1"), 1);
}
