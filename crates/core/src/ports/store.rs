//! Data-access contract for likes and
//! seen ids.
//!
//! Implementations enforce the
//! uniqueness keys themselves: one like
//! per `(user, post)` and one seen
//! record per `(user, feed_key, post)`.
//! Callers may race (two tabs of the
//! same user) without coordinating.
use std::collections::HashSet;

use crate::domain::model::Post;
use crate::error::StoreError;

#[async_trait::async_trait]
pub trait LikeStore: Send + Sync {
  /// Snapshots, newest like first.
  async fn list_likes(
    &self,
    user_id: &str
  ) -> Result<Vec<Post>, StoreError>;

  /// Insert or replace keyed by
  /// `(user_id, post.id)`; the latest
  /// snapshot wins.
  async fn upsert_like(
    &self,
    user_id: &str,
    post: &Post
  ) -> Result<(), StoreError>;

  /// Absent likes are not an error.
  async fn delete_like(
    &self,
    user_id: &str,
    post_id: &str
  ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait SeenStore: Send + Sync {
  async fn list_seen_ids(
    &self,
    user_id: &str,
    feed_key: &str
  ) -> Result<HashSet<String>, StoreError>;

  /// Insert-if-absent per id. A failing
  /// id must not prevent the others.
  async fn upsert_seen_batch(
    &self,
    user_id: &str,
    feed_key: &str,
    post_ids: &[String]
  ) -> Result<(), StoreError>;
}
