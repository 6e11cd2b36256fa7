//! Process-local likes/seen store.
//! Backs tests and offline sessions.
use std::collections::{
  HashMap,
  HashSet
};
use std::sync::{
  Mutex,
  MutexGuard,
  PoisonError
};

use chrono::{
  DateTime,
  Utc
};

use crate::domain::model::Post;
use crate::error::StoreError;
use crate::ports::store::{
  LikeStore,
  SeenStore
};

#[derive(Debug, Clone)]
struct LikeRecord {
  post:       Post,
  created_at: DateTime<Utc>,
  seq:        u64
}

#[derive(Debug, Clone)]
pub struct SeenRecord {
  pub user_id:    String,
  pub feed_key:   String,
  pub post_id:    String,
  pub created_at: DateTime<Utc>
}

#[derive(Default)]
struct Inner {
  likes: HashMap<(String, String), LikeRecord>,
  seen:
    HashMap<(String, String, String), SeenRecord>,
  seq:   u64
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self
      .inner
      .lock()
      .unwrap_or_else(
        PoisonError::into_inner
      )
  }

  pub fn like_count(
    &self,
    user_id: &str
  ) -> usize {
    self
      .lock()
      .likes
      .keys()
      .filter(|(user, _)| user == user_id)
      .count()
  }

  pub fn seen_records(
    &self,
    user_id: &str,
    feed_key: &str
  ) -> Vec<SeenRecord> {
    let mut rows: Vec<SeenRecord> = self
      .lock()
      .seen
      .values()
      .filter(|r| {
        r.user_id == user_id
          && r.feed_key == feed_key
      })
      .cloned()
      .collect();

    rows.sort_by(|a, b| {
      a.post_id.cmp(&b.post_id)
    });
    rows
  }
}

#[async_trait::async_trait]
impl LikeStore for MemoryStore {
  async fn list_likes(
    &self,
    user_id: &str
  ) -> Result<Vec<Post>, StoreError> {
    let guard = self.lock();

    let mut rows: Vec<&LikeRecord> = guard
      .likes
      .iter()
      .filter(|((user, _), _)| {
        user == user_id
      })
      .map(|(_, record)| record)
      .collect();

    rows.sort_by(|a, b| {
      b.created_at
        .cmp(&a.created_at)
        .then(b.seq.cmp(&a.seq))
    });

    Ok(rows
      .into_iter()
      .map(|r| r.post.clone())
      .collect())
  }

  async fn upsert_like(
    &self,
    user_id: &str,
    post: &Post
  ) -> Result<(), StoreError> {
    let mut guard = self.lock();
    guard.seq += 1;
    let seq = guard.seq;

    guard.likes.insert(
      (user_id.to_string(), post.id.clone()),
      LikeRecord {
        post: post.clone(),
        created_at: Utc::now(),
        seq
      }
    );

    Ok(())
  }

  async fn delete_like(
    &self,
    user_id: &str,
    post_id: &str
  ) -> Result<(), StoreError> {
    self.lock().likes.remove(&(
      user_id.to_string(),
      post_id.to_string()
    ));

    Ok(())
  }
}

#[async_trait::async_trait]
impl SeenStore for MemoryStore {
  async fn list_seen_ids(
    &self,
    user_id: &str,
    feed_key: &str
  ) -> Result<HashSet<String>, StoreError>
  {
    Ok(self
      .lock()
      .seen
      .values()
      .filter(|r| {
        r.user_id == user_id
          && r.feed_key == feed_key
      })
      .map(|r| r.post_id.clone())
      .collect())
  }

  async fn upsert_seen_batch(
    &self,
    user_id: &str,
    feed_key: &str,
    post_ids: &[String]
  ) -> Result<(), StoreError> {
    let mut guard = self.lock();
    let now = Utc::now();

    for post_id in post_ids {
      guard
        .seen
        .entry((
          user_id.to_string(),
          feed_key.to_string(),
          post_id.clone()
        ))
        .or_insert_with(|| SeenRecord {
          user_id:    user_id.to_string(),
          feed_key:   feed_key.to_string(),
          post_id:    post_id.clone(),
          created_at: now
        });
    }

    Ok(())
  }
}
