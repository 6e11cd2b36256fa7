//! Typed view over [`LocalState`] for
//! viewers who are not signed in.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::domain::model::Post;
use crate::ports::local::LocalState;

const LIKES_KEY: &str = "likes";

/// Oldest ids are dropped once a feed
/// holds more than this many.
pub const MAX_LOCAL_SEEN_PER_FEED:
  usize = 5_000;

#[derive(Clone)]
pub struct AnonymousState {
  local: Arc<dyn LocalState>
}

impl AnonymousState {
  pub fn new(
    local: Arc<dyn LocalState>
  ) -> Self {
    Self {
      local
    }
  }

  fn seen_key(feed_key: &str) -> String {
    format!("seen:{feed_key}")
  }

  fn read_json<T>(&self, key: &str) -> T
  where
    T: serde::de::DeserializeOwned
      + Default
  {
    let Some(raw) = self.local.read(key)
    else {
      return T::default();
    };

    serde_json::from_str(&raw)
      .unwrap_or_else(|e| {
        warn!(key, error = %e, "discarding unreadable local state");
        T::default()
      })
  }

  fn write_json<T: serde::Serialize>(
    &self,
    key: &str,
    value: &T
  ) {
    match serde_json::to_string(value) {
      | Ok(body) => {
        self.local.write(key, &body)
      }
      | Err(e) => {
        warn!(key, error = %e, "local state encode failed")
      }
    }
  }

  pub fn seen_ids(
    &self,
    feed_key: &str
  ) -> HashSet<String> {
    self
      .read_json::<Vec<String>>(
        &Self::seen_key(feed_key)
      )
      .into_iter()
      .collect()
  }

  /// Appends ids not already stored,
  /// oldest first.
  pub fn add_seen(
    &self,
    feed_key: &str,
    post_ids: &[String]
  ) {
    let key = Self::seen_key(feed_key);

    let mut ids: Vec<String> =
      self.read_json(&key);

    let mut present: HashSet<String> =
      ids.iter().cloned().collect();

    let before = ids.len();

    for id in post_ids {
      if present.insert(id.clone()) {
        ids.push(id.clone());
      }
    }

    if ids.len() == before {
      return;
    }

    if ids.len() > MAX_LOCAL_SEEN_PER_FEED
    {
      let excess = ids.len()
        - MAX_LOCAL_SEEN_PER_FEED;
      ids.drain(..excess);
    }

    self.write_json(&key, &ids);
  }

  /// Newest first.
  pub fn likes(&self) -> Vec<Post> {
    self.read_json(LIKES_KEY)
  }

  pub fn save_likes(
    &self,
    posts: &[Post]
  ) {
    self.write_json(LIKES_KEY, &posts);
  }
}
