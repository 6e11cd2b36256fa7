//! Likes/seen store reached through the
//! swipefeed server's REST API.
use std::collections::HashSet;
use std::time::Duration;

use reqwest::{
  Response,
  Url
};
use tracing::{
  debug,
  warn
};

use crate::domain::model::Post;
use crate::error::StoreError;
use crate::infra::wire::{
  ErrorEnvelope,
  LikeRequest,
  SeenBatchRequest
};
use crate::ports::store::{
  LikeStore,
  SeenStore
};

#[derive(Clone)]
pub struct ApiStore {
  client:   reqwest::Client,
  base_url: Url
}

impl ApiStore {
  pub fn new(
    base_url: &str,
    user_agent: &str
  ) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .timeout(Duration::from_secs(15))
      .build()
      .map_err(|e| {
        StoreError::Unavailable(
          e.to_string()
        )
      })?;

    Self::with_client(client, base_url)
  }

  pub fn with_client(
    client: reqwest::Client,
    base_url: &str
  ) -> Result<Self, StoreError> {
    let base_url = Url::parse(
      base_url.trim_end_matches('/')
    )
    .map_err(|e| {
      StoreError::Rejected(format!(
        "invalid base url: {e}"
      ))
    })?;

    if base_url.cannot_be_a_base() {
      return Err(StoreError::Rejected(
        format!(
          "base url cannot carry paths: \
           {base_url}"
        )
      ));
    }

    Ok(Self {
      client,
      base_url
    })
  }

  /// Path segments are percent-encoded
  /// individually.
  fn endpoint(
    &self,
    segments: &[&str]
  ) -> Result<Url, StoreError> {
    let mut url = self.base_url.clone();

    {
      let mut path = url
        .path_segments_mut()
        .map_err(|_| {
          StoreError::Rejected(
            "base url cannot carry paths"
              .into()
          )
        })?;

      path.pop_if_empty();
      path.extend(segments);
    }

    Ok(url)
  }

  async fn check(
    resp: Result<Response, reqwest::Error>
  ) -> Result<Response, StoreError> {
    let resp = resp.map_err(|e| {
      StoreError::Unavailable(e.to_string())
    })?;

    let status = resp.status();

    if status.is_success() {
      return Ok(resp);
    }

    let message = resp
      .json::<ErrorEnvelope>()
      .await
      .map(|env| env.error.message)
      .unwrap_or_else(|_| {
        status.to_string()
      });

    if status.is_server_error() {
      Err(StoreError::Unavailable(message))
    } else {
      Err(StoreError::Rejected(message))
    }
  }
}

#[async_trait::async_trait]
impl LikeStore for ApiStore {
  async fn list_likes(
    &self,
    user_id: &str
  ) -> Result<Vec<Post>, StoreError> {
    let url =
      self.endpoint(&["likes", user_id])?;

    debug!(url = %url, "list likes");

    let resp = Self::check(
      self.client.get(url).send().await
    )
    .await?;

    resp
      .json::<Vec<Post>>()
      .await
      .map_err(|e| {
        StoreError::Decode(e.to_string())
      })
  }

  async fn upsert_like(
    &self,
    user_id: &str,
    post: &Post
  ) -> Result<(), StoreError> {
    let url = self.endpoint(&["likes"])?;

    let body = LikeRequest {
      user_id: user_id.to_string(),
      post:    post.clone()
    };

    Self::check(
      self
        .client
        .post(url)
        .json(&body)
        .send()
        .await
    )
    .await?;

    Ok(())
  }

  async fn delete_like(
    &self,
    user_id: &str,
    post_id: &str
  ) -> Result<(), StoreError> {
    let url = self.endpoint(&[
      "likes", user_id, post_id
    ])?;

    Self::check(
      self.client.delete(url).send().await
    )
    .await?;

    Ok(())
  }
}

#[async_trait::async_trait]
impl SeenStore for ApiStore {
  async fn list_seen_ids(
    &self,
    user_id: &str,
    feed_key: &str
  ) -> Result<HashSet<String>, StoreError>
  {
    let url = self.endpoint(&[
      "seen", user_id, feed_key
    ])?;

    let resp = Self::check(
      self.client.get(url).send().await
    )
    .await?;

    let ids = resp
      .json::<Vec<String>>()
      .await
      .map_err(|e| {
        StoreError::Decode(e.to_string())
      })?;

    Ok(ids.into_iter().collect())
  }

  async fn upsert_seen_batch(
    &self,
    user_id: &str,
    feed_key: &str,
    post_ids: &[String]
  ) -> Result<(), StoreError> {
    if post_ids.is_empty() {
      return Ok(());
    }

    let url = self.endpoint(&["seen"])?;

    let body = SeenBatchRequest {
      user_id:  user_id.to_string(),
      feed_key: feed_key.to_string(),
      post_ids: post_ids.to_vec()
    };

    Self::check(
      self
        .client
        .post(url)
        .json(&body)
        .send()
        .await
    )
    .await
    .inspect_err(|e| {
      warn!(feed_key, count = post_ids.len(), error = %e, "seen batch failed")
    })?;

    Ok(())
  }
}
