//! JSON bodies shared by the swipefeed
//! server and its clients.
use serde::{
  Deserialize,
  Serialize
};

use crate::domain::model::Post;

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
  pub user_id: String,
  pub post:    Post
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SeenBatchRequest {
  pub user_id:  String,
  pub feed_key: String,
  pub post_ids: Vec<String>
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
)]
pub struct SuccessResponse {
  pub success: bool
}

impl SuccessResponse {
  pub fn ok() -> Self {
    Self {
      success: true
    }
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ErrorEnvelope {
  pub error: ErrorBody
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ErrorBody {
  pub code:    String,
  pub message: String
}

pub const CODE_RATE_LIMITED: &str =
  "rate_limited";
pub const CODE_UPSTREAM_UNAVAILABLE:
  &str = "upstream_unavailable";
pub const CODE_MALFORMED_RESPONSE:
  &str = "malformed_response";
