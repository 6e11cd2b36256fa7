//! Reqwest-backed client for the
//! server's listing endpoint; maps
//! statuses and error codes into
//! [`SourceError`] kinds the pipeline
//! understands.
use std::time::Duration;

use reqwest::{
  StatusCode,
  header
};
use tracing::{
  debug,
  warn
};

use crate::domain::model::{
  FeedTarget,
  Listing,
  ListingQuery
};
use crate::error::SourceError;
use crate::infra::wire::{
  CODE_MALFORMED_RESPONSE,
  CODE_RATE_LIMITED,
  ErrorEnvelope
};
use crate::ports::content::ContentSource;

pub struct HttpContentSource {
  client:   reqwest::Client,
  base_url: String
}

impl HttpContentSource {
  pub fn new(
    base_url: impl Into<String>,
    user_agent: &str
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .pool_idle_timeout(
        Duration::from_secs(120)
      )
      .timeout(Duration::from_secs(30))
      .build()?;

    Ok(Self::with_client(client, base_url))
  }

  pub fn with_client(
    client: reqwest::Client,
    base_url: impl Into<String>
  ) -> Self {
    Self {
      client,
      base_url: base_url
        .into()
        .trim_end_matches('/')
        .to_string()
    }
  }

  fn listing_url(
    &self,
    target: &FeedTarget
  ) -> String {
    format!(
      "{}/listing/{}/{}",
      self.base_url,
      target.kind.prefix(),
      target.name
    )
  }

  fn classify_error(
    e: &reqwest::Error
  ) -> SourceError {
    if e.is_timeout() {
      SourceError::Unavailable(format!(
        "timeout: {e}"
      ))
    } else if e.is_connect() {
      SourceError::Unavailable(format!(
        "connect: {e}"
      ))
    } else if e.is_decode() {
      SourceError::Malformed(e.to_string())
    } else {
      SourceError::Unavailable(
        e.to_string()
      )
    }
  }

  fn parse_retry_after(
    headers: &header::HeaderMap
  ) -> Option<u64> {
    headers
      .get(header::RETRY_AFTER)?
      .to_str()
      .ok()?
      .trim()
      .parse()
      .ok()
  }
}

#[async_trait::async_trait]
impl ContentSource for HttpContentSource {
  async fn fetch_listing(
    &self,
    target: &FeedTarget,
    query: &ListingQuery
  ) -> Result<Listing, SourceError> {
    let url = self.listing_url(target);

    let mut params: Vec<(&str, String)> = vec![
      ("sort", query.sort.as_str().to_string()),
      ("limit", query.limit.to_string())
    ];

    if let Some(after) = &query.after {
      params.push(("after", after.clone()));
    }

    if query.include_nsfw {
      params.push((
        "include_nsfw",
        "1".to_string()
      ));
    }

    debug!(url = %url, after = ?query.after, "listing request start");

    let resp = self
      .client
      .get(&url)
      .query(&params)
      .send()
      .await
      .map_err(|e| {
        warn!(url = %url, error = %e, "listing request failed");
        Self::classify_error(&e)
      })?;

    let status = resp.status();

    if status.is_success() {
      return resp
        .json::<Listing>()
        .await
        .map_err(|e| {
          warn!(url = %url, error = %e, "listing body did not decode");
          SourceError::Malformed(
            e.to_string()
          )
        });
    }

    let retry_after =
      Self::parse_retry_after(resp.headers());

    let code = resp
      .json::<ErrorEnvelope>()
      .await
      .map(|env| env.error.code)
      .unwrap_or_default();

    match status {
      | StatusCode::TOO_MANY_REQUESTS => {
        Err(SourceError::RateLimited {
          retry_after_secs: retry_after
        })
      }
      | StatusCode::NOT_FOUND => {
        Err(SourceError::NotFound(
          target.to_string()
        ))
      }
      | _ if code == CODE_RATE_LIMITED => {
        Err(SourceError::RateLimited {
          retry_after_secs: retry_after
        })
      }
      | _ if code
        == CODE_MALFORMED_RESPONSE =>
      {
        Err(SourceError::Malformed(
          format!(
            "upstream shape ({status})"
          )
        ))
      }
      | _ => {
        Err(SourceError::Unavailable(
          format!("status {status}")
        ))
      }
    }
  }
}
