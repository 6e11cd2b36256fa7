use thiserror::Error;

/// Failures reported by a
/// [`crate::ports::content::ContentSource`].
#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum SourceError {
  #[error(
    "content source unavailable: {0}"
  )]
  Unavailable(String),
  #[error(
    "content source rate limited \
     (retry after \
     {retry_after_secs:?}s)"
  )]
  RateLimited {
    retry_after_secs: Option<u64>
  },
  #[error(
    "malformed content source \
     response: {0}"
  )]
  Malformed(String),
  #[error("feed not found: {0}")]
  NotFound(String)
}

/// Failures reported by the likes/seen
/// persistence layer.
#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum StoreError {
  #[error("store unavailable: {0}")]
  Unavailable(String),
  #[error(
    "store rejected request: {0}"
  )]
  Rejected(String),
  #[error(
    "store returned an unexpected \
     response: {0}"
  )]
  Decode(String)
}

/// Failures surfaced to the
/// presentation layer. None of them
/// clear loaded posts. Throttling is not
/// an error here; it is reported as
/// `FeedPhase::Throttled`.
#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum PipelineError {
  #[error(
    "upstream unavailable: {0}"
  )]
  UpstreamUnavailable(String),
  #[error("store write failed: {0}")]
  StoreWriteFailed(String),
  #[error("malformed response: {0}")]
  MalformedResponse(String)
}

impl From<StoreError> for PipelineError {
  fn from(err: StoreError) -> Self {
    PipelineError::StoreWriteFailed(
      err.to_string()
    )
  }
}
