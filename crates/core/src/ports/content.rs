//! Paginated post listings per feed
//! target.
use crate::domain::model::{
  FeedTarget,
  Listing,
  ListingQuery
};
use crate::error::SourceError;

#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
  async fn fetch_listing(
    &self,
    target: &FeedTarget,
    query: &ListingQuery
  ) -> Result<Listing, SourceError>;
}
