//! Reqwest client for the public Reddit JSON listings. Children are resolved
//! into [`Post`]s once here so clients never see raw media fields.
use std::time::Duration;

use reqwest::{StatusCode, header};
use serde_json::Value;
use swipefeed_core::domain::media::normalize_post;
use swipefeed_core::domain::model::{FeedTarget, Listing, ListingQuery, Post, TargetKind};
use swipefeed_core::error::SourceError;
use swipefeed_core::ports::content::ContentSource;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;

pub struct RedditUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl RedditUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(120))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn listing_request(&self, target: &FeedTarget, query: &ListingQuery) -> reqwest::RequestBuilder {
        let (url, sort_param) = match target.kind {
            TargetKind::Subreddit => (
                format!("{}/r/{}/{}.json", self.base_url, target.name, query.sort.as_str()),
                None,
            ),
            TargetKind::User => (
                format!("{}/user/{}/submitted.json", self.base_url, target.name),
                Some(query.sort.as_str()),
            ),
        };

        let mut params: Vec<(&str, String)> = vec![
            ("limit", query.limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(sort) = sort_param {
            params.push(("sort", sort.to_string()));
        }
        if let Some(after) = &query.after {
            params.push(("after", after.clone()));
        }
        self.client.get(url).query(&params)
    }

    fn classify_error(e: &reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Unavailable(format!("timeout: {e}"))
        } else if e.is_connect() {
            SourceError::Unavailable(format!("connect: {e}"))
        } else if e.is_decode() {
            SourceError::Malformed(e.to_string())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }
}

fn retry_after_secs(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Converts a Reddit `Listing` document into posts plus the next cursor.
///
/// Children without a usable id are skipped. NSFW posts are dropped unless
/// `include_nsfw` is set.
pub fn parse_listing(body: &Value, include_nsfw: bool) -> Result<Listing, SourceError> {
    let data = body
        .get("data")
        .ok_or_else(|| SourceError::Malformed("listing has no data".into()))?;
    let children = data
        .get("children")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("listing has no children".into()))?;

    let mut posts: Vec<Post> = Vec::with_capacity(children.len());
    let mut skipped = 0usize;
    for child in children {
        match child.get("data").and_then(normalize_post) {
            Some(post) if post.nsfw && !include_nsfw => {}
            Some(post) => posts.push(post),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "skipped malformed listing children");
    }

    let after = data
        .get("after")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    Ok(Listing { posts, after })
}

#[async_trait::async_trait]
impl ContentSource for RedditUpstream {
    async fn fetch_listing(
        &self,
        target: &FeedTarget,
        query: &ListingQuery,
    ) -> Result<Listing, SourceError> {
        let resp = self
            .listing_request(target, query)
            .send()
            .await
            .map_err(|e| Self::classify_error(&e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after_secs(resp.headers());
            warn!(feed = %target, ?retry_after_secs, "upstream rate limited");
            return Err(SourceError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(target.to_string()));
        }
        if !status.is_success() {
            warn!(feed = %target, status = status.as_u16(), "upstream error status");
            return Err(SourceError::Unavailable(format!("upstream status {status}")));
        }

        let body: Value = resp.json().await.map_err(|e| Self::classify_error(&e))?;
        let listing = parse_listing(&body, query.include_nsfw)?;
        debug!(
            feed = %target,
            posts = listing.posts.len(),
            has_more = listing.after.is_some(),
            "upstream listing fetched"
        );
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn child(id: &str, nsfw: bool) -> Value {
        json!({ "kind": "t3", "data": {
            "id": id,
            "title": id,
            "over_18": nsfw,
            "url": format!("https://i.redd.it/{id}.jpg")
        }})
    }

    #[test]
    fn listing_drops_nsfw_unless_requested() {
        let body = json!({ "data": {
            "after": "t3_c",
            "children": [child("a", false), child("b", true), { "data": { "title": "no id" } }]
        }});

        let safe = parse_listing(&body, false).unwrap();
        assert_eq!(safe.posts.len(), 1);
        assert_eq!(safe.after.as_deref(), Some("t3_c"));

        let all = parse_listing(&body, true).unwrap();
        assert_eq!(all.posts.len(), 2);
    }

    #[test]
    fn null_after_ends_the_listing() {
        let body = json!({ "data": { "after": null, "children": [] } });
        assert_eq!(parse_listing(&body, false).unwrap().after, None);
    }

    #[test]
    fn unexpected_shape_is_malformed() {
        let err = parse_listing(&json!({ "error": 500 }), false).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
        let err = parse_listing(&json!({ "data": { "children": {} } }), false).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }
}
