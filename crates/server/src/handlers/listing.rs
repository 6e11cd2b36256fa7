use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path as AxumPath, Query, State};
use axum::http::HeaderMap;
use swipefeed_core::domain::model::{
    FeedTarget, Listing, ListingQuery, ListingSort, TargetKind, is_valid_name,
};
use tracing::{debug, warn};

use crate::app_state::AppState;
use crate::errors::ServerError;
use crate::models::ListingParams;
use crate::rate_limit::RateDecision;

pub const DEFAULT_LIMIT: u32 = 25;
pub const MAX_LIMIT: u32 = 100;

/// First `X-Forwarded-For` hop, else the socket peer.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn cache_key(target: &FeedTarget, query: &ListingQuery) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        target.feed_key(),
        query.sort.as_str(),
        query.limit,
        query.after.as_deref().unwrap_or(""),
        query.include_nsfw
    )
}

pub async fn get_listing(
    State(state): State<AppState>,
    AxumPath((kind, name)): AxumPath<(String, String)>,
    Query(params): Query<ListingParams>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<Listing>, ServerError> {
    let client = client_id(&headers, peer.map(|ConnectInfo(addr)| addr));
    if let RateDecision::Denied { retry_after } = state.limiter.check(&client) {
        warn!(client = %client, retry_after_secs = retry_after.as_secs(), "listing rate limited");
        return Err(ServerError::rate_limited(Some(retry_after.as_secs())));
    }

    let kind = TargetKind::from_prefix(&kind)
        .ok_or_else(|| ServerError::bad_request(format!("unknown feed kind '{kind}'")))?;
    if !is_valid_name(&name) {
        return Err(ServerError::bad_request(format!("invalid feed name '{name}'")));
    }
    let target = FeedTarget { kind, name };

    let sort = match params.sort.as_deref() {
        None | Some("") => ListingSort::default(),
        Some(raw) => ListingSort::parse(raw)
            .ok_or_else(|| ServerError::bad_request(format!("unknown sort '{raw}'")))?,
    };
    let query = ListingQuery {
        sort,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        after: params.after.clone().filter(|a| !a.is_empty()),
        include_nsfw: params.include_nsfw(),
    };

    let key = cache_key(&target, &query);
    let upstream = state.upstream.clone();
    let listing = state
        .cache
        .get_or_fetch(&key, || async move { upstream.fetch_listing(&target, &query).await })
        .await?;

    debug!(
        key = %key,
        posts = listing.posts.len(),
        cached = state.cache.len(),
        "listing served"
    );
    Ok(Json(listing))
}
