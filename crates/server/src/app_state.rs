use std::sync::Arc;
use std::time::Duration;

use swipefeed_core::domain::model::Listing;
use swipefeed_core::ports::content::ContentSource;

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::db::SqlStore;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: SqlStore,
    pub upstream: Arc<dyn ContentSource>,
    pub cache: Arc<ResponseCache<Listing>>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &ServerConfig, store: SqlStore, upstream: Arc<dyn ContentSource>) -> Self {
        Self {
            store,
            upstream,
            cache: Arc::new(ResponseCache::new(
                Duration::from_secs(config.cache.ttl_seconds),
                config.cache.capacity,
            )),
            limiter: Arc::new(RateLimiter::new(
                Duration::from_secs(config.rate_limit.window_seconds),
                config.rate_limit.max_requests,
            )),
        }
    }
}
