mod health;
mod likes;
mod listing;
mod seen;

use axum::Router;
use axum::routing::{
  delete,
  get,
  post
};

use crate::app_state::AppState;

pub fn router(
  state: AppState
) -> Router {
  Router::new()
        .route("/health", get(health::health))
        .route("/listing/:kind/:name", get(listing::get_listing))
        .route("/likes", post(likes::upsert_like))
        .route("/likes/:user_id", get(likes::list_likes))
        .route("/likes/:user_id/:post_id", delete(likes::delete_like))
        .route("/seen", post(seen::record_seen))
        .route("/seen/:user_id/:feed_key", get(seen::list_seen))
        .with_state(state)
}
