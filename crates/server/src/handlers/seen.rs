use axum::Json;
use axum::extract::{Path as AxumPath, State};
use swipefeed_core::infra::wire::{SeenBatchRequest, SuccessResponse};
use swipefeed_core::ports::store::SeenStore;
use tracing::debug;

use super::likes::require;
use crate::app_state::AppState;
use crate::errors::{ServerError, map_store_error};

pub const MAX_SEEN_BATCH: usize = 500;

pub async fn list_seen(
    State(state): State<AppState>,
    AxumPath((user_id, feed_key)): AxumPath<(String, String)>,
) -> Result<Json<Vec<String>>, ServerError> {
    require(&user_id, "userId")?;
    require(&feed_key, "feedKey")?;
    let mut ids: Vec<String> = state
        .store
        .list_seen_ids(&user_id, &feed_key)
        .await
        .map_err(map_store_error)?
        .into_iter()
        .collect();
    ids.sort();
    Ok(Json(ids))
}

pub async fn record_seen(
    State(state): State<AppState>,
    Json(payload): Json<SeenBatchRequest>,
) -> Result<Json<SuccessResponse>, ServerError> {
    require(&payload.user_id, "userId")?;
    require(&payload.feed_key, "feedKey")?;
    if payload.post_ids.is_empty() {
        return Ok(Json(SuccessResponse::ok()));
    }
    if payload.post_ids.len() > MAX_SEEN_BATCH {
        return Err(ServerError::bad_request(format!(
            "at most {MAX_SEEN_BATCH} postIds per batch"
        )));
    }
    if payload.post_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ServerError::bad_request("postIds must not be empty"));
    }

    state
        .store
        .upsert_seen_batch(&payload.user_id, &payload.feed_key, &payload.post_ids)
        .await
        .map_err(map_store_error)?;
    debug!(
        user_id = %payload.user_id,
        feed_key = %payload.feed_key,
        count = payload.post_ids.len(),
        "seen batch stored"
    );
    Ok(Json(SuccessResponse::ok()))
}
