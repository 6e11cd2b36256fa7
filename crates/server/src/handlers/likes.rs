use axum::Json;
use axum::extract::{Path as AxumPath, State};
use swipefeed_core::domain::model::Post;
use swipefeed_core::infra::wire::{LikeRequest, SuccessResponse};
use swipefeed_core::ports::store::LikeStore;

use crate::app_state::AppState;
use crate::errors::{ServerError, map_store_error};

pub(super) fn require(value: &str, field: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(ServerError::bad_request(format!("{field} required")));
    }
    Ok(())
}

pub async fn list_likes(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<String>,
) -> Result<Json<Vec<Post>>, ServerError> {
    require(&user_id, "userId")?;
    let posts = state
        .store
        .list_likes(&user_id)
        .await
        .map_err(map_store_error)?;
    Ok(Json(posts))
}

pub async fn upsert_like(
    State(state): State<AppState>,
    Json(payload): Json<LikeRequest>,
) -> Result<Json<SuccessResponse>, ServerError> {
    require(&payload.user_id, "userId")?;
    require(&payload.post.id, "post.id")?;
    state
        .store
        .upsert_like(&payload.user_id, &payload.post)
        .await
        .map_err(map_store_error)?;
    tracing::debug!(user_id = %payload.user_id, post_id = %payload.post.id, "like stored");
    Ok(Json(SuccessResponse::ok()))
}

pub async fn delete_like(
    State(state): State<AppState>,
    AxumPath((user_id, post_id)): AxumPath<(String, String)>,
) -> Result<Json<SuccessResponse>, ServerError> {
    require(&user_id, "userId")?;
    require(&post_id, "postId")?;
    state
        .store
        .delete_like(&user_id, &post_id)
        .await
        .map_err(map_store_error)?;
    Ok(Json(SuccessResponse::ok()))
}
