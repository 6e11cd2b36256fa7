use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::app_state::AppState;
use crate::models::HealthResponse;

/// Always 200; `store` reports whether the database answered.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "health check: store unavailable");
            "unavailable"
        }
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        store: store.to_string(),
    })
}
