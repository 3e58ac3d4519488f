use axum::{extract::State, routing::get, Json, Router};
use pressroom_core::release::store::ReleaseStore;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/ping", get(ping))
}

/// Full health check, verifies release-store reachability.
async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let active = state.releases().get_active_release().await?;

    Ok(Json(json!({
        "status": "ok",
        "activeRelease": active,
        "atomicPointerSwap": state.releases().supports_atomic_swap(),
        "subscribers": state.event_bus().subscriber_count(),
    })))
}

/// Lightweight ping, no store check.
async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
