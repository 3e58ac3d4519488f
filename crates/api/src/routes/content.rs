use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};

use pressroom_core::cache::private::{Principal, RouteContent};

use crate::error::ApiResult;
use crate::state::AppState;

/// Private-route content, served from the active release behind the
/// capability-scoped cache.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/content/{route}", get(read_route))
}

fn principal(headers: &HeaderMap) -> Principal {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let capabilities = headers
        .get("x-capabilities")
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Principal {
        user_id,
        capabilities,
    }
}

async fn read_route(
    State(state): State<AppState>,
    Path(route): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<RouteContent>> {
    let content = state
        .private_cache()
        .fetch(&route, &principal(&headers))
        .await?;
    Ok(Json(content))
}
