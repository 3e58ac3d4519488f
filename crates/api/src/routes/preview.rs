use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

use pressroom_core::blocks::render;
use pressroom_core::document::model::MediaItem;
use pressroom_core::preview::IssuedPreview;
use pressroom_core::store::DocumentStore;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Preview issuance and redemption routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/documents/{id}/preview", post(issue_preview))
        .route("/preview/{token}", get(read_preview))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueBody {
    ttl_seconds: Option<u64>,
}

async fn issue_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<IssueBody>>,
) -> ApiResult<Json<IssuedPreview>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let created_by = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let doc = state
        .documents()
        .get_document(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {id}")))?;

    // Snapshot the HTML now; later document edits do not affect an
    // issued preview.
    let media: HashMap<String, MediaItem> = state
        .documents()
        .list_media()
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();
    let resolved = render::resolve_media(&doc.blocks, &media);
    let mut body_html = render::render_blocks(&resolved);
    if body_html.is_empty() {
        body_html = doc.content.clone();
    }
    let html = render::wrap_page(&doc.title, &body_html);

    let ttl = body.ttl_seconds.or(state.config().preview_ttl_seconds);
    let issued = state.preview().issue(&doc.id, html, ttl, &created_by).await?;
    Ok(Json(issued))
}

#[derive(Deserialize)]
struct ReadParams {
    sig: Option<String>,
}

async fn read_preview(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<ReadParams>,
) -> ApiResult<Html<String>> {
    let sig = params.sig.ok_or(ApiError::PreviewTokenInvalid)?;
    let session = state.preview().redeem(&token, &sig, Utc::now()).await?;
    Ok(Html(session.html))
}
