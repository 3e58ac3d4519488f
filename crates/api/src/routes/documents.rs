use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use pressroom_core::document::model::{
    Document, DocumentInput, DocumentPatch, DocumentQuery, MediaItem, Page, Revision,
};
use pressroom_core::events::types::DocumentWritten;
use pressroom_core::events::PressroomEvent;
use pressroom_core::store::DocumentStore;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Document, revision and media routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/documents", get(list_documents).post(create_document))
        .route(
            "/v1/documents/{id}",
            get(get_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route("/v1/documents/{id}/revisions", get(list_revisions))
        .route("/v1/revisions/{id}", get(get_revision))
        .route("/v1/media", get(list_media).post(put_media))
        .route("/v1/media/{id}", get(get_media))
}

/// Caller identity, until real authentication fronts this service.
fn author(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

async fn emit_written(state: &AppState, doc: &Document) {
    // The latest revision is the one this write just appended.
    if let Ok(revisions) = state.documents().list_revisions(&doc.id).await {
        if let Some(last) = revisions.last() {
            state
                .event_bus()
                .publish(PressroomEvent::DocumentWritten(DocumentWritten {
                    document_id: doc.id.clone(),
                    revision_id: last.id.clone(),
                    at: Utc::now(),
                }));
        }
    }
}

async fn create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<DocumentInput>,
) -> ApiResult<Json<Document>> {
    if input.title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    let doc = state.documents().create_document(input, &author(&headers)).await?;
    emit_written(&state, &doc).await;
    Ok(Json(doc))
}

async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<DocumentPatch>,
) -> ApiResult<Json<Document>> {
    let doc = state
        .documents()
        .update_document(&id, patch, &author(&headers))
        .await?;
    emit_written(&state, &doc).await;
    Ok(Json(doc))
}

#[derive(Deserialize)]
struct DeleteParams {
    #[serde(default)]
    permanent: bool,
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<Value>> {
    state.documents().delete_document(&id, params.permanent).await?;
    Ok(Json(json!({ "deleted": id, "permanent": params.permanent })))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    let doc = state
        .documents()
        .get_document(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {id}")))?;
    Ok(Json(doc))
}

async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Json<Page<Document>>> {
    Ok(Json(state.documents().list_documents(&query).await?))
}

async fn list_revisions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Revision>>> {
    Ok(Json(state.documents().list_revisions(&id).await?))
}

async fn get_revision(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Revision>> {
    let revision = state
        .documents()
        .get_revision(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("revision {id}")))?;
    Ok(Json(revision))
}

async fn put_media(
    State(state): State<AppState>,
    Json(media): Json<MediaItem>,
) -> ApiResult<Json<MediaItem>> {
    Ok(Json(state.documents().put_media(media).await?))
}

async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MediaItem>> {
    let media = state
        .documents()
        .get_media(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media {id}")))?;
    Ok(Json(media))
}

async fn list_media(State(state): State<AppState>) -> ApiResult<Json<Vec<MediaItem>>> {
    Ok(Json(state.documents().list_media().await?))
}
