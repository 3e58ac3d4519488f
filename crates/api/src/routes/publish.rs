use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use pressroom_core::events::types::ReleaseActivated;
use pressroom_core::events::PressroomEvent;
use pressroom_core::release::builder::{PublishJob, PublishRequest};
use pressroom_core::release::manifest::{ReleaseEvent, ReleaseManifest};
use pressroom_core::release::store::ReleaseStore;

use crate::error::ApiResult;
use crate::state::AppState;

/// Publish and release-management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/publish", post(publish))
        .route("/v1/releases", get(list_releases))
        .route("/v1/releases/active", get(active_release))
        .route("/v1/releases/history", get(release_history))
        .route("/v1/releases/{id}", get(get_release))
        .route("/v1/releases/{id}/activate", post(activate_release))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishBody {
    source_revision_id: Option<String>,
    source_revision_set: Option<Value>,
}

async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<PublishBody>>,
) -> ApiResult<Json<PublishJob>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let published_by = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let job = state
        .builder()
        .create_release(PublishRequest {
            source_revision_id: body.source_revision_id,
            source_revision_set: body.source_revision_set,
            published_by,
        })
        .await?;
    Ok(Json(job))
}

async fn list_releases(State(state): State<AppState>) -> ApiResult<Json<Vec<ReleaseManifest>>> {
    Ok(Json(state.releases().list_releases().await?))
}

async fn get_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReleaseManifest>> {
    let manifest = state
        .releases()
        .get_manifest(&id)
        .await?
        .ok_or_else(|| crate::error::ApiError::NotFound(format!("release {id}")))?;
    Ok(Json(manifest))
}

async fn active_release(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "releaseId": state.releases().get_active_release().await?,
    })))
}

async fn activate_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let previous = state.releases().get_active_release().await?;
    let active = state.releases().activate_release(&id).await?;
    // Re-activating the active release is a no-op and emits nothing.
    if previous.as_deref() != Some(id.as_str()) {
        state
            .event_bus()
            .publish(PressroomEvent::ReleaseActivated(ReleaseActivated {
                release_id: id.clone(),
                previous_release_id: previous,
                at: Utc::now(),
            }));
    }
    Ok(Json(json!({ "releaseId": active })))
}

async fn release_history(State(state): State<AppState>) -> ApiResult<Json<Vec<ReleaseEvent>>> {
    Ok(Json(state.releases().get_release_history().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pressroom_core::cache::private::PrivateRouteCache;
    use pressroom_core::cache::{BlobPort, MemoryBlobStore, MemoryCache};
    use pressroom_core::events::EventBus;
    use pressroom_core::preview::PreviewService;
    use pressroom_core::release::builder::ReleaseBuilder;
    use pressroom_core::store::memory::MemoryStore;
    use pressroom_core::store::DocumentStore;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::config::AppConfig;

    fn test_state() -> AppState {
        let blobs: Arc<dyn BlobPort> = Arc::new(MemoryBlobStore::new(b"test-key".to_vec()));
        let store = Arc::new(MemoryStore::new(blobs.clone()));
        let documents: Arc<dyn DocumentStore> = store.clone();
        let releases: Arc<dyn ReleaseStore> = store;
        let event_bus = EventBus::new(16);
        let builder = ReleaseBuilder::new(documents.clone(), releases.clone(), event_bus.clone());
        let preview = PreviewService::new(b"preview-key".to_vec());
        let private_cache = PrivateRouteCache::new(
            releases.clone(),
            documents.clone(),
            blobs.clone(),
            Arc::new(MemoryCache::new()),
            b"scope-key".to_vec(),
            300,
        );
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            backend_override: None,
            db_max_connections: 1,
            preview_key: "test-key".into(),
            scope_key: "scope-key".into(),
            preview_ttl_seconds: None,
            private_cache_ttl_seconds: 300,
            event_bus_capacity: 16,
            log_level: "info".into(),
        };
        AppState::new(
            documents,
            releases,
            blobs,
            builder,
            preview,
            private_cache,
            event_bus,
            config,
        )
    }

    #[tokio::test]
    async fn manual_activation_publishes_release_activated() {
        let state = test_state();
        let first = state
            .builder()
            .create_release(PublishRequest {
                published_by: "alice".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = state
            .builder()
            .create_release(PublishRequest {
                published_by: "alice".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut rx = state.event_bus().subscribe();
        activate_release(State(state.clone()), Path(second.release_id.clone()))
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            PressroomEvent::ReleaseActivated(event) => {
                assert_eq!(event.release_id, second.release_id);
                assert_eq!(
                    event.previous_release_id.as_deref(),
                    Some(first.release_id.as_str())
                );
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Re-activating the already-active release emits nothing.
        activate_release(State(state.clone()), Path(second.release_id.clone()))
            .await
            .unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
