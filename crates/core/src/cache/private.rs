//! Capability-scoped caching of private routes.
//!
//! Cache keys are `(activeReleaseId, route, scope)`, so principals
//! with different capability sets never share an entry and switching
//! the active release implicitly invalidates every prior key.
//!
//! Route resolution matches manifest artifacts by exact route first
//! and then falls back to the document's *current* slug. Slugs can
//! change between publishes while manifests stay frozen, so an old
//! release's artifact may be served under a document's new slug; that
//! mismatch-tolerance band is accepted behavior.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{capability_scope, BlobPort, CachePort};
use crate::error::{CoreError, CoreResult};
use crate::release::store::{artifact_path, ReleaseStore};
use crate::store::DocumentStore;

/// The caller identity a private read runs as.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// What a private-route read returns to the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteContent {
    pub route: String,
    pub html: String,
    pub release_id: String,
    pub cache: CacheOutcome,
}

pub struct PrivateRouteCache {
    releases: Arc<dyn ReleaseStore>,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobPort>,
    cache: Arc<dyn CachePort>,
    scope_key: Vec<u8>,
    ttl_seconds: u64,
}

impl PrivateRouteCache {
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobPort>,
        cache: Arc<dyn CachePort>,
        scope_key: impl Into<Vec<u8>>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            releases,
            documents,
            blobs,
            cache,
            scope_key: scope_key.into(),
            ttl_seconds,
        }
    }

    /// Resolve a route against the active release for one principal.
    pub async fn fetch(&self, route: &str, principal: &Principal) -> CoreResult<RouteContent> {
        let release_id = self
            .releases
            .get_active_release()
            .await?
            .ok_or_else(|| CoreError::NotFound("no active release".into()))?;

        let scope = capability_scope(&self.scope_key, &principal.user_id, &principal.capabilities)?;
        let cache_key = format!("private:{release_id}:{route}:{scope}");

        if let Some(html) = self.cache.get(&cache_key).await? {
            return Ok(RouteContent {
                route: route.to_string(),
                html,
                release_id,
                cache: CacheOutcome::Hit,
            });
        }

        let manifest = self
            .releases
            .get_manifest(&release_id)
            .await?
            .ok_or_else(|| CoreError::UnknownRelease(release_id.clone()))?;

        let path = match manifest.artifacts.iter().find(|a| a.route == route) {
            Some(artifact) => artifact.path.clone(),
            None => self.resolve_by_current_slug(&manifest.release_id, route).await?,
        };

        let blob = self
            .blobs
            .get_blob(&path)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("artifact blob {path}")))?;
        let html = String::from_utf8_lossy(&blob.bytes).into_owned();

        self.cache
            .set(&cache_key, html.clone(), self.ttl_seconds)
            .await?;

        Ok(RouteContent {
            route: route.to_string(),
            html,
            release_id,
            cache: CacheOutcome::Miss,
        })
    }

    /// Fallback: the route may be a slug assigned after the release
    /// was frozen. Look the document up by its current slug and map
    /// back to the frozen artifact through the document id.
    async fn resolve_by_current_slug(&self, release_id: &str, route: &str) -> CoreResult<String> {
        let doc = self
            .documents
            .get_document_by_slug(route)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("route {route}")))?;
        Ok(artifact_path(release_id, &doc.id))
    }
}
