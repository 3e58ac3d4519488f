//! The release store contract.
//!
//! Satisfied by the in-memory, key-value and PostgreSQL backends in
//! `crate::store`; every implementation must exhibit identical
//! observable behavior for the properties below.

use async_trait::async_trait;
use serde::Serialize;

use super::manifest::{ReleaseEvent, ReleaseManifest};
use crate::error::CoreResult;

/// The receipt returned by `write_artifact`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenArtifact {
    pub release_id: String,
    pub route: String,
    pub path: String,
    pub content_type: String,
}

/// Blob path for an artifact. Keyed by document id, not by route, so
/// route (slug) changes after a release is frozen can still resolve.
pub fn artifact_path(release_id: &str, document_id: &str) -> String {
    format!("releases/{release_id}/{document_id}.html")
}

/// Backend-agnostic release persistence.
///
/// Guarantees every implementation must provide:
/// - manifests are write-once per release id (`ImmutableManifest` on
///   a second write);
/// - the active pointer switches atomically together with its
///   `activated` history event, or not at all;
/// - history is append-only and strictly ordered;
/// - `list_releases` ordering is reproducible across backends:
///   creation time, then persistence order, then release id.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Persist one artifact blob and append an `artifact_written`
    /// event.
    async fn write_artifact(
        &self,
        release_id: &str,
        document_id: &str,
        route: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> CoreResult<WrittenArtifact>;

    /// Persist a manifest exactly once; `ImmutableManifest` if one
    /// already exists for this release id.
    async fn write_manifest(&self, manifest: &ReleaseManifest) -> CoreResult<()>;

    async fn get_manifest(&self, release_id: &str) -> CoreResult<Option<ReleaseManifest>>;

    async fn list_releases(&self) -> CoreResult<Vec<ReleaseManifest>>;

    /// Switch the active pointer. `UnknownRelease` when no manifest
    /// exists; a no-op (nothing appended) when the release is already
    /// active. Returns the pointer after the call.
    async fn activate_release(&self, release_id: &str) -> CoreResult<Option<String>>;

    async fn get_active_release(&self) -> CoreResult<Option<String>>;

    async fn get_release_history(&self) -> CoreResult<Vec<ReleaseEvent>>;

    /// Whether pointer switches commit atomically with their history
    /// event. Backends without transactional batches return `false`
    /// and must warn at construction time.
    fn supports_atomic_swap(&self) -> bool;
}
