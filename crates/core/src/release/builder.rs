//! The release builder: snapshot every document into rendered HTML
//! artifacts, fingerprint them and assemble the write-once manifest.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::hash;
use super::manifest::{Artifact, ReleaseManifest, MANIFEST_SCHEMA_VERSION};
use super::provenance::Provenance;
use super::store::ReleaseStore;
use crate::blocks::{self, render};
use crate::document::model::MediaItem;
use crate::error::CoreResult;
use crate::events::types::{PublishCompleted, PublishStarted, ReleaseActivated};
use crate::events::{EventBus, PressroomEvent};
use crate::store::DocumentStore;

/// What a publish call carries besides the current store contents.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub source_revision_id: Option<String>,
    pub source_revision_set: Option<Value>,
    pub published_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// The outcome reported to the caller. A publish either fully
/// succeeds or fully fails; no manifest is ever partially visible.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishJob {
    pub id: String,
    pub status: JobStatus,
    pub release_id: String,
    pub source_revision_id: Option<String>,
    pub source_revision_set: Vec<String>,
    pub artifact_count: usize,
    /// Whether this publish auto-activated its release.
    pub activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct ReleaseBuilder {
    documents: Arc<dyn DocumentStore>,
    releases: Arc<dyn ReleaseStore>,
    bus: EventBus,
}

impl ReleaseBuilder {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        releases: Arc<dyn ReleaseStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            documents,
            releases,
            bus,
        }
    }

    /// Build and persist a release from the current document set.
    ///
    /// Provenance validation failures are rejected before anything is
    /// written. A failure mid-build yields a `Failed` job and no
    /// manifest; artifacts written before the failure may remain as
    /// orphaned blobs, harmless because they are addressed by the
    /// never-referenced release id.
    pub async fn create_release(&self, request: PublishRequest) -> CoreResult<PublishJob> {
        let provenance = Provenance::resolve(
            request.source_revision_id.clone(),
            request.source_revision_set.as_ref(),
        )?;

        let release_id = format!("rel_{}", Uuid::new_v4().simple());
        let created_at = Utc::now();
        self.bus
            .publish(PressroomEvent::PublishStarted(PublishStarted {
                release_id: release_id.clone(),
                published_by: request.published_by.clone(),
                at: created_at,
            }));

        match self
            .build(&release_id, created_at, &provenance, &request.published_by)
            .await
        {
            Ok((manifest, activated)) => {
                self.bus
                    .publish(PressroomEvent::PublishCompleted(PublishCompleted {
                        release_id: release_id.clone(),
                        artifact_count: manifest.artifacts.len(),
                        activated,
                        at: Utc::now(),
                    }));
                Ok(PublishJob {
                    id: format!("job_{}", Uuid::new_v4().simple()),
                    status: JobStatus::Completed,
                    release_id,
                    source_revision_id: provenance.source_revision_id,
                    source_revision_set: provenance.source_revision_set,
                    artifact_count: manifest.artifacts.len(),
                    activated,
                    error: None,
                    created_at,
                })
            }
            Err(err) => {
                tracing::error!(%err, release_id, "publish failed");
                Ok(PublishJob {
                    id: format!("job_{}", Uuid::new_v4().simple()),
                    status: JobStatus::Failed,
                    release_id,
                    source_revision_id: provenance.source_revision_id,
                    source_revision_set: provenance.source_revision_set,
                    artifact_count: 0,
                    activated: false,
                    error: Some(err.to_string()),
                    created_at,
                })
            }
        }
    }

    async fn build(
        &self,
        release_id: &str,
        created_at: DateTime<Utc>,
        provenance: &Provenance,
        published_by: &str,
    ) -> CoreResult<(ReleaseManifest, bool)> {
        // A release is a full snapshot: every document regardless of
        // status, drafts and trash included. Filtering is a
        // presentation concern, not a builder concern.
        let documents = self.documents.list_all_documents().await?;
        let media: HashMap<String, MediaItem> = self
            .documents
            .list_media()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut artifacts = Vec::with_capacity(documents.len());
        let mut artifact_hashes = Vec::with_capacity(documents.len());
        let mut block_hashes = Vec::with_capacity(documents.len());

        for doc in &documents {
            // Hashed over the pre-resolution tree so media URL churn
            // never shifts the block fingerprint.
            let blocks_hash = match blocks::canonical_json(&doc.blocks) {
                Ok(json) => Some(hash::fnv1a64(json.as_bytes())),
                Err(err) => {
                    tracing::warn!(%err, document_id = %doc.id, "block tree failed to serialize");
                    None
                }
            };

            let resolved = render::resolve_media(&doc.blocks, &media);
            let mut body = render::render_blocks(&resolved);
            if body.is_empty() {
                if !doc.blocks.is_empty() {
                    tracing::warn!(
                        document_id = %doc.id,
                        "non-empty block tree rendered empty; falling back to legacy content"
                    );
                }
                body = doc.content.clone();
            }

            let page = render::wrap_page(&doc.title, &body);
            let artifact_hash = hash::fnv1a64(page.as_bytes());

            let written = self
                .releases
                .write_artifact(release_id, &doc.id, &doc.slug, page.as_bytes(), "text/html")
                .await?;

            artifact_hashes.push(artifact_hash.clone());
            block_hashes.push(blocks_hash.clone());
            artifacts.push(Artifact {
                route: written.route,
                path: written.path,
                hash: artifact_hash,
                blocks_hash,
                content_type: written.content_type,
            });
        }

        let content_hash = hash::content_hash(
            MANIFEST_SCHEMA_VERSION,
            &provenance.source_revision_set,
            &artifact_hashes,
            &block_hashes,
        );
        let release_hash = hash::release_hash(
            release_id,
            MANIFEST_SCHEMA_VERSION,
            created_at,
            published_by,
            provenance.source_revision_id.as_deref(),
            &provenance.source_revision_set,
            &artifact_hashes,
            &block_hashes,
        );

        let manifest = ReleaseManifest {
            release_id: release_id.to_string(),
            schema_version: MANIFEST_SCHEMA_VERSION,
            created_at,
            published_by: published_by.to_string(),
            source_revision_id: provenance.source_revision_id.clone(),
            source_revision_set: provenance.source_revision_set.clone(),
            artifacts,
            artifact_hashes,
            block_hashes,
            content_hash,
            release_hash,
        };

        // Release ids are freshly generated, so a collision should
        // never happen; the store still enforces write-once.
        self.releases.write_manifest(&manifest).await?;

        let activated = if self.releases.get_active_release().await?.is_none() {
            self.releases.activate_release(release_id).await?;
            self.bus
                .publish(PressroomEvent::ReleaseActivated(ReleaseActivated {
                    release_id: release_id.to_string(),
                    previous_release_id: None,
                    at: Utc::now(),
                }));
            true
        } else {
            false
        };

        Ok((manifest, activated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBlobStore;
    use crate::document::model::{DocumentInput, DocumentPatch};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        builder: ReleaseBuilder,
    }

    fn fixture() -> Fixture {
        let blobs = Arc::new(MemoryBlobStore::new(b"test-key".to_vec()));
        let store = Arc::new(MemoryStore::new(blobs));
        let builder = ReleaseBuilder::new(store.clone(), store.clone(), EventBus::new(16));
        Fixture { store, builder }
    }

    fn request() -> PublishRequest {
        PublishRequest {
            published_by: "alice".into(),
            ..Default::default()
        }
    }

    async fn seed(store: &MemoryStore, title: &str, blocks: Value) {
        store
            .create_document(
                DocumentInput {
                    title: title.to_string(),
                    blocks: Some(blocks),
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_publish_auto_activates_second_does_not() {
        let f = fixture();
        seed(&f.store, "Post", json!([{ "name": "core/paragraph", "attributes": { "content": "x" } }])).await;

        let first = f.builder.create_release(request()).await.unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert!(first.activated);

        let second = f.builder.create_release(request()).await.unwrap();
        assert!(!second.activated);
        assert_eq!(
            f.store.get_active_release().await.unwrap().as_deref(),
            Some(first.release_id.as_str())
        );
    }

    #[tokio::test]
    async fn snapshots_every_status_including_drafts_and_trash() {
        let f = fixture();
        seed(&f.store, "Draft post", json!([])).await;
        let doc = f
            .store
            .create_document(
                DocumentInput {
                    title: "Trashed".into(),
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();
        f.store.delete_document(&doc.id, false).await.unwrap();

        let job = f.builder.create_release(request()).await.unwrap();
        let manifest = f.store.get_manifest(&job.release_id).await.unwrap().unwrap();
        assert_eq!(manifest.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn same_content_hashes_identically_changed_content_does_not() {
        let f = fixture();
        seed(&f.store, "Post", json!([{ "name": "core/paragraph", "attributes": { "content": "v1" } }])).await;

        let a = f.builder.create_release(request()).await.unwrap();
        let b = f.builder.create_release(request()).await.unwrap();
        let ma = f.store.get_manifest(&a.release_id).await.unwrap().unwrap();
        let mb = f.store.get_manifest(&b.release_id).await.unwrap().unwrap();
        assert_eq!(ma.artifact_hashes, mb.artifact_hashes);
        assert_eq!(ma.content_hash, mb.content_hash);
        // The publish event differs even when content does not.
        assert_ne!(ma.release_hash, mb.release_hash);

        let doc_id = f.store.list_all_documents().await.unwrap()[0].id.clone();
        f.store
            .update_document(
                &doc_id,
                DocumentPatch {
                    blocks: Some(json!([{ "name": "core/paragraph", "attributes": { "content": "v2" } }])),
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();
        let c = f.builder.create_release(request()).await.unwrap();
        let mc = f.store.get_manifest(&c.release_id).await.unwrap().unwrap();
        assert_ne!(ma.artifact_hashes, mc.artifact_hashes);
        assert_ne!(ma.content_hash, mc.content_hash);
    }

    #[tokio::test]
    async fn derives_source_revision_id_from_set() {
        let f = fixture();
        seed(&f.store, "Post", json!([])).await;
        let job = f
            .builder
            .create_release(PublishRequest {
                source_revision_set: Some(json!(["rev_x"])),
                published_by: "alice".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(job.source_revision_id.as_deref(), Some("rev_x"));
        assert_eq!(job.source_revision_set, vec!["rev_x"]);
    }

    #[tokio::test]
    async fn malformed_provenance_fails_before_any_write() {
        let f = fixture();
        seed(&f.store, "Post", json!([])).await;
        let err = f
            .builder
            .create_release(PublishRequest {
                source_revision_set: Some(json!([1])),
                published_by: "alice".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::CoreError::Validation(_)));
        assert!(f.store.list_releases().await.unwrap().is_empty());
        assert!(f.store.get_release_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_block_tree_falls_back_to_legacy_content() {
        let f = fixture();
        f.store
            .create_document(
                DocumentInput {
                    title: "Legacy".into(),
                    content: "<p>old body</p>".into(),
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();
        let job = f.builder.create_release(request()).await.unwrap();
        let manifest = f.store.get_manifest(&job.release_id).await.unwrap().unwrap();
        assert_eq!(manifest.artifacts.len(), 1);
        assert!(manifest.artifacts[0].blocks_hash.is_some());
    }

    #[tokio::test]
    async fn manifest_records_publish_history() {
        let f = fixture();
        seed(&f.store, "Post", json!([])).await;
        let job = f.builder.create_release(request()).await.unwrap();
        let history = f.store.get_release_history().await.unwrap();
        let kinds: Vec<&str> = history.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["artifact_written", "manifest_written", "activated"]);
        assert!(history.iter().all(|e| e.release_id == job.release_id));
    }
}
