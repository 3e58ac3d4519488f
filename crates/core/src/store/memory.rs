//! In-memory backend. All state sits behind one `RwLock`, which is
//! what makes the pointer-swap-plus-history-append atomic here: both
//! happen under a single write guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::DocumentStore;
use crate::blocks;
use crate::cache::BlobPort;
use crate::document::model::{
    Document, DocumentInput, DocumentPatch, DocumentQuery, MediaItem, Page, Revision,
    SortDirection, SortField,
};
use crate::document::slug;
use crate::error::{CoreError, CoreResult};
use crate::release::manifest::{EventKind, ReleaseEvent, ReleaseManifest};
use crate::release::store::{artifact_path, ReleaseStore, WrittenArtifact};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    revisions: Vec<Revision>,
    media: HashMap<String, MediaItem>,
    manifests: Vec<ReleaseManifest>,
    active_release: Option<String>,
    history: Vec<ReleaseEvent>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    blobs: Arc<dyn BlobPort>,
    fail_next_history_append: AtomicBool,
}

impl MemoryStore {
    pub fn new(blobs: Arc<dyn BlobPort>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            blobs,
            fail_next_history_append: AtomicBool::new(false),
        }
    }

    /// Fault injection: make the next history append fail. Used to
    /// assert that a failed append leaves the active pointer
    /// untouched.
    pub fn fail_next_history_append(&self) {
        self.fail_next_history_append.store(true, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_history_append.swap(false, Ordering::SeqCst)
    }
}

impl Inner {
    fn latest_revision_id(&self, document_id: &str) -> Option<String> {
        self.revisions
            .iter()
            .rev()
            .find(|r| r.document_id == document_id)
            .map(|r| r.id.clone())
    }

    fn taken_slugs(&self, excluding_id: Option<&str>) -> Vec<String> {
        self.documents
            .values()
            .filter(|d| Some(d.id.as_str()) != excluding_id)
            .map(|d| d.slug.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, input: DocumentInput, author: &str) -> CoreResult<Document> {
        let normalized = blocks::normalize(input.blocks.as_ref())?;
        let mut inner = self.inner.write().await;

        let base = slug::slugify(input.slug.as_deref().unwrap_or(&input.title));
        let taken = inner.taken_slugs(None);
        let unique = slug::dedupe(&base, taken.iter().map(String::as_str));

        let now = Utc::now();
        let doc = Document::new(input, normalized, unique, author, now);
        let revision = Revision::snapshot_of(&doc, None, author, now);

        inner.documents.insert(doc.id.clone(), doc.clone());
        inner.revisions.push(revision);
        Ok(doc)
    }

    async fn update_document(
        &self,
        id: &str,
        patch: DocumentPatch,
        author: &str,
    ) -> CoreResult<Document> {
        let normalized = match &patch.blocks {
            Some(raw) => Some(blocks::normalize(Some(raw))?),
            None => None,
        };
        let mut inner = self.inner.write().await;
        let current = inner
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;

        let new_slug = patch.slug.as_deref().map(|raw| {
            let base = slug::slugify(raw);
            let taken = inner.taken_slugs(Some(id));
            slug::dedupe(&base, taken.iter().map(String::as_str))
        });

        let now = Utc::now();
        let updated = current.apply(patch, normalized, new_slug, now);
        let source = inner.latest_revision_id(id);
        let revision = Revision::snapshot_of(&updated, source, author, now);

        inner.documents.insert(updated.id.clone(), updated.clone());
        inner.revisions.push(revision);
        Ok(updated)
    }

    async fn delete_document(&self, id: &str, permanent: bool) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let Some(current) = inner.documents.get(id).cloned() else {
            return Err(CoreError::NotFound(format!("document {id}")));
        };
        if permanent {
            // Document and revisions go together; under the single
            // write guard this cannot half-complete.
            inner.documents.remove(id);
            inner.revisions.retain(|r| r.document_id != id);
        } else {
            let now = Utc::now();
            let trashed = current.apply(
                DocumentPatch {
                    status: Some(crate::document::model::DocumentStatus::Trash),
                    ..Default::default()
                },
                None,
                None,
                now,
            );
            let source = inner.latest_revision_id(id);
            let revision = Revision::snapshot_of(&trashed, source, &trashed.created_by, now);
            inner.documents.insert(trashed.id.clone(), trashed);
            inner.revisions.push(revision);
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> CoreResult<Option<Document>> {
        Ok(self.inner.read().await.documents.get(id).cloned())
    }

    async fn list_documents(&self, query: &DocumentQuery) -> CoreResult<Page<Document>> {
        let inner = self.inner.read().await;
        let mut items: Vec<Document> = inner
            .documents
            .values()
            .filter(|d| query.status.map_or(true, |s| d.status == s))
            .filter(|d| query.doc_type.as_deref().map_or(true, |t| d.doc_type == t))
            .filter(|d| {
                query.search.as_deref().map_or(true, |needle| {
                    d.title.to_lowercase().contains(&needle.to_lowercase())
                })
            })
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            let ord = match query.sort {
                SortField::Title => a.title.cmp(&b.title),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            let ord = match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            // Id as final tiebreak keeps pagination deterministic.
            ord.then_with(|| a.id.cmp(&b.id))
        });

        let total = items.len() as u64;
        let page = query.page();
        let page_size = query.page_size();
        // u64 arithmetic: page * page_size can overflow u32 for valid
        // queries far past the end.
        let start = (u64::from(page) - 1) * u64::from(page_size);
        let items = items
            .into_iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(page_size as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_all_documents(&self) -> CoreResult<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut items: Vec<Document> = inner.documents.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_document_by_slug(&self, slug: &str) -> CoreResult<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.documents.values().find(|d| d.slug == slug).cloned())
    }

    async fn list_revisions(&self, document_id: &str) -> CoreResult<Vec<Revision>> {
        let inner = self.inner.read().await;
        Ok(inner
            .revisions
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn get_revision(&self, revision_id: &str) -> CoreResult<Option<Revision>> {
        let inner = self.inner.read().await;
        Ok(inner.revisions.iter().find(|r| r.id == revision_id).cloned())
    }

    async fn put_media(&self, media: MediaItem) -> CoreResult<MediaItem> {
        self.inner
            .write()
            .await
            .media
            .insert(media.id.clone(), media.clone());
        Ok(media)
    }

    async fn get_media(&self, id: &str) -> CoreResult<Option<MediaItem>> {
        Ok(self.inner.read().await.media.get(id).cloned())
    }

    async fn list_media(&self) -> CoreResult<Vec<MediaItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<MediaItem> = inner.media.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn write_artifact(
        &self,
        release_id: &str,
        document_id: &str,
        route: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> CoreResult<WrittenArtifact> {
        let path = artifact_path(release_id, document_id);
        self.blobs.put_blob(&path, bytes, content_type).await?;

        let mut inner = self.inner.write().await;
        inner.history.push(ReleaseEvent {
            kind: EventKind::ArtifactWritten,
            release_id: release_id.to_string(),
            previous_release_id: None,
            at: Utc::now(),
        });
        Ok(WrittenArtifact {
            release_id: release_id.to_string(),
            route: route.to_string(),
            path,
            content_type: content_type.to_string(),
        })
    }

    async fn write_manifest(&self, manifest: &ReleaseManifest) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .manifests
            .iter()
            .any(|m| m.release_id == manifest.release_id)
        {
            return Err(CoreError::ImmutableManifest(manifest.release_id.clone()));
        }
        inner.manifests.push(manifest.clone());
        inner.history.push(ReleaseEvent {
            kind: EventKind::ManifestWritten,
            release_id: manifest.release_id.clone(),
            previous_release_id: None,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn get_manifest(&self, release_id: &str) -> CoreResult<Option<ReleaseManifest>> {
        let inner = self.inner.read().await;
        Ok(inner
            .manifests
            .iter()
            .find(|m| m.release_id == release_id)
            .cloned())
    }

    async fn list_releases(&self) -> CoreResult<Vec<ReleaseManifest>> {
        let inner = self.inner.read().await;
        let mut manifests = inner.manifests.clone();
        // Stable sort: creation time ascending, persistence order
        // preserved on ties.
        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(manifests)
    }

    async fn activate_release(&self, release_id: &str) -> CoreResult<Option<String>> {
        let mut inner = self.inner.write().await;
        if !inner.manifests.iter().any(|m| m.release_id == release_id) {
            return Err(CoreError::UnknownRelease(release_id.to_string()));
        }
        if inner.active_release.as_deref() == Some(release_id) {
            return Ok(inner.active_release.clone());
        }
        if self.take_injected_failure() {
            return Err(CoreError::Backend("history append failed".into()));
        }
        let previous = inner.active_release.clone();
        inner.history.push(ReleaseEvent {
            kind: EventKind::Activated,
            release_id: release_id.to_string(),
            previous_release_id: previous,
            at: Utc::now(),
        });
        inner.active_release = Some(release_id.to_string());
        Ok(inner.active_release.clone())
    }

    async fn get_active_release(&self) -> CoreResult<Option<String>> {
        Ok(self.inner.read().await.active_release.clone())
    }

    async fn get_release_history(&self) -> CoreResult<Vec<ReleaseEvent>> {
        Ok(self.inner.read().await.history.clone())
    }

    fn supports_atomic_swap(&self) -> bool {
        true
    }
}
