//! Storage ports and their backends.
//!
//! One implementation per backend, chosen once at startup from
//! configuration. The release-store semantics (write-once manifests,
//! atomic pointer swap, append-only history) must be observably
//! identical across all of them.

pub mod kv;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::document::model::{
    Document, DocumentInput, DocumentPatch, DocumentQuery, MediaItem, Page, Revision,
};
use crate::error::CoreResult;

/// Which backend the process runs against. Decided by configuration
/// presence at boot, never by runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Kv,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Kv => "kv",
            Backend::Postgres => "postgres",
        }
    }
}

/// Document, revision and media persistence.
///
/// Every document write appends a revision snapshot whose
/// `source_revision_id` points at the prior latest revision. Permanent
/// deletion removes the document and all its revisions atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document, deriving and deduplicating its slug, and
    /// append its first revision.
    async fn create_document(&self, input: DocumentInput, author: &str) -> CoreResult<Document>;

    /// Apply a partial patch, bump `updated_at` and append a revision.
    async fn update_document(
        &self,
        id: &str,
        patch: DocumentPatch,
        author: &str,
    ) -> CoreResult<Document>;

    /// Soft delete moves the document to trash; permanent delete
    /// removes it together with all of its revisions, atomically.
    async fn delete_document(&self, id: &str, permanent: bool) -> CoreResult<()>;

    async fn get_document(&self, id: &str) -> CoreResult<Option<Document>>;

    /// Filtered, sorted, paginated listing with the document id as the
    /// final sort tiebreak.
    async fn list_documents(&self, query: &DocumentQuery) -> CoreResult<Page<Document>>;

    /// Every document regardless of status, unpaginated. The release
    /// builder snapshots from this.
    async fn list_all_documents(&self) -> CoreResult<Vec<Document>>;

    /// Look a document up by its current slug.
    async fn get_document_by_slug(&self, slug: &str) -> CoreResult<Option<Document>>;

    async fn list_revisions(&self, document_id: &str) -> CoreResult<Vec<Revision>>;

    async fn get_revision(&self, revision_id: &str) -> CoreResult<Option<Revision>>;

    async fn put_media(&self, media: MediaItem) -> CoreResult<MediaItem>;

    async fn get_media(&self, id: &str) -> CoreResult<Option<MediaItem>>;

    async fn list_media(&self) -> CoreResult<Vec<MediaItem>>;
}
