use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::blocks::Block;

/// Document lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Published,
    Trash,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Published => "published",
            DocumentStatus::Trash => "trash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "published" => Some(DocumentStatus::Published),
            "trash" => Some(DocumentStatus::Trash),
            _ => None,
        }
    }
}

/// An editable document. Owned exclusively by the document store;
/// never mutated after construction; updates build a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Legacy HTML body, used when the block tree renders empty.
    pub content: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub slug: String,
    pub excerpt: String,
    pub featured_image_id: Option<String>,
    pub blocks: Vec<Block>,
    pub blocks_schema_version: u32,
    pub fields: Map<String, Value>,
    pub term_ids: Vec<String>,
    pub status: DocumentStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `create_document`. Slug is derived from the title when
/// absent; everything else defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub featured_image_id: Option<String>,
    pub blocks: Option<Value>,
    pub blocks_schema_version: Option<u32>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub term_ids: Vec<String>,
    pub status: Option<DocumentStatus>,
}

/// Partial patch for `update_document`. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    /// `Some(None)` clears the featured image.
    pub featured_image_id: Option<Option<String>>,
    pub blocks: Option<Value>,
    pub fields: Option<Map<String, Value>>,
    pub term_ids: Option<Vec<String>>,
    pub status: Option<DocumentStatus>,
}

impl Document {
    /// Pure constructor. Blocks must already be normalized and the
    /// slug already deduplicated by the caller.
    pub fn new(
        input: DocumentInput,
        blocks: Vec<Block>,
        slug: String,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Document {
            id: format!("doc_{}", Uuid::new_v4().simple()),
            title: input.title,
            content: input.content,
            doc_type: input.doc_type.unwrap_or_else(|| "post".to_string()),
            slug,
            excerpt: input.excerpt,
            featured_image_id: input.featured_image_id,
            blocks,
            blocks_schema_version: input.blocks_schema_version.unwrap_or(1),
            fields: input.fields,
            term_ids: input.term_ids,
            status: input.status.unwrap_or(DocumentStatus::Draft),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the updated document a patch describes. Returns a new
    /// value with `updated_at` bumped; `self` is untouched.
    pub fn apply(
        &self,
        patch: DocumentPatch,
        blocks: Option<Vec<Block>>,
        slug: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Document {
            id: self.id.clone(),
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            content: patch.content.unwrap_or_else(|| self.content.clone()),
            doc_type: self.doc_type.clone(),
            slug: slug.unwrap_or_else(|| self.slug.clone()),
            excerpt: patch.excerpt.unwrap_or_else(|| self.excerpt.clone()),
            featured_image_id: patch
                .featured_image_id
                .unwrap_or_else(|| self.featured_image_id.clone()),
            blocks: blocks.unwrap_or_else(|| self.blocks.clone()),
            blocks_schema_version: self.blocks_schema_version,
            fields: patch.fields.unwrap_or_else(|| self.fields.clone()),
            term_ids: patch.term_ids.unwrap_or_else(|| self.term_ids.clone()),
            status: patch.status.unwrap_or(self.status),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// An immutable snapshot of a document at write time. Appended on
/// every write; deleted only when its document is permanently deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub status: DocumentStatus,
    pub featured_image_id: Option<String>,
    pub blocks: Vec<Block>,
    pub blocks_schema_version: u32,
    pub fields: Map<String, Value>,
    pub term_ids: Vec<String>,
    /// Back-reference to the prior latest revision at write time.
    pub source_revision_id: Option<String>,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    /// Snapshot a document into a fresh revision.
    pub fn snapshot_of(
        doc: &Document,
        source_revision_id: Option<String>,
        author_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Revision {
            id: format!("rev_{}", Uuid::new_v4().simple()),
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            excerpt: doc.excerpt.clone(),
            slug: doc.slug.clone(),
            status: doc.status,
            featured_image_id: doc.featured_image_id.clone(),
            blocks: doc.blocks.clone(),
            blocks_schema_version: doc.blocks_schema_version,
            fields: doc.fields.clone(),
            term_ids: doc.term_ids.clone(),
            source_revision_id,
            author_id: author_id.to_string(),
            created_at: now,
        }
    }
}

/// One entry in the media index the release builder resolves against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub mime: String,
}

/// Sortable fields for document listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Title,
    CreatedAt,
    #[default]
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Listing query: filters, sort and pagination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    /// Case-insensitive substring match on the title.
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub direction: SortDirection,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl DocumentQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(20).clamp(1, 100)
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
