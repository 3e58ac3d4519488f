//! PostgreSQL backend.
//!
//! Documents and revisions keep their filterable columns relational
//! and the full value as JSONB, so model changes do not ripple into
//! the schema. Pointer switches and manifest writes run inside
//! transactions together with their history events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

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

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgStore {
    pool: PgPool,
    blobs: Arc<dyn BlobPort>,
}

impl PgStore {
    pub fn new(pool: PgPool, blobs: Arc<dyn BlobPort>) -> Self {
        Self { pool, blobs }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_document(row: &sqlx::postgres::PgRow) -> CoreResult<Document> {
    let doc: serde_json::Value = row.try_get("doc")?;
    serde_json::from_value(doc).map_err(Into::into)
}

fn decode_revision(row: &sqlx::postgres::PgRow) -> CoreResult<Revision> {
    let rev: serde_json::Value = row.try_get("rev")?;
    serde_json::from_value(rev).map_err(Into::into)
}

async fn insert_revision(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    revision: &Revision,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO revisions (id, document_id, created_at, rev) VALUES ($1, $2, $3, $4)",
    )
    .bind(&revision.id)
    .bind(&revision.document_id)
    .bind(revision.created_at)
    .bind(serde_json::to_value(revision)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn push_listing_filters(builder: &mut QueryBuilder<Postgres>, query: &DocumentQuery) {
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(doc_type) = &query.doc_type {
        builder.push(" AND doc_type = ").push_bind(doc_type.clone());
    }
    if let Some(search) = &query.search {
        builder
            .push(" AND title ILIKE ")
            .push_bind(format!("%{search}%"));
    }
}

async fn upsert_document(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    doc: &Document,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO documents \
           (id, title, doc_type, slug, status, created_at, updated_at, doc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (id) DO UPDATE SET \
           title = EXCLUDED.title, doc_type = EXCLUDED.doc_type, \
           slug = EXCLUDED.slug, status = EXCLUDED.status, \
           updated_at = EXCLUDED.updated_at, doc = EXCLUDED.doc",
    )
    .bind(&doc.id)
    .bind(&doc.title)
    .bind(&doc.doc_type)
    .bind(&doc.slug)
    .bind(doc.status.as_str())
    .bind(doc.created_at)
    .bind(doc.updated_at)
    .bind(serde_json::to_value(doc)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl PgStore {
    async fn taken_slugs(&self, excluding_id: Option<&str>) -> CoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT id, slug FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter(|row| {
                let id: String = row.get("id");
                Some(id.as_str()) != excluding_id
            })
            .map(|row| row.get("slug"))
            .collect())
    }

    async fn latest_revision_id(&self, document_id: &str) -> CoreResult<Option<String>> {
        let row = sqlx::query(
            "SELECT id FROM revisions WHERE document_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("id")))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create_document(&self, input: DocumentInput, author: &str) -> CoreResult<Document> {
        let normalized = blocks::normalize(input.blocks.as_ref())?;
        let base = slug::slugify(input.slug.as_deref().unwrap_or(&input.title));
        let taken = self.taken_slugs(None).await?;
        let unique = slug::dedupe(&base, taken.iter().map(String::as_str));

        let now = Utc::now();
        let doc = Document::new(input, normalized, unique, author, now);
        let revision = Revision::snapshot_of(&doc, None, author, now);

        let mut tx = self.pool.begin().await?;
        upsert_document(&mut tx, &doc).await?;
        insert_revision(&mut tx, &revision).await?;
        tx.commit().await?;
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
        let current = self
            .get_document(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;

        let new_slug = match patch.slug.as_deref() {
            Some(raw) => {
                let base = slug::slugify(raw);
                let taken = self.taken_slugs(Some(id)).await?;
                Some(slug::dedupe(&base, taken.iter().map(String::as_str)))
            }
            None => None,
        };

        let now = Utc::now();
        let updated = current.apply(patch, normalized, new_slug, now);
        let source = self.latest_revision_id(id).await?;
        let revision = Revision::snapshot_of(&updated, source, author, now);

        let mut tx = self.pool.begin().await?;
        upsert_document(&mut tx, &updated).await?;
        insert_revision(&mut tx, &revision).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_document(&self, id: &str, permanent: bool) -> CoreResult<()> {
        if permanent {
            // Document and revisions go in one transaction; a failure
            // rolls both back.
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM revisions WHERE document_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM documents WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(CoreError::NotFound(format!("document {id}")));
            }
            tx.commit().await?;
            Ok(())
        } else {
            let current = self
                .get_document(id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("document {id}")))?;
            let author = current.created_by.clone();
            self.update_document(
                id,
                DocumentPatch {
                    status: Some(crate::document::model::DocumentStatus::Trash),
                    ..Default::default()
                },
                &author,
            )
            .await?;
            Ok(())
        }
    }

    async fn get_document(&self, id: &str) -> CoreResult<Option<Document>> {
        let row = sqlx::query("SELECT doc FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn list_documents(&self, query: &DocumentQuery) -> CoreResult<Page<Document>> {
        let sort_column = match query.sort {
            SortField::Title => "title",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        };
        let direction = match query.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };

        // Count runs separately with the same filters so pages past
        // the end still report the true total.
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM documents WHERE TRUE");
        push_listing_filters(&mut count_builder, query);
        let total = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .get::<i64, _>("total") as u64;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT doc FROM documents WHERE TRUE");
        push_listing_filters(&mut builder, query);
        builder.push(format!(" ORDER BY {sort_column} {direction}, id ASC"));
        let page = query.page();
        let page_size = query.page_size();
        // u64 arithmetic: the offset can exceed u32 for valid queries.
        let offset = (u64::from(page) - 1) * u64::from(page_size);
        builder
            .push(" LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(decode_document)
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn list_all_documents(&self) -> CoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT doc FROM documents ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_document).collect()
    }

    async fn get_document_by_slug(&self, slug: &str) -> CoreResult<Option<Document>> {
        let row = sqlx::query("SELECT doc FROM documents WHERE slug = $1 LIMIT 1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_document).transpose()
    }

    async fn list_revisions(&self, document_id: &str) -> CoreResult<Vec<Revision>> {
        let rows =
            sqlx::query("SELECT rev FROM revisions WHERE document_id = $1 ORDER BY seq ASC")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(decode_revision).collect()
    }

    async fn get_revision(&self, revision_id: &str) -> CoreResult<Option<Revision>> {
        let row = sqlx::query("SELECT rev FROM revisions WHERE id = $1")
            .bind(revision_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_revision).transpose()
    }

    async fn put_media(&self, media: MediaItem) -> CoreResult<MediaItem> {
        sqlx::query(
            "INSERT INTO media (id, item) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET item = EXCLUDED.item",
        )
        .bind(&media.id)
        .bind(serde_json::to_value(&media)?)
        .execute(&self.pool)
        .await?;
        Ok(media)
    }

    async fn get_media(&self, id: &str) -> CoreResult<Option<MediaItem>> {
        let row = sqlx::query("SELECT item FROM media WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let item: serde_json::Value = r.try_get("item")?;
            serde_json::from_value(item).map_err(CoreError::from)
        })
        .transpose()
    }

    async fn list_media(&self) -> CoreResult<Vec<MediaItem>> {
        let rows = sqlx::query("SELECT item FROM media ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                let item: serde_json::Value = r.try_get("item")?;
                serde_json::from_value(item).map_err(CoreError::from)
            })
            .collect()
    }
}

#[async_trait]
impl ReleaseStore for PgStore {
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
        sqlx::query(
            "INSERT INTO release_history (kind, release_id, previous_release_id, occurred_at) \
             VALUES ($1, $2, NULL, $3)",
        )
        .bind(EventKind::ArtifactWritten.as_str())
        .bind(release_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(WrittenArtifact {
            release_id: release_id.to_string(),
            route: route.to_string(),
            path,
            content_type: content_type.to_string(),
        })
    }

    async fn write_manifest(&self, manifest: &ReleaseManifest) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO release_manifests (release_id, created_at, manifest) \
             VALUES ($1, $2, $3)",
        )
        .bind(&manifest.release_id)
        .bind(manifest.created_at)
        .bind(serde_json::to_value(manifest)?)
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            if let sqlx::Error::Database(db) = &err {
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                    return Err(CoreError::ImmutableManifest(manifest.release_id.clone()));
                }
            }
            return Err(err.into());
        }
        sqlx::query(
            "INSERT INTO release_history (kind, release_id, previous_release_id, occurred_at) \
             VALUES ($1, $2, NULL, $3)",
        )
        .bind(EventKind::ManifestWritten.as_str())
        .bind(&manifest.release_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_manifest(&self, release_id: &str) -> CoreResult<Option<ReleaseManifest>> {
        let row = sqlx::query("SELECT manifest FROM release_manifests WHERE release_id = $1")
            .bind(release_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let value: serde_json::Value = r.try_get("manifest")?;
            serde_json::from_value(value).map_err(CoreError::from)
        })
        .transpose()
    }

    async fn list_releases(&self) -> CoreResult<Vec<ReleaseManifest>> {
        let rows = sqlx::query(
            "SELECT manifest FROM release_manifests \
             ORDER BY created_at ASC, seq ASC, release_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                let value: serde_json::Value = r.try_get("manifest")?;
                serde_json::from_value(value).map_err(CoreError::from)
            })
            .collect()
    }

    async fn activate_release(&self, release_id: &str) -> CoreResult<Option<String>> {
        if self.get_manifest(release_id).await?.is_none() {
            return Err(CoreError::UnknownRelease(release_id.to_string()));
        }
        let mut tx = self.pool.begin().await?;
        // Lock the pointer row so concurrent activations serialize.
        let current: Option<String> =
            sqlx::query("SELECT release_id FROM release_pointer WHERE id = 1 FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?
                .and_then(|r| r.get("release_id"));
        if current.as_deref() == Some(release_id) {
            tx.rollback().await?;
            return Ok(current);
        }
        sqlx::query(
            "INSERT INTO release_pointer (id, release_id) VALUES (1, $1) \
             ON CONFLICT (id) DO UPDATE SET release_id = EXCLUDED.release_id",
        )
        .bind(release_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO release_history (kind, release_id, previous_release_id, occurred_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(EventKind::Activated.as_str())
        .bind(release_id)
        .bind(&current)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(release_id.to_string()))
    }

    async fn get_active_release(&self) -> CoreResult<Option<String>> {
        let row = sqlx::query("SELECT release_id FROM release_pointer WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get("release_id")))
    }

    async fn get_release_history(&self) -> CoreResult<Vec<ReleaseEvent>> {
        let rows = sqlx::query(
            "SELECT kind, release_id, previous_release_id, occurred_at \
             FROM release_history ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                let kind: String = r.get("kind");
                let kind = EventKind::parse(&kind)
                    .ok_or_else(|| CoreError::Backend(format!("unknown event kind {kind}")))?;
                Ok(ReleaseEvent {
                    kind,
                    release_id: r.get("release_id"),
                    previous_release_id: r.get("previous_release_id"),
                    at: r.get::<DateTime<Utc>, _>("occurred_at"),
                })
            })
            .collect()
    }

    fn supports_atomic_swap(&self) -> bool {
        true
    }
}
