//! End-to-end publish/activate/read flows across the in-memory and
//! key-value backends. The release-store contract must be observably
//! identical on both.

use std::sync::Arc;

use serde_json::json;

use pressroom_core::blocks;
use pressroom_core::cache::private::{CacheOutcome, Principal, PrivateRouteCache};
use pressroom_core::cache::{BlobPort, MemoryBlobStore, MemoryCache};
use pressroom_core::document::model::{DocumentInput, DocumentPatch};
use pressroom_core::events::EventBus;
use pressroom_core::release::builder::{JobStatus, PublishRequest, ReleaseBuilder};
use pressroom_core::release::store::ReleaseStore;
use pressroom_core::store::kv::{KvReleaseStore, MemoryKv};
use pressroom_core::store::memory::MemoryStore;
use pressroom_core::store::DocumentStore;
use pressroom_core::CoreError;

fn blobs() -> Arc<MemoryBlobStore> {
    Arc::new(MemoryBlobStore::new(b"test-key".to_vec()))
}

struct World {
    blobs: Arc<MemoryBlobStore>,
    store: Arc<MemoryStore>,
    builder: ReleaseBuilder,
}

fn world() -> World {
    let blobs = blobs();
    let store = Arc::new(MemoryStore::new(blobs.clone()));
    let builder = ReleaseBuilder::new(store.clone(), store.clone(), EventBus::new(16));
    World {
        blobs,
        store,
        builder,
    }
}

async fn seed_post(store: &MemoryStore, title: &str) -> String {
    store
        .create_document(
            DocumentInput {
                title: title.to_string(),
                blocks: Some(json!([
                    { "name": "core/paragraph", "attributes": { "content": title } }
                ])),
                ..Default::default()
            },
            "alice",
        )
        .await
        .unwrap()
        .id
}

fn publish() -> PublishRequest {
    PublishRequest {
        published_by: "alice".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn manifest_write_once_holds_on_both_backends() {
    let w = world();
    seed_post(&w.store, "Post").await;
    let job = w.builder.create_release(publish()).await.unwrap();
    let manifest = w.store.get_manifest(&job.release_id).await.unwrap().unwrap();

    let err = w.store.write_manifest(&manifest).await.unwrap_err();
    assert!(matches!(err, CoreError::ImmutableManifest(_)));

    let kv = KvReleaseStore::new(MemoryKv::new(), blobs());
    kv.write_manifest(&manifest).await.unwrap();
    let err = kv.write_manifest(&manifest).await.unwrap_err();
    assert!(matches!(err, CoreError::ImmutableManifest(_)));
}

#[tokio::test]
async fn forced_history_failure_rolls_back_activation() {
    let w = world();
    seed_post(&w.store, "First").await;
    let first = w.builder.create_release(publish()).await.unwrap();
    let second = w.builder.create_release(publish()).await.unwrap();
    assert_eq!(
        w.store.get_active_release().await.unwrap().as_deref(),
        Some(first.release_id.as_str())
    );

    w.store.fail_next_history_append();
    assert!(w.store.activate_release(&second.release_id).await.is_err());
    // Pointer must still be the pre-activation value.
    assert_eq!(
        w.store.get_active_release().await.unwrap().as_deref(),
        Some(first.release_id.as_str())
    );
}

#[tokio::test]
async fn history_only_ever_grows() {
    let w = world();
    seed_post(&w.store, "Post").await;
    let a = w.builder.create_release(publish()).await.unwrap();
    let after_first = w.store.get_release_history().await.unwrap();

    let b = w.builder.create_release(publish()).await.unwrap();
    w.store.activate_release(&b.release_id).await.unwrap();
    let after_second = w.store.get_release_history().await.unwrap();

    assert!(after_second.len() > after_first.len());
    // Previously returned entries are never altered.
    assert_eq!(&after_second[..after_first.len()], &after_first[..]);

    // Re-activating the active release appends nothing.
    w.store.activate_release(&b.release_id).await.unwrap();
    assert_eq!(
        w.store.get_release_history().await.unwrap().len(),
        after_second.len()
    );

    let activated: Vec<_> = after_second
        .iter()
        .filter(|e| e.kind.as_str() == "activated")
        .collect();
    assert_eq!(activated.len(), 2);
    assert_eq!(activated[0].previous_release_id, None);
    assert_eq!(
        activated[1].previous_release_id.as_deref(),
        Some(a.release_id.as_str())
    );
}

#[tokio::test]
async fn releases_list_identically_across_backends() {
    let w = world();
    seed_post(&w.store, "One").await;
    let a = w.builder.create_release(publish()).await.unwrap();
    let b = w.builder.create_release(publish()).await.unwrap();

    let memory_order: Vec<String> = w
        .store
        .list_releases()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.release_id)
        .collect();
    assert_eq!(memory_order, vec![a.release_id.clone(), b.release_id.clone()]);

    let kv = KvReleaseStore::new(MemoryKv::new(), blobs());
    for id in [&a.release_id, &b.release_id] {
        let manifest = w.store.get_manifest(id).await.unwrap().unwrap();
        kv.write_manifest(&manifest).await.unwrap();
    }
    let kv_order: Vec<String> = kv
        .list_releases()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.release_id)
        .collect();
    assert_eq!(kv_order, memory_order);
}

fn private_cache(w: &World) -> PrivateRouteCache {
    PrivateRouteCache::new(
        w.store.clone(),
        w.store.clone(),
        w.blobs.clone(),
        Arc::new(MemoryCache::new()),
        b"scope-key".to_vec(),
        300,
    )
}

#[tokio::test]
async fn principals_with_different_capabilities_never_share_cache_entries() {
    let w = world();
    seed_post(&w.store, "Hello World").await;
    w.builder.create_release(publish()).await.unwrap();
    let cache = private_cache(&w);

    let editor = Principal {
        user_id: "u1".into(),
        capabilities: vec!["edit".into()],
    };
    let viewer = Principal {
        user_id: "u2".into(),
        capabilities: vec!["view".into()],
    };

    let first = cache.fetch("hello-world", &editor).await.unwrap();
    assert_eq!(first.cache, CacheOutcome::Miss);
    let again = cache.fetch("hello-world", &editor).await.unwrap();
    assert_eq!(again.cache, CacheOutcome::Hit);

    // Same route, different capability set: still a miss.
    let other = cache.fetch("hello-world", &viewer).await.unwrap();
    assert_eq!(other.cache, CacheOutcome::Miss);
    assert_eq!(other.html, first.html);
}

#[tokio::test]
async fn release_switch_implicitly_invalidates_cache() {
    let w = world();
    seed_post(&w.store, "Hello World").await;
    w.builder.create_release(publish()).await.unwrap();
    let cache = private_cache(&w);
    let user = Principal {
        user_id: "u1".into(),
        capabilities: vec![],
    };

    cache.fetch("hello-world", &user).await.unwrap();
    assert_eq!(
        cache.fetch("hello-world", &user).await.unwrap().cache,
        CacheOutcome::Hit
    );

    let next = w.builder.create_release(publish()).await.unwrap();
    w.store.activate_release(&next.release_id).await.unwrap();
    // New release id means a new key prefix: first read misses again.
    let fetched = cache.fetch("hello-world", &user).await.unwrap();
    assert_eq!(fetched.cache, CacheOutcome::Miss);
    assert_eq!(fetched.release_id, next.release_id);
}

#[tokio::test]
async fn slug_change_after_publish_still_resolves_frozen_artifact() {
    let w = world();
    let doc_id = seed_post(&w.store, "Original Title").await;
    let job = w.builder.create_release(publish()).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // Slug changes after the release froze its routes.
    w.store
        .update_document(
            &doc_id,
            DocumentPatch {
                slug: Some("brand-new-slug".into()),
                ..Default::default()
            },
            "alice",
        )
        .await
        .unwrap();

    let cache = private_cache(&w);
    let user = Principal {
        user_id: "u1".into(),
        capabilities: vec![],
    };
    // The manifest has no artifact for the new slug; resolution falls
    // back through the document's current slug to the frozen artifact.
    let fetched = cache.fetch("brand-new-slug", &user).await.unwrap();
    assert!(fetched.html.contains("Original Title"));

    let err = cache.fetch("never-existed", &user).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn artifacts_are_readable_through_the_blob_port() {
    let w = world();
    seed_post(&w.store, "Blobbed").await;
    let job = w.builder.create_release(publish()).await.unwrap();
    let manifest = w.store.get_manifest(&job.release_id).await.unwrap().unwrap();

    let blob = w
        .blobs
        .get_blob(&manifest.artifacts[0].path)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blob.content_type, "text/html");
    let html = String::from_utf8(blob.bytes).unwrap();
    assert!(html.contains("<title>Blobbed</title>"));
    assert!(html.contains("<p>Blobbed</p>"));

    // Blocks hash matches the canonical pre-resolution tree.
    let doc = &w.store.list_all_documents().await.unwrap()[0];
    let canonical = blocks::canonical_json(&doc.blocks).unwrap();
    assert_eq!(
        manifest.artifacts[0].blocks_hash.as_deref(),
        Some(pressroom_core::release::hash::fnv1a64(canonical.as_bytes()).as_str())
    );
}
