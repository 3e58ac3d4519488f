//! Key-value release store.
//!
//! Works against any ordered key-value backend. Namespaces:
//! `manifest/{releaseId}`, `history/{seq}`, `pointer`. When the
//! backend cannot apply batches atomically the store still works, but
//! the weakening is surfaced loudly: a warning at construction and on
//! every pointer switch. The fallback writes the history event before
//! the pointer, so a failed append leaves the pointer untouched.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cache::BlobPort;
use crate::error::{CoreError, CoreResult};
use crate::release::manifest::{EventKind, ReleaseEvent, ReleaseManifest};
use crate::release::store::{artifact_path, ReleaseStore, WrittenArtifact};

/// Minimal ordered key-value contract the release store runs on.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> CoreResult<()>;
    /// All entries under a prefix, in key order.
    async fn scan_prefix(&self, prefix: &str) -> CoreResult<Vec<(String, Vec<u8>)>>;
    /// Apply several puts. Atomic only when `atomic_batches` is true.
    async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> CoreResult<()>;
    fn atomic_batches(&self) -> bool;
}

/// In-memory `KvBackend` without batch atomicity, so the documented
/// non-atomic fallback is a real, exercised code path.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_next_put: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection: fail the next single `put`.
    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> CoreResult<()> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Backend("kv put failed".into()));
        }
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> CoreResult<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> CoreResult<()> {
        for (key, value) in entries {
            self.put(&key, value).await?;
        }
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        false
    }
}

/// Stored manifest wrapper carrying the persistence sequence used as
/// the `list_releases` tiebreak.
#[derive(Serialize, Deserialize)]
struct StoredManifest {
    seq: u64,
    manifest: ReleaseManifest,
}

pub struct KvReleaseStore<K: KvBackend> {
    kv: K,
    blobs: Arc<dyn BlobPort>,
    next_seq: AtomicU64,
}

impl<K: KvBackend> KvReleaseStore<K> {
    pub fn new(kv: K, blobs: Arc<dyn BlobPort>) -> Self {
        if !kv.atomic_batches() {
            tracing::warn!(
                "kv backend has no atomic batches; pointer switches are not \
                 transactional with their history events"
            );
        }
        Self {
            kv,
            blobs,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Allocate the next history key. The counter is seeded from the
    /// backend once and then advances atomically, so two concurrent
    /// appends can never compute the same key.
    async fn next_history_key(&self) -> CoreResult<String> {
        let persisted = self.kv.scan_prefix("history/").await?.len() as u64;
        self.next_seq.fetch_max(persisted, Ordering::SeqCst);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Ok(format!("history/{seq:010}"))
    }

    async fn append_history(&self, event: &ReleaseEvent) -> CoreResult<()> {
        let key = self.next_history_key().await?;
        self.kv.put(&key, serde_json::to_vec(event)?).await
    }
}

#[async_trait]
impl<K: KvBackend> ReleaseStore for KvReleaseStore<K> {
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
        self.append_history(&ReleaseEvent {
            kind: EventKind::ArtifactWritten,
            release_id: release_id.to_string(),
            previous_release_id: None,
            at: Utc::now(),
        })
        .await?;
        Ok(WrittenArtifact {
            release_id: release_id.to_string(),
            route: route.to_string(),
            path,
            content_type: content_type.to_string(),
        })
    }

    async fn write_manifest(&self, manifest: &ReleaseManifest) -> CoreResult<()> {
        let key = format!("manifest/{}", manifest.release_id);
        if self.kv.get(&key).await?.is_some() {
            return Err(CoreError::ImmutableManifest(manifest.release_id.clone()));
        }
        let seq = self.kv.scan_prefix("manifest/").await?.len() as u64;
        let stored = serde_json::to_vec(&StoredManifest {
            seq,
            manifest: manifest.clone(),
        })?;
        let event = ReleaseEvent {
            kind: EventKind::ManifestWritten,
            release_id: manifest.release_id.clone(),
            previous_release_id: None,
            at: Utc::now(),
        };
        let history_key = self.next_history_key().await?;
        if !self.kv.atomic_batches() {
            tracing::warn!(
                release_id = %manifest.release_id,
                "writing manifest without batch atomicity"
            );
        }
        self.kv
            .put_batch(vec![(key, stored), (history_key, serde_json::to_vec(&event)?)])
            .await
    }

    async fn get_manifest(&self, release_id: &str) -> CoreResult<Option<ReleaseManifest>> {
        match self.kv.get(&format!("manifest/{release_id}")).await? {
            Some(bytes) => {
                let stored: StoredManifest = serde_json::from_slice(&bytes)?;
                Ok(Some(stored.manifest))
            }
            None => Ok(None),
        }
    }

    async fn list_releases(&self) -> CoreResult<Vec<ReleaseManifest>> {
        let mut stored: Vec<StoredManifest> = self
            .kv
            .scan_prefix("manifest/")
            .await?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(CoreError::from))
            .collect::<CoreResult<_>>()?;
        stored.sort_by(|a, b| {
            a.manifest
                .created_at
                .cmp(&b.manifest.created_at)
                .then_with(|| a.seq.cmp(&b.seq))
                .then_with(|| a.manifest.release_id.cmp(&b.manifest.release_id))
        });
        Ok(stored.into_iter().map(|s| s.manifest).collect())
    }

    async fn activate_release(&self, release_id: &str) -> CoreResult<Option<String>> {
        if self.get_manifest(release_id).await?.is_none() {
            return Err(CoreError::UnknownRelease(release_id.to_string()));
        }
        let current = self.get_active_release().await?;
        if current.as_deref() == Some(release_id) {
            return Ok(current);
        }
        let event = ReleaseEvent {
            kind: EventKind::Activated,
            release_id: release_id.to_string(),
            previous_release_id: current,
            at: Utc::now(),
        };
        let history_key = self.next_history_key().await?;
        let pointer = ("pointer".to_string(), release_id.as_bytes().to_vec());
        if self.kv.atomic_batches() {
            self.kv
                .put_batch(vec![(history_key, serde_json::to_vec(&event)?), pointer])
                .await?;
        } else {
            tracing::warn!(
                release_id,
                "activating without batch atomicity; history event is written first"
            );
            // History before pointer: a failed append must leave the
            // pointer at its pre-activation value.
            self.kv.put(&history_key, serde_json::to_vec(&event)?).await?;
            if let Err(err) = self.kv.put(&pointer.0, pointer.1).await {
                tracing::warn!(%err, release_id, "pointer write failed after history append");
                return Err(err);
            }
        }
        Ok(Some(release_id.to_string()))
    }

    async fn get_active_release(&self) -> CoreResult<Option<String>> {
        Ok(self
            .kv
            .get("pointer")
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn get_release_history(&self) -> CoreResult<Vec<ReleaseEvent>> {
        self.kv
            .scan_prefix("history/")
            .await?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(CoreError::from))
            .collect()
    }

    fn supports_atomic_swap(&self) -> bool {
        self.kv.atomic_batches()
    }
}
