//! Cache and blob ports plus their in-memory implementations, and the
//! capability-scoped private-route cache.

pub mod private;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};

type HmacSha256 = Hmac<Sha256>;

/// Key/value cache with TTL. Values are serialized by the caller.
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> CoreResult<()>;
    async fn del(&self, key: &str) -> CoreResult<()>;
}

/// In-memory cache with wall-clock expiry, checked on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires)) if *expires > Utc::now() => {
                    return Ok(Some(value.clone()))
                }
                Some(_) => {}
            }
        }
        // Expired: evict under the write lock, re-checking in case a
        // concurrent `set` refreshed the entry.
        let mut entries = self.entries.write().await;
        if let Some((_, expires)) = entries.get(key) {
            if *expires <= Utc::now() {
                entries.remove(key);
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> CoreResult<()> {
        let expires = Utc::now() + Duration::seconds(ttl_seconds as i64);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// A stored blob with its metadata.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Write-mostly blob storage for release artifacts.
#[async_trait]
pub trait BlobPort: Send + Sync {
    /// Store bytes under a path, returning the path as the blob ref.
    async fn put_blob(&self, path: &str, bytes: &[u8], content_type: &str) -> CoreResult<String>;

    async fn get_blob(&self, path: &str) -> CoreResult<Option<Blob>>;

    /// A time-limited, signature-protected read URL for the blob.
    async fn signed_read_url(&self, path: &str, ttl_seconds: u64) -> CoreResult<String>;
}

/// In-memory blob store. Signed URLs use the same HMAC scheme as the
/// preview service so the HTTP layer can verify them uniformly.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Blob>>,
    signing_key: Vec<u8>,
}

impl MemoryBlobStore {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            signing_key: signing_key.into(),
        }
    }
}

#[async_trait]
impl BlobPort for MemoryBlobStore {
    async fn put_blob(&self, path: &str, bytes: &[u8], content_type: &str) -> CoreResult<String> {
        self.blobs.write().await.insert(
            path.to_string(),
            Blob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(path.to_string())
    }

    async fn get_blob(&self, path: &str) -> CoreResult<Option<Blob>> {
        Ok(self.blobs.read().await.get(path).cloned())
    }

    async fn signed_read_url(&self, path: &str, ttl_seconds: u64) -> CoreResult<String> {
        let expires = (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp();
        let sig = sign(&self.signing_key, &format!("{path}:{expires}"))?;
        Ok(format!("/blobs/{path}?expires={expires}&sig={sig}"))
    }
}

/// Hex HMAC-SHA256 of a message.
pub(crate) fn sign(key: &[u8], message: &str) -> CoreResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CoreError::Backend(format!("hmac key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification of a hex HMAC-SHA256 signature.
pub(crate) fn verify(key: &[u8], message: &str, signature: &str) -> CoreResult<bool> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CoreError::Backend(format!("hmac key: {e}")))?;
    mac.update(message.as_bytes());
    let decoded = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };
    Ok(mac.verify_slice(&decoded).is_ok())
}

/// Derive the capability scope of a principal: an HMAC over the user
/// id and the sorted capability list. Two principals share a scope
/// only when their capability sets are identical.
pub fn capability_scope(key: &[u8], user_id: &str, capabilities: &[String]) -> CoreResult<String> {
    let mut caps: Vec<&str> = capabilities.iter().map(String::as_str).collect();
    caps.sort_unstable();
    caps.dedup();
    sign(key, &format!("{user_id}|{}", caps.join(",")))
}

/// A shared handle to any cache implementation.
pub type SharedCache = Arc<dyn CachePort>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.set("k", "v".into(), 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        // The expired entry is evicted by the read, not just hidden.
        assert!(cache.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn blob_roundtrip_and_signed_url() {
        let blobs = MemoryBlobStore::new(b"test-key".to_vec());
        blobs.put_blob("a/b.html", b"<p>x</p>", "text/html").await.unwrap();
        let blob = blobs.get_blob("a/b.html").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"<p>x</p>");
        let url = blobs.signed_read_url("a/b.html", 300).await.unwrap();
        assert!(url.starts_with("/blobs/a/b.html?expires="));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn scope_depends_on_capability_set_not_order() {
        let key = b"scope-key";
        let a = capability_scope(key, "u1", &["read".into(), "admin".into()]).unwrap();
        let b = capability_scope(key, "u1", &["admin".into(), "read".into()]).unwrap();
        let c = capability_scope(key, "u1", &["read".into()]).unwrap();
        let d = capability_scope(key, "u2", &["read".into(), "admin".into()]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = b"k";
        let sig = sign(key, "msg").unwrap();
        assert!(verify(key, "msg", &sig).unwrap());
        assert!(!verify(key, "other", &sig).unwrap());
        assert!(!verify(key, "msg", "zz-not-hex").unwrap());
    }
}
