//! Release fingerprinting.
//!
//! Artifact and release hashes are deterministic, non-cryptographic
//! content fingerprints (FNV-1a 64), computed over canonical JSON so
//! key order never leaks into the hash. `content_hash` identifies pure
//! content; `release_hash` additionally binds the publish event (id,
//! timestamp, publisher). The two answer different questions and are
//! never interchangeable.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a over raw bytes, hex-encoded.
pub fn fnv1a64(bytes: &[u8]) -> String {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// Serialize a JSON value with recursively sorted object keys.
pub fn canonical_json_string(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = Map::new();
                for k in keys {
                    out.insert(k.clone(), sort(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// Fingerprint of pure content identity: schema, provenance and the
/// per-artifact hashes. Identical content republished yields the same
/// value.
pub fn content_hash(
    schema_version: u32,
    source_revision_set: &[String],
    artifact_hashes: &[String],
    block_hashes: &[Option<String>],
) -> String {
    let value = json!({
        "schemaVersion": schema_version,
        "sourceRevisionSet": source_revision_set,
        "artifactHashes": artifact_hashes,
        "blockHashes": block_hashes,
    });
    fnv1a64(canonical_json_string(&value).as_bytes())
}

/// Fingerprint of the publish event itself: everything in
/// `content_hash` plus release id, creation time and publisher.
#[allow(clippy::too_many_arguments)]
pub fn release_hash(
    release_id: &str,
    schema_version: u32,
    created_at: DateTime<Utc>,
    published_by: &str,
    source_revision_id: Option<&str>,
    source_revision_set: &[String],
    artifact_hashes: &[String],
    block_hashes: &[Option<String>],
) -> String {
    let value = json!({
        "releaseId": release_id,
        "schemaVersion": schema_version,
        "createdAt": created_at.to_rfc3339(),
        "publishedBy": published_by,
        "sourceRevisionId": source_revision_id,
        "sourceRevisionSet": source_revision_set,
        "artifactHashes": artifact_hashes,
        "blockHashes": block_hashes,
    });
    fnv1a64(canonical_json_string(&value).as_bytes())
}
