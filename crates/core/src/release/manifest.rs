use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest schema version; bump when the manifest shape changes.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// One rendered HTML output for one document within a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// The document slug at publish time.
    pub route: String,
    /// Blob path; keyed by document id so a later slug change can
    /// still be resolved back to this artifact.
    pub path: String,
    /// FNV-1a over the final artifact bytes.
    pub hash: String,
    /// Hash of the canonical pre-resolution block tree; `None` when
    /// the tree failed normalization and the legacy body was used.
    pub blocks_hash: Option<String>,
    pub content_type: String,
}

/// The structured record describing a release. Write-once per
/// release id on every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseManifest {
    pub release_id: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub published_by: String,
    pub source_revision_id: Option<String>,
    pub source_revision_set: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub artifact_hashes: Vec<String>,
    pub block_hashes: Vec<Option<String>>,
    /// Pure content identity.
    pub content_hash: String,
    /// Content identity plus the publish event itself.
    pub release_hash: String,
}

/// Kinds of entries in the append-only release history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ArtifactWritten,
    ManifestWritten,
    Activated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ArtifactWritten => "artifact_written",
            EventKind::ManifestWritten => "manifest_written",
            EventKind::Activated => "activated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "artifact_written" => Some(EventKind::ArtifactWritten),
            "manifest_written" => Some(EventKind::ManifestWritten),
            "activated" => Some(EventKind::Activated),
            _ => None,
        }
    }
}

/// One entry in the release history. Appended, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub release_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_release_id: Option<String>,
    pub at: DateTime<Utc>,
}
