use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by document writes and publishes.
/// Consumers subscribe through the bus; nothing in the core blocks on
/// delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PressroomEvent {
    DocumentWritten(DocumentWritten),
    PublishStarted(PublishStarted),
    PublishCompleted(PublishCompleted),
    ReleaseActivated(ReleaseActivated),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWritten {
    pub document_id: String,
    pub revision_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStarted {
    pub release_id: String,
    pub published_by: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishCompleted {
    pub release_id: String,
    pub artifact_count: usize,
    pub activated: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseActivated {
    pub release_id: String,
    pub previous_release_id: Option<String>,
    pub at: DateTime<Utc>,
}
