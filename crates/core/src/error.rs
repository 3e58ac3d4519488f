use thiserror::Error;

/// Error taxonomy shared by every core module.
///
/// Validation failures are rejected before any store mutation;
/// immutability and unknown-release violations are fatal for the call
/// and never retried; serialization failures are recovered per
/// artifact by the release builder rather than aborting a publish.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("manifest already exists for release {0}")]
    ImmutableManifest(String),

    #[error("unknown release: {0}")]
    UnknownRelease(String),

    #[error("preview signature invalid")]
    InvalidSignature,

    #[error("preview expired")]
    Expired,

    #[error("serialization: {0}")]
    Serialization(String),

    #[error("backend: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Convenience alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
