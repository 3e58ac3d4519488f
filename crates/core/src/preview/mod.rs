//! Short-lived, HMAC-signed preview tokens.
//!
//! A preview is a fully rendered HTML snapshot taken at issuance; it
//! never updates when the document changes and is not part of any
//! release lineage. Expiry is a strict wall-clock comparison at read
//! time.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cache::{sign, verify};
use crate::error::{CoreError, CoreResult};

/// TTL clamp bounds and the fallback when configuration is absent or
/// below the minimum.
pub const MIN_TTL_SECONDS: u64 = 30;
pub const MAX_TTL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct PreviewSession {
    pub preview_token: String,
    pub document_id: String,
    /// Identifies the ephemeral snapshot this preview reads from.
    /// Release-like, but outside any release lineage.
    pub release_like_ref: String,
    pub expires_at: DateTime<Utc>,
    pub created_by: String,
    pub html: String,
}

/// What `issue` hands back to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedPreview {
    pub preview_token: String,
    pub signature: String,
    pub expires_at: DateTime<Utc>,
    pub url: String,
}

pub struct PreviewService {
    key: Vec<u8>,
    sessions: RwLock<HashMap<String, PreviewSession>>,
}

impl PreviewService {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Clamp a configured TTL into `[MIN, MAX]`; anything absent or
    /// below the minimum falls back to the default.
    pub fn clamp_ttl(ttl_seconds: Option<u64>) -> u64 {
        match ttl_seconds {
            Some(ttl) if ttl >= MIN_TTL_SECONDS => ttl.min(MAX_TTL_SECONDS),
            _ => DEFAULT_TTL_SECONDS,
        }
    }

    /// Issue a token bound to an already-rendered HTML snapshot.
    pub async fn issue(
        &self,
        document_id: &str,
        html: String,
        ttl_seconds: Option<u64>,
        created_by: &str,
    ) -> CoreResult<IssuedPreview> {
        let ttl = Self::clamp_ttl(ttl_seconds);
        let mut token_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);
        let signature = sign(&self.key, &token)?;
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl as i64);

        let mut sessions = self.sessions.write().await;
        // Expired snapshots are dead weight; drop them while the write
        // lock is held anyway.
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            token.clone(),
            PreviewSession {
                preview_token: token.clone(),
                document_id: document_id.to_string(),
                release_like_ref: format!("prevrel_{}", Uuid::new_v4().simple()),
                expires_at,
                created_by: created_by.to_string(),
                html,
            },
        );
        drop(sessions);

        let url = format!("/preview/{token}?sig={signature}");
        Ok(IssuedPreview {
            preview_token: token,
            signature,
            expires_at,
            url,
        })
    }

    /// Verify a signature and return the snapshot, enforcing expiry
    /// against `now`.
    pub async fn redeem(
        &self,
        token: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PreviewSession> {
        if !verify(&self.key, token, signature)? {
            return Err(CoreError::InvalidSignature);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("preview {token}")))?;
        if session.expires_at <= now {
            sessions.remove(token);
            return Err(CoreError::Expired);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PreviewService {
        PreviewService::new(b"preview-key".to_vec())
    }

    #[test]
    fn ttl_clamps_to_bounds() {
        assert_eq!(PreviewService::clamp_ttl(None), DEFAULT_TTL_SECONDS);
        assert_eq!(PreviewService::clamp_ttl(Some(5)), DEFAULT_TTL_SECONDS);
        assert_eq!(PreviewService::clamp_ttl(Some(60)), 60);
        assert_eq!(
            PreviewService::clamp_ttl(Some(48 * 60 * 60)),
            MAX_TTL_SECONDS
        );
    }

    #[tokio::test]
    async fn issue_and_redeem_roundtrip() {
        let svc = service();
        let issued = svc
            .issue("doc_1", "<p>draft</p>".into(), Some(300), "alice")
            .await
            .unwrap();
        assert_eq!(issued.url, format!("/preview/{}?sig={}", issued.preview_token, issued.signature));

        let session = svc
            .redeem(&issued.preview_token, &issued.signature, Utc::now())
            .await
            .unwrap();
        assert_eq!(session.document_id, "doc_1");
        assert_eq!(session.html, "<p>draft</p>");
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let svc = service();
        let issued = svc
            .issue("doc_1", "<p>x</p>".into(), Some(300), "alice")
            .await
            .unwrap();
        let err = svc
            .redeem(&issued.preview_token, "deadbeef", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSignature));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_at_read_time() {
        let svc = service();
        let issued = svc
            .issue("doc_1", "<p>x</p>".into(), Some(60), "alice")
            .await
            .unwrap();
        // Exactly at expiry counts as expired.
        let err = svc
            .redeem(&issued.preview_token, &issued.signature, issued.expires_at)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Expired));
        // The expired snapshot is evicted, not kept around.
        assert!(svc.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn issuing_purges_expired_snapshots() {
        let svc = service();
        let stale = svc
            .issue("doc_1", "<p>old</p>".into(), Some(60), "alice")
            .await
            .unwrap();
        svc.sessions
            .write()
            .await
            .get_mut(&stale.preview_token)
            .unwrap()
            .expires_at = Utc::now() - Duration::seconds(1);

        let fresh = svc
            .issue("doc_2", "<p>new</p>".into(), Some(60), "alice")
            .await
            .unwrap();

        let sessions = svc.sessions.read().await;
        assert!(!sessions.contains_key(&stale.preview_token));
        assert!(sessions.contains_key(&fresh.preview_token));
    }

    #[tokio::test]
    async fn sessions_carry_a_release_like_ref() {
        let svc = service();
        let issued = svc
            .issue("doc_1", "<p>x</p>".into(), Some(300), "alice")
            .await
            .unwrap();
        let session = svc
            .redeem(&issued.preview_token, &issued.signature, Utc::now())
            .await
            .unwrap();
        assert!(session.release_like_ref.starts_with("prevrel_"));
    }

    #[tokio::test]
    async fn snapshot_is_frozen_at_issuance() {
        let svc = service();
        let issued = svc
            .issue("doc_1", "<p>version one</p>".into(), Some(300), "alice")
            .await
            .unwrap();
        // The underlying document changing has no effect; redeem
        // returns the snapshot taken at issuance.
        let session = svc
            .redeem(&issued.preview_token, &issued.signature, Utc::now())
            .await
            .unwrap();
        assert_eq!(session.html, "<p>version one</p>");
    }
}
