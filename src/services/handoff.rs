use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::db::{Database, HandoffStore};
use crate::error::{AppError, Result};
use crate::models::{HandoffSession, HandoffStatus};
use crate::services::PasskeyService;
use crate::webauthn::random_token;

/// Cross-device registration hand-off.
///
/// Device A creates a session wrapping freshly issued registration options
/// and shares its URL (typically as a QR code). Device B dereferences the
/// session, runs the standard registration ceremony, then reports the
/// outcome. Device A polls the status until it observes a terminal state;
/// the TTL guarantees it never waits on `pending` forever.
pub struct HandoffService;

#[derive(Debug, Clone, Serialize)]
pub struct HandoffCreated {
    pub session_id: String,
    pub handoff_url: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffPayload {
    pub email: String,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffStatusView {
    pub status: HandoffStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HandoffService {
    pub async fn create(db: &Database, config: &Config, email: &str) -> Result<HandoffCreated> {
        // Issue the registration ceremony up front so Device B only has to
        // run the platform ceremony and the standard finish call
        let options = PasskeyService::begin_registration(db, config, email).await?;
        let options_json = serde_json::to_string(&options)
            .map_err(|_| AppError::Internal("Serialize hand-off options failed".to_string()))?;

        let session_id = random_token();
        HandoffStore::insert(
            db,
            &session_id,
            email,
            &options_json,
            config.webauthn.handoff_ttl_secs,
        )
        .await?;

        let origin = config.webauthn.rp_origin.trim_end_matches('/');
        let session = HandoffStore::find(db, &session_id)
            .await?
            .ok_or(AppError::SessionNotFound)?;

        Ok(HandoffCreated {
            handoff_url: format!("{}/passkey/session/{}", origin, session_id),
            session_id,
            expires_at: session.expires_at,
        })
    }

    /// Device B's dereference: only a live pending session is usable
    pub async fn fetch(db: &Database, session_id: &str) -> Result<HandoffPayload> {
        let session = Self::load(db, session_id).await?;
        if session.status() != HandoffStatus::Pending || Self::is_expired(&session) {
            return Err(AppError::SessionNotFound);
        }

        let options = serde_json::from_str(&session.options_json)
            .map_err(|_| AppError::Internal("Corrupt hand-off options".to_string()))?;

        Ok(HandoffPayload {
            email: session.email,
            options,
        })
    }

    /// Device B's terminal report, at most once per session
    pub async fn complete(
        db: &Database,
        session_id: &str,
        success: bool,
        detail: Option<&str>,
    ) -> Result<HandoffStatusView> {
        let status = if success {
            HandoffStatus::Success
        } else {
            HandoffStatus::Failure
        };

        HandoffStore::complete(db, session_id, status, detail).await?;
        tracing::info!(session_id = %session_id, status = %status.as_str(), "hand-off completed");

        Ok(HandoffStatusView {
            status,
            detail: detail.map(|d| d.to_string()),
        })
    }

    /// Device A's poll. An expired pending session reports `expired`, a
    /// terminal state, so pollers always converge.
    pub async fn status(db: &Database, session_id: &str) -> Result<HandoffStatusView> {
        let session = Self::load(db, session_id).await?;

        let status = match session.status() {
            HandoffStatus::Pending if Self::is_expired(&session) => HandoffStatus::Expired,
            other => other,
        };

        Ok(HandoffStatusView {
            status,
            detail: session.result_detail,
        })
    }

    async fn load(db: &Database, session_id: &str) -> Result<HandoffSession> {
        HandoffStore::find(db, session_id)
            .await?
            .ok_or(AppError::SessionNotFound)
    }

    fn is_expired(session: &HandoffSession) -> bool {
        chrono::DateTime::parse_from_rfc3339(&session.expires_at)
            .map(|exp| exp < Utc::now())
            .unwrap_or(true)
    }
}
