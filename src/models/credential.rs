use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered passkey. `public_key` holds the raw COSE key bytes used to
/// verify assertions; it is never serialized into API responses.
#[derive(Debug, Clone, FromRow)]
pub struct PasskeyCredential {
    pub id: String,
    pub user_id: String,
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub algorithm: i64,
    pub sign_counter: i64,
    pub transports: Option<String>,
    pub display_name: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl PasskeyCredential {
    pub fn transport_hints(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// Insert payload for a freshly verified credential
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_id: String,
    pub credential_id: String,
    pub public_key: Vec<u8>,
    pub algorithm: i64,
    pub sign_counter: i64,
    pub transports: Option<Vec<String>>,
    pub display_name: String,
}

/// Credential summary exposed over the API (no key material)
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub credential_id: String,
    pub display_name: String,
    pub transports: Vec<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl From<PasskeyCredential> for CredentialSummary {
    fn from(c: PasskeyCredential) -> Self {
        let transports = c.transport_hints();
        Self {
            id: c.id,
            credential_id: c.credential_id,
            display_name: c.display_name,
            transports,
            created_at: c.created_at,
            last_used_at: c.last_used_at,
        }
    }
}

/// Which ceremony a cached challenge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengePurpose {
    Registration,
    Authentication,
}

impl ChallengePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengePurpose::Registration => "registration",
            ChallengePurpose::Authentication => "authentication",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "registration" => ChallengePurpose::Registration,
            _ => ChallengePurpose::Authentication,
        }
    }
}

/// Server-held ceremony state between begin and finish, single-use
#[derive(Debug, Clone, FromRow)]
pub struct PendingChallenge {
    pub key: String,
    pub challenge: String,
    pub purpose: String,
    pub expires_at: String,
    pub created_at: String,
}

impl PendingChallenge {
    pub fn purpose(&self) -> ChallengePurpose {
        ChallengePurpose::from_str(&self.purpose)
    }
}

/// Terminal and non-terminal states of a cross-device hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffStatus {
    Pending,
    Success,
    Failure,
    Expired,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::Pending => "pending",
            HandoffStatus::Success => "success",
            HandoffStatus::Failure => "failure",
            HandoffStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => HandoffStatus::Success,
            "failure" => HandoffStatus::Failure,
            "expired" => HandoffStatus::Expired,
            _ => HandoffStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HandoffStatus::Pending)
    }
}

/// Cross-device registration hand-off session
#[derive(Debug, Clone, FromRow)]
pub struct HandoffSession {
    pub id: String,
    pub email: String,
    pub options_json: String,
    pub status: String,
    pub result_detail: Option<String>,
    pub expires_at: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl HandoffSession {
    pub fn status(&self) -> HandoffStatus {
        HandoffStatus::from_str(&self.status)
    }
}
