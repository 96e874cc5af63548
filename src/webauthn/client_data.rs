use serde::Deserialize;

use crate::error::{AppError, Result};

/// Ceremony type bound into the client data by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyType {
    Create,
    Get,
}

impl CeremonyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyType::Create => "webauthn.create",
            CeremonyType::Get => "webauthn.get",
        }
    }
}

/// Parsed clientDataJSON
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub type_: String,
    /// Challenge echo, base64url
    pub challenge: String,
    pub origin: String,
}

impl CollectedClientData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|_| AppError::VerificationFailed("Malformed clientDataJSON".to_string()))
    }

    /// Check ceremony type, challenge echo and origin against expectations.
    /// Type and origin mismatches are security rejections; a challenge
    /// mismatch surfaces as a stale ceremony.
    pub fn verify(
        &self,
        expected_type: CeremonyType,
        expected_challenge: &str,
        expected_origin: &str,
    ) -> Result<()> {
        if self.type_ != expected_type.as_str() {
            return Err(AppError::VerificationFailed(format!(
                "Unexpected client data type: {}",
                self.type_
            )));
        }

        // A challenge echo that differs from the cached one means the client
        // answered a ceremony that is no longer pending (superseded by a
        // later begin, or never issued): a staleness case, not a forgery.
        if self.challenge != expected_challenge {
            return Err(AppError::NoPendingChallenge);
        }

        let origin = self.origin.trim_end_matches('/');
        if origin != expected_origin.trim_end_matches('/') {
            return Err(AppError::VerificationFailed(format!(
                "Origin mismatch: {}",
                self.origin
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_data(type_: &str, challenge: &str, origin: &str) -> CollectedClientData {
        let json = serde_json::json!({
            "type": type_,
            "challenge": challenge,
            "origin": origin,
        });
        CollectedClientData::parse(json.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn accepts_matching_client_data() {
        let cd = client_data("webauthn.create", "abc", "https://nestegg.app");
        cd.verify(CeremonyType::Create, "abc", "https://nestegg.app")
            .unwrap();
    }

    #[test]
    fn rejects_wrong_ceremony_type() {
        let cd = client_data("webauthn.get", "abc", "https://nestegg.app");
        let err = cd
            .verify(CeremonyType::Create, "abc", "https://nestegg.app")
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[test]
    fn challenge_mismatch_reads_as_stale_ceremony() {
        let cd = client_data("webauthn.create", "abc", "https://nestegg.app");
        let err = cd
            .verify(CeremonyType::Create, "xyz", "https://nestegg.app")
            .unwrap_err();
        assert!(matches!(err, AppError::NoPendingChallenge));
    }

    #[test]
    fn rejects_origin_mismatch() {
        let cd = client_data("webauthn.create", "abc", "https://evil.example");
        let err = cd
            .verify(CeremonyType::Create, "abc", "https://nestegg.app")
            .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[test]
    fn trailing_slash_on_origin_is_tolerated() {
        let cd = client_data("webauthn.get", "abc", "https://nestegg.app/");
        cd.verify(CeremonyType::Get, "abc", "https://nestegg.app")
            .unwrap();
    }

    #[test]
    fn malformed_json_is_a_verification_failure() {
        let err = CollectedClientData::parse(b"not json").unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }
}
