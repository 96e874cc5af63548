use aws_lc_rs::digest::{digest, SHA256};
use ciborium::Value;

use crate::error::{AppError, Result};

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_DATA: u8 = 0x40;

/// Parsed authenticator data.
///
/// Layout: rpIdHash (32) | flags (1) | signCount (4, big-endian) |
/// attested credential data when the AT flag is set.
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredentialData>,
    /// Raw bytes, needed as the signature base during assertions
    pub raw: Vec<u8>,
}

/// Credential material embedded at registration time
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE key, raw CBOR bytes
    pub cose_key: Vec<u8>,
    pub algorithm: i64,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 37 {
            return Err(AppError::VerificationFailed(
                "Authenticator data too short".to_string(),
            ));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_ATTESTED_DATA != 0 {
            Some(parse_attested_credential_data(&bytes[37..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
            raw: bytes.to_vec(),
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    pub fn verify_rp_id_hash(&self, rp_id: &str) -> Result<()> {
        let expected = digest(&SHA256, rp_id.as_bytes());
        if expected.as_ref() != self.rp_id_hash {
            return Err(AppError::VerificationFailed("RP id hash mismatch".to_string()));
        }
        Ok(())
    }

    /// Common checks both ceremonies share
    pub fn verify_common(&self, rp_id: &str) -> Result<()> {
        self.verify_rp_id_hash(rp_id)?;
        if !self.user_present() {
            return Err(AppError::VerificationFailed(
                "User presence flag not set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_attested_credential_data(bytes: &[u8]) -> Result<AttestedCredentialData> {
    // aaguid (16) | credentialIdLength (2) | credentialId | COSE key
    if bytes.len() < 18 {
        return Err(AppError::VerificationFailed(
            "Attested credential data too short".to_string(),
        ));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..16]);

    let id_len = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
    if bytes.len() < 18 + id_len + 1 {
        return Err(AppError::VerificationFailed(
            "Attested credential data truncated".to_string(),
        ));
    }

    let credential_id = bytes[18..18 + id_len].to_vec();
    let cose_key = bytes[18 + id_len..].to_vec();
    let algorithm = cose_algorithm(&cose_key)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        cose_key,
        algorithm,
    })
}

/// Extract the attested authenticator data out of a CBOR attestation object.
/// The attestation statement itself is not chain-verified: options request
/// `attestation: "none"`, and the challenge binding lives in clientDataJSON.
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AuthenticatorData> {
    let attestation: Value = ciborium::from_reader(bytes)
        .map_err(|_| AppError::VerificationFailed("Malformed attestation object".to_string()))?;

    let auth_data = attestation
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_text() == Some("authData")))
        .and_then(|(_, v)| v.as_bytes())
        .ok_or_else(|| {
            AppError::VerificationFailed("Missing authData in attestation".to_string())
        })?;

    let parsed = AuthenticatorData::parse(auth_data)?;
    if parsed.attested.is_none() {
        return Err(AppError::VerificationFailed(
            "No attested credential data present".to_string(),
        ));
    }
    Ok(parsed)
}

/// Read the algorithm label (3) out of a COSE key
pub fn cose_algorithm(cose_key: &[u8]) -> Result<i64> {
    let value: Value = ciborium::from_reader(cose_key)
        .map_err(|_| AppError::VerificationFailed("Malformed COSE key".to_string()))?;

    value
        .as_map()
        .and_then(|m| m.iter().find(|(k, _)| k.as_integer() == Some(3.into())))
        .and_then(|(_, v)| v.as_integer())
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| AppError::VerificationFailed("COSE key missing algorithm".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::sim::SoftAuthenticator;
    use crate::webauthn::{b64_decode, b64_encode};

    #[test]
    fn parses_simulated_registration_authdata() {
        let authenticator = SoftAuthenticator::new();
        let credential = authenticator.register(
            &b64_encode(b"some-challenge-bytes"),
            "nestegg.app",
            "https://nestegg.app",
        );

        let bytes = b64_decode(&credential.response.attestation_object).unwrap();
        let auth_data = parse_attestation_object(&bytes).unwrap();

        assert!(auth_data.user_present());
        assert_eq!(auth_data.sign_count, 0);
        auth_data.verify_rp_id_hash("nestegg.app").unwrap();

        let attested = auth_data.attested.unwrap();
        assert_eq!(attested.algorithm, -7);
        assert_eq!(attested.credential_id, authenticator.credential_id());
    }

    #[test]
    fn rejects_truncated_authdata() {
        let err = AuthenticatorData::parse(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[test]
    fn rejects_wrong_rp_id_hash() {
        let authenticator = SoftAuthenticator::new();
        let assertion = authenticator.sign_assertion(
            &b64_encode(b"some-challenge-bytes"),
            "nestegg.app",
            "https://nestegg.app",
            1,
        );

        let bytes = b64_decode(&assertion.response.authenticator_data).unwrap();
        let auth_data = AuthenticatorData::parse(&bytes).unwrap();
        let err = auth_data.verify_rp_id_hash("other.example").unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }

    #[test]
    fn rejects_garbage_attestation_object() {
        let err = parse_attestation_object(b"\xffgarbage").unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
    }
}
