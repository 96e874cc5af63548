pub mod authenticator;
pub mod client_data;
pub mod types;
pub mod verify;

#[cfg(test)]
pub(crate) mod sim;

use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Relying party identity the ceremonies verify against
#[derive(Debug, Clone)]
pub struct RelyingParty {
    pub id: String,
    pub origin: String,
    pub name: String,
}

impl RelyingParty {
    pub fn from_config(config: &Config) -> Result<Self> {
        let rp_origin_raw = config.webauthn.rp_origin.trim();
        let rp_origin = url::Url::parse(rp_origin_raw).or_else(|_| {
            if rp_origin_raw.contains("://") {
                Err(url::ParseError::RelativeUrlWithoutBase)
            } else {
                url::Url::parse(&format!("http://{}", rp_origin_raw))
            }
        });
        let rp_origin = rp_origin.map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid rp_origin: {} (expected like http://localhost:3000)",
                rp_origin_raw
            ))
        })?;

        Ok(Self {
            id: config.webauthn.rp_id.clone(),
            origin: rp_origin.as_str().trim_end_matches('/').to_string(),
            name: config.webauthn.rp_name.clone(),
        })
    }
}

/// Generate a cryptographically secure 32-byte challenge
pub fn generate_challenge() -> Vec<u8> {
    let rng = SystemRandom::new();
    let mut challenge = vec![0u8; 32];
    rng.fill(&mut challenge)
        .expect("Failed to generate random challenge");
    challenge
}

/// Random URL-safe token for anonymous ceremony keys and hand-off ids
pub fn random_token() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes).expect("Failed to generate random token");
    b64_encode(&bytes)
}

pub fn b64_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| AppError::VerificationFailed("Invalid base64url field".to_string()))
}
