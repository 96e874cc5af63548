use aws_lc_rs::digest::{digest, SHA256};
use aws_lc_rs::signature::{
    RsaPublicKeyComponents, UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ED25519,
    RSA_PKCS1_2048_8192_SHA256,
};
use ciborium::Value;

use crate::error::{AppError, Result};

/// Assertion signature base: authenticatorData || SHA-256(clientDataJSON)
pub fn assertion_signature_base(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_data_hash = digest(&SHA256, client_data_json);
    let mut signed = Vec::with_capacity(authenticator_data.len() + 32);
    signed.extend_from_slice(authenticator_data);
    signed.extend_from_slice(client_data_hash.as_ref());
    signed
}

/// Verify a signature against a stored COSE key using the credential's
/// registered algorithm
pub fn verify_signature(
    cose_key: &[u8],
    algorithm: i64,
    signed_data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match algorithm {
        -8 => verify_eddsa(cose_key, signed_data, signature),
        -7 => verify_es256(cose_key, signed_data, signature),
        -257 => verify_rs256(cose_key, signed_data, signature),
        other => Err(AppError::VerificationFailed(format!(
            "Unsupported algorithm: {}",
            other
        ))),
    }
}

fn cose_map(cose_key: &[u8]) -> Result<Vec<(Value, Value)>> {
    let value: Value = ciborium::from_reader(cose_key)
        .map_err(|_| AppError::VerificationFailed("Malformed COSE key".to_string()))?;
    value
        .as_map()
        .cloned()
        .ok_or_else(|| AppError::VerificationFailed("COSE key is not a map".to_string()))
}

fn cose_bytes(map: &[(Value, Value)], label: i64, what: &str) -> Result<Vec<u8>> {
    map.iter()
        .find(|(k, _)| k.as_integer() == Some(label.into()))
        .and_then(|(_, v)| v.as_bytes())
        .cloned()
        .ok_or_else(|| AppError::VerificationFailed(format!("COSE key missing {}", what)))
}

/// EdDSA (Ed25519), COSE OKP key: x at label -2
fn verify_eddsa(cose_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()> {
    let map = cose_map(cose_key)?;
    let x = cose_bytes(&map, -2, "x coordinate")?;
    if x.len() != 32 {
        return Err(AppError::VerificationFailed(
            "Invalid Ed25519 public key length".to_string(),
        ));
    }

    UnparsedPublicKey::new(&ED25519, &x)
        .verify(signed_data, signature)
        .map_err(|_| AppError::VerificationFailed("EdDSA signature invalid".to_string()))
}

/// ES256 (ECDSA P-256/SHA-256), COSE EC2 key: x at -2, y at -3
fn verify_es256(cose_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()> {
    let map = cose_map(cose_key)?;
    let x = cose_bytes(&map, -2, "x coordinate")?;
    let y = cose_bytes(&map, -3, "y coordinate")?;

    // Uncompressed SEC1 point: 0x04 || x || y
    let mut public_key = Vec::with_capacity(1 + x.len() + y.len());
    public_key.push(0x04);
    public_key.extend_from_slice(&x);
    public_key.extend_from_slice(&y);

    UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &public_key)
        .verify(signed_data, signature)
        .map_err(|_| AppError::VerificationFailed("ES256 signature invalid".to_string()))
}

/// RS256 (RSASSA-PKCS1-v1_5/SHA-256), COSE RSA key: n at -1, e at -2
fn verify_rs256(cose_key: &[u8], signed_data: &[u8], signature: &[u8]) -> Result<()> {
    let map = cose_map(cose_key)?;
    let n = cose_bytes(&map, -1, "modulus")?;
    let e = cose_bytes(&map, -2, "exponent")?;

    RsaPublicKeyComponents { n: &n, e: &e }
        .verify(&RSA_PKCS1_2048_8192_SHA256, signed_data, signature)
        .map_err(|_| AppError::VerificationFailed("RS256 signature invalid".to_string()))
}
