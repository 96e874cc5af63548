//! Software authenticator used by tests to drive full ceremonies.

use aws_lc_rs::digest::{digest, SHA256};
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use aws_lc_rs::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use ciborium::Value;

use crate::webauthn::b64_encode;
use crate::webauthn::types::{
    AssertionResponse, AttestationResponse, AuthenticationCredential, RegistrationCredential,
};

const FLAGS_REGISTRATION: u8 = 0x45; // UP | UV | AT
const FLAGS_ASSERTION: u8 = 0x05; // UP | UV

pub struct SoftAuthenticator {
    key_pair: EcdsaKeyPair,
    credential_id: Vec<u8>,
}

impl SoftAuthenticator {
    pub fn new() -> Self {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, document.as_ref())
            .expect("parse generated key");

        let mut credential_id = vec![0u8; 16];
        rng.fill(&mut credential_id).expect("random credential id");

        Self {
            key_pair,
            credential_id,
        }
    }

    pub fn credential_id(&self) -> Vec<u8> {
        self.credential_id.clone()
    }

    pub fn credential_id_b64(&self) -> String {
        b64_encode(&self.credential_id)
    }

    /// ES256 COSE key for the authenticator's public key
    pub fn cose_public_key(&self) -> Vec<u8> {
        // Uncompressed SEC1 point: 0x04 || x || y
        let point = self.key_pair.public_key().as_ref();
        let x = &point[1..33];
        let y = &point[33..65];

        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())), // kty: EC2
            (Value::Integer(3.into()), Value::Integer((-7).into())), // alg: ES256
            (Value::Integer((-1).into()), Value::Integer(1.into())), // crv: P-256
            (Value::Integer((-2).into()), Value::Bytes(x.to_vec())),
            (Value::Integer((-3).into()), Value::Bytes(y.to_vec())),
        ]);

        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).expect("encode COSE key");
        buf
    }

    fn client_data(type_: &str, challenge_b64: &str, origin: &str) -> Vec<u8> {
        serde_json::json!({
            "type": type_,
            "challenge": challenge_b64,
            "origin": origin,
        })
        .to_string()
        .into_bytes()
    }

    fn auth_data_prefix(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
        let rp_id_hash = digest(&SHA256, rp_id.as_bytes());
        let mut out = Vec::with_capacity(37);
        out.extend_from_slice(rp_id_hash.as_ref());
        out.push(flags);
        out.extend_from_slice(&counter.to_be_bytes());
        out
    }

    /// Answer a registration ceremony with a fresh "none" attestation
    pub fn register(
        &self,
        challenge_b64: &str,
        rp_id: &str,
        origin: &str,
    ) -> RegistrationCredential {
        let client_data = Self::client_data("webauthn.create", challenge_b64, origin);

        let mut auth_data = Self::auth_data_prefix(rp_id, FLAGS_REGISTRATION, 0);
        auth_data.extend_from_slice(&[0u8; 16]); // aaguid
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_public_key());

        let attestation = Value::Map(vec![
            (
                Value::Text("fmt".to_string()),
                Value::Text("none".to_string()),
            ),
            (Value::Text("attStmt".to_string()), Value::Map(vec![])),
            (Value::Text("authData".to_string()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::into_writer(&attestation, &mut attestation_object)
            .expect("encode attestation object");

        RegistrationCredential {
            id: self.credential_id_b64(),
            raw_id: Some(self.credential_id_b64()),
            response: AttestationResponse {
                client_data_json: b64_encode(&client_data),
                attestation_object: b64_encode(&attestation_object),
                transports: Some(vec!["internal".to_string()]),
            },
        }
    }

    /// Answer an authentication ceremony, reporting the given counter
    pub fn sign_assertion(
        &self,
        challenge_b64: &str,
        rp_id: &str,
        origin: &str,
        counter: u32,
    ) -> AuthenticationCredential {
        let client_data = Self::client_data("webauthn.get", challenge_b64, origin);
        let auth_data = Self::auth_data_prefix(rp_id, FLAGS_ASSERTION, counter);

        let client_data_hash = digest(&SHA256, &client_data);
        let mut signed = auth_data.clone();
        signed.extend_from_slice(client_data_hash.as_ref());

        let rng = SystemRandom::new();
        let signature = self
            .key_pair
            .sign(&rng, &signed)
            .expect("sign assertion");

        AuthenticationCredential {
            id: self.credential_id_b64(),
            raw_id: Some(self.credential_id_b64()),
            response: AssertionResponse {
                client_data_json: b64_encode(&client_data),
                authenticator_data: b64_encode(&auth_data),
                signature: b64_encode(signature.as_ref()),
                user_handle: None,
            },
        }
    }
}
