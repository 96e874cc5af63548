use serde::{Deserialize, Serialize};

/// Option payloads sent to the browser and response payloads coming back.
/// Binary fields travel base64url-encoded, names follow the WebAuthn JSON
/// wire format expected by `navigator.credentials`.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    /// User handle, base64url
    pub id: String,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    pub alg: i64,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorSelection {
    #[serde(rename = "residentKey")]
    pub resident_key: String,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    /// Credential id, base64url
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

impl CredentialDescriptor {
    pub fn new(id: String, transports: Option<Vec<String>>) -> Self {
        Self {
            id,
            type_: "public-key".to_string(),
            transports,
        }
    }
}

/// Options for `navigator.credentials.create()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationOptions {
    pub rp: RelyingPartyInfo,
    pub user: UserEntity,
    pub challenge: String,
    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub timeout: u64,
    pub attestation: String,
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelection,
    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<CredentialDescriptor>,
}

/// Options for `navigator.credentials.get()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    pub challenge: String,
    pub timeout: u64,
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<CredentialDescriptor>,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

/// Client response to a registration ceremony
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationCredential {
    /// Credential id, base64url
    pub id: String,
    #[serde(rename = "rawId", default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

/// Client response to an authentication ceremony
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationCredential {
    /// Credential id, base64url
    pub id: String,
    #[serde(rename = "rawId", default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
    pub response: AssertionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// COSE algorithms accepted at registration, in preference order
pub const ACCEPTED_ALGORITHMS: [i64; 3] = [-8, -7, -257];

pub fn accepted_params() -> Vec<PubKeyCredParam> {
    ACCEPTED_ALGORITHMS
        .iter()
        .map(|&alg| PubKeyCredParam {
            alg,
            type_: "public-key".to_string(),
        })
        .collect()
}
