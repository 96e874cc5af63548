use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::db::CredentialStore;
use crate::error::{ApiResponse, AppError, Result};
use crate::models::{CredentialSummary, CurrentUser, LoginResponse};
use crate::services::{AuthService, PasskeyService};
use crate::webauthn::types::{
    AuthenticationCredential, CreationOptions, RegistrationCredential, RequestOptions,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BeginRegisterRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct FinishRegisterRequest {
    pub email: String,
    pub credential: RegistrationCredential,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BeginAuthRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BeginAuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_key: Option<String>,
    pub options: RequestOptions,
}

#[derive(Debug, Deserialize)]
pub struct FinishAuthRequest {
    pub email: Option<String>,
    pub challenge_key: Option<String>,
    pub credential: AuthenticationCredential,
}

#[derive(Debug, Deserialize)]
pub struct RenamePasskeyRequest {
    pub display_name: String,
}

/// Begin passkey registration for an account
/// POST /passkey/register/begin
pub async fn register_begin(
    State(state): State<AppState>,
    Json(req): Json<BeginRegisterRequest>,
) -> Result<Json<ApiResponse<CreationOptions>>> {
    let options =
        PasskeyService::begin_registration(&state.db, &state.config, req.email.trim()).await?;
    Ok(Json(ApiResponse::success(options)))
}

/// Verify the attestation response and store the credential
/// POST /passkey/register/finish
pub async fn register_finish(
    State(state): State<AppState>,
    Json(req): Json<FinishRegisterRequest>,
) -> Result<Json<ApiResponse<CredentialSummary>>> {
    let summary = PasskeyService::finish_registration(
        &state.db,
        &state.config,
        req.email.trim(),
        req.credential,
        req.display_name,
    )
    .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Begin passkey authentication, scoped to an account when an email is given
/// POST /passkey/authenticate/begin
pub async fn authenticate_begin(
    State(state): State<AppState>,
    Json(req): Json<BeginAuthRequest>,
) -> Result<Json<ApiResponse<BeginAuthResponse>>> {
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let (challenge_key, options) =
        PasskeyService::begin_authentication(&state.db, &state.config, email).await?;
    Ok(Json(ApiResponse::success(BeginAuthResponse {
        challenge_key,
        options,
    })))
}

/// Verify the assertion response and issue a session token
/// POST /passkey/authenticate/finish
pub async fn authenticate_finish(
    State(state): State<AppState>,
    Json(req): Json<FinishAuthRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let user = PasskeyService::finish_authentication(
        &state.db,
        &state.config,
        email,
        req.challenge_key.as_deref(),
        req.credential,
    )
    .await?;

    let response = AuthService::issue_session(&state.config, user)?;
    Ok(Json(ApiResponse::success(response)))
}

/// List the account's registered passkeys, no key material
/// GET /passkeys/:email
pub async fn list_passkeys(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(email): Path<String>,
) -> Result<Json<ApiResponse<Vec<CredentialSummary>>>> {
    require_same_account(&current_user, &email)?;

    let summaries = CredentialStore::find_by_user(&state.db, &current_user.id)
        .await?
        .into_iter()
        .map(CredentialSummary::from)
        .collect();

    Ok(Json(ApiResponse::success(summaries)))
}

/// Rename a passkey
/// PATCH /passkeys/:email/:id
pub async fn rename_passkey(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((email, passkey_id)): Path<(String, String)>,
    Json(req): Json<RenamePasskeyRequest>,
) -> Result<Json<ApiResponse<()>>> {
    require_same_account(&current_user, &email)?;

    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::BadRequest("Display name cannot be empty".to_string()));
    }

    CredentialStore::rename(&state.db, &current_user.id, &passkey_id, display_name).await?;
    Ok(Json(ApiResponse::<()>::success_message("Passkey renamed")))
}

/// Remove a passkey
/// DELETE /passkeys/:email/:id
pub async fn delete_passkey(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path((email, passkey_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>> {
    require_same_account(&current_user, &email)?;

    CredentialStore::delete(&state.db, &current_user.id, &passkey_id).await?;
    Ok(Json(ApiResponse::<()>::success_message("Passkey deleted")))
}

fn require_same_account(current_user: &CurrentUser, email: &str) -> Result<()> {
    if !current_user.email.eq_ignore_ascii_case(email.trim()) {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }
    Ok(())
}
