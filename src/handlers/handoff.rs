use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::{ApiResponse, Result};
use crate::services::handoff::{HandoffCreated, HandoffPayload, HandoffStatusView};
use crate::services::HandoffService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHandoffRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteHandoffRequest {
    pub success: bool,
    pub detail: Option<String>,
}

/// Create a cross-device registration hand-off session (Device A)
/// POST /passkey/session
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateHandoffRequest>,
) -> Result<Json<ApiResponse<HandoffCreated>>> {
    let created = HandoffService::create(&state.db, &state.config, req.email.trim()).await?;
    Ok(Json(ApiResponse::success(created)))
}

/// Dereference a hand-off session (Device B)
/// GET /passkey/session/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<HandoffPayload>>> {
    let payload = HandoffService::fetch(&state.db, &session_id).await?;
    Ok(Json(ApiResponse::success(payload)))
}

/// Report the ceremony outcome, exactly once (Device B)
/// POST /passkey/session/:id/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<CompleteHandoffRequest>,
) -> Result<Json<ApiResponse<HandoffStatusView>>> {
    let view = HandoffService::complete(
        &state.db,
        &session_id,
        req.success,
        req.detail.as_deref(),
    )
    .await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Poll the hand-off status (Device A)
/// GET /passkey/session/:id/status
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<HandoffStatusView>>> {
    let view = HandoffService::status(&state.db, &session_id).await?;
    Ok(Json(ApiResponse::success(view)))
}
