use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Ceremony failures. All of these are terminal for the current attempt
    // and never retried server-side; the client decides whether to restart.
    #[error("User not found")]
    UserNotFound,

    #[error("No pending challenge")]
    NoPendingChallenge,

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Credential already registered")]
    DuplicateCredential,

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Signature counter regressed")]
    CounterRegressed,

    #[error("No passkeys registered")]
    NoCredentialsRegistered,

    #[error("Hand-off session not found")]
    SessionNotFound,

    #[error("Hand-off session already completed")]
    AlreadyCompleted,
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn success_message(message: &str) -> ApiResponse<()> {
        ApiResponse {
            code: 0,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn error(code: i32, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, "Database error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 404, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 401, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 403, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 400, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, 409, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, msg.clone())
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, 401, "Invalid token".to_string())
            }
            AppError::UserNotFound => (StatusCode::NOT_FOUND, 404, "User not found".to_string()),
            AppError::NoPendingChallenge => {
                tracing::debug!("Ceremony rejected: no pending challenge");
                (
                    StatusCode::BAD_REQUEST,
                    400,
                    "Challenge expired or already used, please try again".to_string(),
                )
            }
            AppError::VerificationFailed(detail) => {
                // Audit trail: security rejection, not a benign expiry
                tracing::warn!("WebAuthn verification failed: {}", detail);
                (StatusCode::UNAUTHORIZED, 401, "Verification failed".to_string())
            }
            AppError::DuplicateCredential => (
                StatusCode::CONFLICT,
                409,
                "This authenticator is already registered".to_string(),
            ),
            AppError::UnknownCredential => {
                (StatusCode::NOT_FOUND, 404, "Unknown credential".to_string())
            }
            AppError::CounterRegressed => {
                tracing::warn!(
                    "WebAuthn signature counter regressed, possible cloned authenticator"
                );
                (StatusCode::UNAUTHORIZED, 401, "Verification failed".to_string())
            }
            AppError::NoCredentialsRegistered => (
                StatusCode::BAD_REQUEST,
                400,
                "No passkeys registered for this account".to_string(),
            ),
            AppError::SessionNotFound => (
                StatusCode::NOT_FOUND,
                404,
                "Hand-off session not found or expired, please restart".to_string(),
            ),
            AppError::AlreadyCompleted => (
                StatusCode::CONFLICT,
                409,
                "Hand-off session already completed".to_string(),
            ),
        };

        let body = Json(ApiResponse::<()>::error(code, &message));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
