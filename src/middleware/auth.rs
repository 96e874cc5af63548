use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::services::AuthService;
use crate::AppState;

/// Authentication middleware
/// Extracts and validates JWT from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(AppError::Unauthorized(
                "Missing or invalid Authorization header".to_string(),
            ));
        }
    };

    let claims = AuthService::validate_token(token, &state.config)?;

    // The account may have been deleted since the token was issued
    let user = UserStore::find_by_id(&state.db, &claims.sub)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

    let current_user = CurrentUser {
        id: user.id,
        email: user.email,
    };

    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}
