use axum::{extract::State, Extension, Json};

use crate::db::UserStore;
use crate::error::{ApiResponse, Result};
use crate::models::{CurrentUser, UserResponse};
use crate::AppState;

/// Get current user profile
/// GET /user/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserStore::find_by_id(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}
