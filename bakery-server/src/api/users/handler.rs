//! User Profile Handlers

use axum::{Extension, Json, extract::State};

use shared::models::{ProfileUpdate, User};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::user as user_repo;
use crate::utils::validation::{
    MAX_ADDRESS_LEN, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN, validate_optional_text,
};
use crate::utils::{AppError, AppResult};

/// GET /api/users/profile - 获取当前用户资料
pub async fn get_profile(
    State(state): State<ServerState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<User>> {
    let user = user_repo::find_by_id(&state.db, current.id)
        .await?
        .ok_or_else(|| AppError::not_found("User no longer exists"))?;
    Ok(Json(user))
}

/// PUT /api/users/profile - 更新资料 (email 和角色不可变)
pub async fn update_profile(
    State(state): State<ServerState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    if let Some(name) = &payload.name
        && name.trim().is_empty()
    {
        return Err(AppError::validation("name must not be empty"));
    }
    validate_optional_text(&payload.name, "name", MAX_NAME_LEN)?;
    validate_optional_text(&payload.phone, "phone", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(&payload.address, "address", MAX_ADDRESS_LEN)?;

    let user = user_repo::update_profile(&state.db, current.id, &payload).await?;
    Ok(Json(user))
}
