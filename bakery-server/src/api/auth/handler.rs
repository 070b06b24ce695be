//! Authentication Handlers
//!
//! Handles registration, login and current-user lookup

use axum::{Extension, Json, extract::State, http::StatusCode};

use shared::models::{AuthResponse, LoginRequest, RegisterRequest, Role, User};

use crate::auth::{self, CurrentUser};
use crate::core::ServerState;
use crate::db::repository::user as user_repo;
use crate::db::repository::user::NewUser;
use crate::utils::validation::{
    MAX_ADDRESS_LEN, MAX_NAME_LEN, MAX_PASSWORD_LEN, MAX_SHORT_TEXT_LEN, validate_email,
    validate_optional_text, validate_required_text,
};
use crate::utils::{AppError, AppResult};

/// Minimum password length accepted at registration
const MIN_PASSWORD_LEN: usize = 8;

/// POST /api/auth/register - 注册新客户
///
/// Registration always creates a `customer`; admin accounts are
/// provisioned at startup from the environment.
pub async fn register(
    State(state): State<ServerState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
    validate_email(&req.email)?;
    validate_required_text(&req.password, "password", MAX_PASSWORD_LEN)?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    validate_optional_text(&req.phone, "phone", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(&req.address, "address", MAX_ADDRESS_LEN)?;

    if user_repo::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(AppError::conflict("Email is already registered"));
    }

    let hash_pass = auth::hash_password(&req.password)?;
    let user = user_repo::create(
        &state.db,
        NewUser {
            name: req.name,
            email: req.email,
            hash_pass,
            role: Role::Customer,
            phone: req.phone,
            address: req.address,
        },
    )
    .await?;

    let token = state
        .jwt_service
        .generate_token(&user)
        .map_err(|e| AppError::internal(format!("Failed to generate token: {e}")))?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/auth/login - 登录
pub async fn login(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    // Unified error message to prevent email enumeration
    let user = user_repo::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(AppError::invalid_credentials)?;

    if !auth::verify_password(&req.password, &user.hash_pass)? {
        tracing::warn!(email = %req.email, "Login failed - invalid credentials");
        return Err(AppError::invalid_credentials());
    }

    let token = state
        .jwt_service
        .generate_token(&user)
        .map_err(|e| AppError::internal(format!("Failed to generate token: {e}")))?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/me - 当前用户
pub async fn me(
    State(state): State<ServerState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<User>> {
    let user = user_repo::find_by_id(&state.db, current.id)
        .await?
        .ok_or_else(|| AppError::not_found("User no longer exists"))?;
    Ok(Json(user))
}
