use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;

use super::{
    ApiError, AppState, ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    UserDto, access::Principal,
};

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload?;

    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password required"));
    }

    let result = state
        .users()
        .login(&payload.username, &payload.password)
        .await?;

    Ok(Json(LoginResponse {
        token: result.token,
        user: result.user.into(),
    }))
}

/// GET /auth/verify
/// Confirms the token and returns the account it belongs to.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserDto>, ApiError> {
    let user = state.users().get_user(&principal.subject_id).await?;
    Ok(Json(user.into()))
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserDto>, ApiError> {
    verify(State(state), principal).await
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(payload) = payload?;

    state
        .users()
        .change_own_password(
            &principal.subject_id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok(Json(MessageResponse::new("Password updated successfully")))
}
