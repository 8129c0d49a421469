use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;

use super::{
    ApiError, AppState, CreateUserRequest, MessageResponse, UpdateUserRequest, UserDto,
};
use crate::services::{NewAccount, UserUpdate};

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let users = state.users().list_users().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let Json(payload) = payload?;

    let user = state
        .users()
        .create_user(NewAccount {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            is_admin: payload.is_admin,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /users/{id}
/// Fields left out of the body keep their current value.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserDto>, ApiError> {
    let Json(payload) = payload?;

    let user = state
        .users()
        .update_user(
            &id,
            UserUpdate {
                email: payload.email,
                password: payload.password,
                is_admin: payload.is_admin,
            },
        )
        .await?;

    Ok(Json(user.into()))
}

/// DELETE /users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.users().delete_user(&id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
