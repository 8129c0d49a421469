//! Domain service for authentication and user management.
//!
//! Handles login, self-service password changes and admin CRUD over users.

use thiserror::Error;

use crate::db::{StoreError, User};
use crate::services::password::HashError;
use crate::services::token_service::TokenError;

/// Errors specific to user operations. The message is what clients see,
/// except for `ServiceUnavailable` whose detail is only logged.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl UserError {
    pub fn invalid_credentials() -> Self {
        Self::Unauthorized("Invalid username or password".to_string())
    }

    pub fn user_not_found() -> Self {
        Self::NotFound("User not found".to_string())
    }
}

impl From<StoreError> for UserError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::user_not_found(),
            StoreError::Conflict => Self::Conflict("Username already exists".to_string()),
            StoreError::Unavailable(detail) => Self::ServiceUnavailable(detail),
        }
    }
}

impl From<HashError> for UserError {
    fn from(err: HashError) -> Self {
        Self::ServiceUnavailable(err.to_string())
    }
}

impl From<TokenError> for UserError {
    fn from(err: TokenError) -> Self {
        Self::ServiceUnavailable(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub is_admin: bool,
}

/// Admin edit of an existing user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Verifies credentials and issues a bearer token.
    ///
    /// # Errors
    ///
    /// Unknown usernames and wrong passwords both return the same
    /// [`UserError::Unauthorized`].
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, UserError>;

    /// Changes the caller's own password after checking the current one.
    async fn change_own_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserError>;

    async fn get_user(&self, id: &str) -> Result<User, UserError>;

    async fn list_users(&self) -> Result<Vec<User>, UserError>;

    async fn create_user(&self, account: NewAccount) -> Result<User, UserError>;

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, UserError>;

    /// Deletes a user.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Forbidden`] if the target is the last administrator.
    async fn delete_user(&self, id: &str) -> Result<(), UserError>;

    /// Replaces the password with a generated one and returns it. The account
    /// must change it on next login.
    async fn reset_password(&self, username: &str) -> Result<String, UserError>;
}
