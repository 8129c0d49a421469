//! Persistence contract for user records.
//!
//! The service layer only talks to [`CredentialStore`]; uniqueness and the
//! last-admin rule are enforced by the storage engine so that concurrent
//! requests cannot race past them.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::users;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found")]
    NotFound,

    #[error("Username already exists")]
    Conflict,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A stored user, including the password hash. Never serialized directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_admin: bool,
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            password_hash: model.password_hash,
            is_admin: model.is_admin,
            must_change_password: model.must_change_password,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_admin: bool,
    pub must_change_password: bool,
}

/// Partial update. `None` leaves the column untouched; `email: Some(None)`
/// clears the address.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub is_admin: Option<bool>,
    pub must_change_password: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The target is the only remaining administrator; nothing was deleted.
    LastAdmin,
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<User, StoreError>;

    /// All users, oldest first.
    async fn list_all(&self) -> Result<Vec<User>, StoreError>;

    async fn count_all(&self) -> Result<u64, StoreError>;

    async fn count_admins(&self) -> Result<u64, StoreError>;

    /// Inserts a user and returns its generated id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the username is taken. The check
    /// is the storage-level unique constraint, so it holds under concurrency.
    async fn insert(&self, user: NewUser) -> Result<String, StoreError>;

    /// Applies `changes` and refreshes `updated_at`, which never moves backwards.
    async fn update_fields(&self, id: &str, changes: UserChanges) -> Result<User, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Deletes the user unless it is the last administrator, as one atomic
    /// statement.
    async fn delete_unless_last_admin(&self, id: &str) -> Result<DeleteOutcome, StoreError>;
}
