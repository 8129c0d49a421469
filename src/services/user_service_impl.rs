//! Store-backed implementation of the `UserService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use rand::{Rng, distr::Alphanumeric};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::constants::auth::{GENERATED_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use crate::db::{CredentialStore, DeleteOutcome, NewUser, StoreError, User, UserChanges};
use crate::services::password::PasswordHasher;
use crate::services::token_service::TokenService;
use crate::services::user_service::{
    LoginResult, NewAccount, UserError, UserService, UserUpdate,
};

pub struct DefaultUserService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
    /// Verified against when the username is unknown, so both login failure
    /// paths cost one Argon2 verification.
    decoy_hash: OnceCell<String>,
}

impl DefaultUserService {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self {
            store,
            hasher,
            tokens,
            decoy_hash: OnceCell::new(),
        }
    }

    async fn decoy_hash(&self) -> Result<&str, UserError> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| async {
                let throwaway = generate_password();
                self.hasher.hash_blocking(&throwaway).await
            })
            .await?;
        Ok(hash.as_str())
    }
}

fn validate_password(password: &str, message: &str) -> Result<(), UserError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserError::InvalidInput(message.to_string()));
    }
    Ok(())
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

#[async_trait]
impl UserService for DefaultUserService {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, UserError> {
        let user = match self.store.find_by_username(username).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                let decoy = self.decoy_hash().await?;
                let _ = self.hasher.verify_blocking(password, decoy).await;
                warn!(username, "Login failed: unknown user");
                return Err(UserError::invalid_credentials());
            }
            Err(err) => return Err(err.into()),
        };

        if !self.hasher.verify_blocking(password, &user.password_hash).await {
            warn!(username, "Login failed: wrong password");
            return Err(UserError::invalid_credentials());
        }

        let token = self.tokens.issue(&user)?;
        info!(user_id = %user.id, username, is_admin = user.is_admin, "User logged in");

        Ok(LoginResult { token, user })
    }

    async fn change_own_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(UserError::InvalidInput(
                "Current password and new password required".to_string(),
            ));
        }
        validate_password(new_password, "New password must be at least 4 characters")?;

        let user = self.store.find_by_id(user_id).await?;

        if !self
            .hasher
            .verify_blocking(current_password, &user.password_hash)
            .await
        {
            warn!(user_id, "Password change rejected: current password incorrect");
            return Err(UserError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash = self.hasher.hash_blocking(new_password).await?;
        self.store
            .update_fields(
                user_id,
                UserChanges {
                    password_hash: Some(password_hash),
                    must_change_password: Some(false),
                    ..UserChanges::default()
                },
            )
            .await?;

        info!(user_id, username = %user.username, "Password changed");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<User, UserError> {
        Ok(self.store.find_by_id(id).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, UserError> {
        Ok(self.store.list_all().await?)
    }

    async fn create_user(&self, account: NewAccount) -> Result<User, UserError> {
        let username = account.username.trim();
        if username.is_empty() || account.password.is_empty() {
            return Err(UserError::InvalidInput(
                "Username and password required".to_string(),
            ));
        }
        validate_password(&account.password, "Password must be at least 4 characters")?;

        let password_hash = self.hasher.hash_blocking(&account.password).await?;
        let id = self
            .store
            .insert(NewUser {
                username: username.to_string(),
                email: normalize_email(account.email),
                password_hash,
                is_admin: account.is_admin,
                must_change_password: false,
            })
            .await?;

        let user = self.store.find_by_id(&id).await?;
        info!(user_id = %user.id, username = %user.username, is_admin = user.is_admin, "User created");
        Ok(user)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, UserError> {
        let password = update.password.filter(|p| !p.is_empty());
        if let Some(password) = &password {
            validate_password(password, "Password must be at least 4 characters")?;
        }

        let password_hash = match password {
            Some(password) => Some(self.hasher.hash_blocking(&password).await?),
            None => None,
        };

        let changes = UserChanges {
            email: update.email.map(|e| normalize_email(Some(e))),
            password_hash,
            is_admin: update.is_admin,
            must_change_password: None,
        };

        let user = self.store.update_fields(id, changes).await?;
        info!(user_id = %user.id, username = %user.username, is_admin = user.is_admin, "User updated");
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> Result<(), UserError> {
        match self.store.delete_unless_last_admin(id).await? {
            DeleteOutcome::Deleted => {
                info!(user_id = id, "User deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(UserError::user_not_found()),
            DeleteOutcome::LastAdmin => {
                warn!(user_id = id, "Refused to delete the last admin");
                Err(UserError::Forbidden(
                    "Cannot delete the last admin user".to_string(),
                ))
            }
        }
    }

    async fn reset_password(&self, username: &str) -> Result<String, UserError> {
        let user = self.store.find_by_username(username).await?;

        let password = generate_password();
        let password_hash = self.hasher.hash_blocking(&password).await?;
        self.store
            .update_fields(
                &user.id,
                UserChanges {
                    password_hash: Some(password_hash),
                    must_change_password: Some(true),
                    ..UserChanges::default()
                },
            )
            .await?;

        warn!(user_id = %user.id, username, "Password reset; user must change it on next login");
        Ok(password)
    }
}
