//! First-run provisioning of the administrator account.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::db::{CredentialStore, NewUser, StoreError};
use crate::services::password::PasswordHasher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created { username: String },
    AlreadyInitialized,
}

/// Creates the default administrator when the store holds no users.
///
/// Losing a race against another instance surfaces as a unique violation,
/// which counts as already initialized.
pub async fn ensure_default_admin(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
    config: &BootstrapConfig,
) -> Result<BootstrapOutcome> {
    let existing = store
        .count_all()
        .await
        .context("Failed to count users during bootstrap")?;
    if existing > 0 {
        return Ok(BootstrapOutcome::AlreadyInitialized);
    }

    let password_hash = hasher
        .hash_blocking(&config.admin_password)
        .await
        .context("Failed to hash bootstrap admin password")?;

    let admin = NewUser {
        username: config.admin_username.clone(),
        email: None,
        password_hash,
        is_admin: true,
        must_change_password: true,
    };

    match store.insert(admin).await {
        Ok(id) => {
            info!(user_id = %id, username = %config.admin_username, "Created default admin user");
            warn!(
                username = %config.admin_username,
                "Default admin credentials are in use; change the password after first login"
            );
            Ok(BootstrapOutcome::Created {
                username: config.admin_username.clone(),
            })
        }
        Err(StoreError::Conflict) => Ok(BootstrapOutcome::AlreadyInitialized),
        Err(err) => Err(err).context("Failed to create default admin user"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::db::Store;
    use std::time::Duration;
    use uuid::Uuid;

    async fn fixtures() -> (Store, PasswordHasher) {
        let db_path =
            std::env::temp_dir().join(format!("jellystream-bootstrap-test-{}.db", Uuid::new_v4()));
        let store = Store::with_pool_options(
            &format!("sqlite:{}", db_path.display()),
            5,
            1,
            Duration::from_secs(5),
        )
        .await
        .expect("failed to open test store");
        let hasher = PasswordHasher::new(&SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        })
        .unwrap();
        (store, hasher)
    }

    #[tokio::test]
    async fn test_bootstrap_creates_admin_once() {
        let (store, hasher) = fixtures().await;
        let repo = store.user_repo();
        let config = BootstrapConfig::default();

        let first = ensure_default_admin(&repo, &hasher, &config).await.unwrap();
        assert_eq!(
            first,
            BootstrapOutcome::Created {
                username: "admin".to_string()
            }
        );

        let admin = repo.find_by_username("admin").await.unwrap();
        assert!(admin.is_admin);
        assert!(admin.must_change_password);
        assert!(hasher.verify("admin", &admin.password_hash));

        let second = ensure_default_admin(&repo, &hasher, &config).await.unwrap();
        assert_eq!(second, BootstrapOutcome::AlreadyInitialized);
        assert_eq!(repo.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_uses_configured_credentials() {
        let (store, hasher) = fixtures().await;
        let repo = store.user_repo();
        let config = BootstrapConfig {
            admin_username: "owner".to_string(),
            admin_password: "s3cret-start".to_string(),
        };

        ensure_default_admin(&repo, &hasher, &config).await.unwrap();

        let admin = repo.find_by_username("owner").await.unwrap();
        assert!(hasher.verify("s3cret-start", &admin.password_hash));
    }

    #[tokio::test]
    async fn test_concurrent_bootstrap_creates_one_admin() {
        let (store, hasher) = fixtures().await;
        let repo = store.user_repo();
        let config = BootstrapConfig::default();

        let (a, b) = tokio::join!(
            ensure_default_admin(&repo, &hasher, &config),
            ensure_default_admin(&repo, &hasher, &config)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(repo.count_all().await.unwrap(), 1);
        assert_eq!(repo.count_admins().await.unwrap(), 1);
    }
}
