use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub mod credential_store;
pub mod migrator;
pub mod repositories;

pub use credential_store::{
    CredentialStore, DeleteOutcome, NewUser, StoreError, User, UserChanges,
};
pub use repositories::user::UserRepository;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,

    operation_timeout: Duration,
}

impl Store {
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_pool_options(
            &config.url,
            config.max_connections,
            config.min_connections,
            Duration::from_secs(config.operation_timeout_seconds),
        )
        .await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        operation_timeout: Duration,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if db_url.starts_with("sqlite:") && !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file: {path_str}"))?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(operation_timeout)
            .acquire_timeout(operation_timeout)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt)
            .await
            .context("Failed to connect to database")?;

        migrator::Migrator::up(&conn, None)
            .await
            .context("Failed to apply migrations")?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self {
            conn,
            operation_timeout,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        tokio::time::timeout(
            self.operation_timeout,
            self.conn
                .query_one(Statement::from_string(backend, "SELECT 1".to_string())),
        )
        .await
        .context("Database ping timed out")??;
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        info!("Database connection closed");
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> UserRepository {
        UserRepository::new(self.conn.clone(), self.operation_timeout)
    }

    #[must_use]
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        Arc::new(self.user_repo())
    }
}
