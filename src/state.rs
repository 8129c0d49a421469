use std::sync::Arc;
use std::time::Duration;

use crate::clients::upstream::UpstreamClient;
use crate::config::Config;
use crate::db::{CredentialStore, Store};
use crate::services::bootstrap::{self, BootstrapOutcome};
use crate::services::password::PasswordHasher;
use crate::services::token_service::TokenService;
use crate::services::{DefaultUserService, UserService};

/// One pooled client for every upstream. Per-request timeouts are set by the
/// relay from each upstream's config.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("Jellystream/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub credentials: Arc<dyn CredentialStore>,

    pub hasher: PasswordHasher,

    pub tokens: TokenService,

    pub user_service: Arc<dyn UserService>,

    pub upstreams: Arc<UpstreamClient>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::from_config(&config.database).await?;
        Self::with_store(config, store)
    }

    /// Wires services around an already opened store.
    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let tokens = TokenService::new(&config.security.jwt_secret)
            .map_err(|e| anyhow::anyhow!("Token service unavailable: {e}"))?;
        let hasher = PasswordHasher::new(&config.security)
            .map_err(|e| anyhow::anyhow!("Password hasher unavailable: {e}"))?;

        let credentials = store.credential_store();
        let user_service = Arc::new(DefaultUserService::new(
            credentials.clone(),
            hasher.clone(),
            tokens.clone(),
        )) as Arc<dyn UserService>;

        let upstreams = Arc::new(UpstreamClient::new(
            build_shared_http_client()?,
            &config.upstreams,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            credentials,
            hasher,
            tokens,
            user_service,
            upstreams,
        })
    }

    /// Creates the default administrator on an empty store.
    pub async fn bootstrap(&self) -> anyhow::Result<BootstrapOutcome> {
        bootstrap::ensure_default_admin(
            self.credentials.as_ref(),
            &self.hasher,
            &self.config.bootstrap,
        )
        .await
    }
}
