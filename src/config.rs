use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub security: SecurityConfig,

    pub bootstrap: BootstrapConfig,

    pub observability: ObservabilityConfig,

    pub upstreams: UpstreamsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            shutdown_grace_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite:data/jellystream.db`. Required.
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// Upper bound for any single store operation.
    pub operation_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
            operation_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HS256 signing secret for bearer tokens. Required.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_username: String,

    /// Initial password of the bootstrap administrator. The account is
    /// flagged `must_change_password` regardless of the value used.
    #[serde(skip_serializing)]
    pub admin_password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub enabled: bool,

    pub base_url: String,

    #[serde(skip_serializing)]
    pub api_key: String,

    /// Request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    pub jellyfin: UpstreamConfig,

    pub tmdb: UpstreamConfig,

    pub radarr: UpstreamConfig,

    pub sonarr: UpstreamConfig,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            jellyfin: UpstreamConfig::default(),
            tmdb: UpstreamConfig {
                base_url: "https://api.themoviedb.org/3".to_string(),
                ..UpstreamConfig::default()
            },
            radarr: UpstreamConfig::default(),
            sonarr: UpstreamConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config file (if any), then applies environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overrides file values with environment variables. An upstream becomes
    /// enabled as soon as its URL is provided through the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = var("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(password) = var("ADMIN_PASSWORD") {
            self.bootstrap.admin_password = password;
        }

        let upstreams = [
            (&mut self.upstreams.jellyfin, "JELLYFIN_URL", "JELLYFIN_API_KEY"),
            (&mut self.upstreams.tmdb, "TMDB_URL", "TMDB_TOKEN"),
            (&mut self.upstreams.radarr, "RADARR_URL", "RADARR_API_KEY"),
            (&mut self.upstreams.sonarr, "SONARR_URL", "SONARR_API_KEY"),
        ];

        for (upstream, url_key, key_key) in upstreams {
            if let Some(url) = var(url_key) {
                upstream.base_url = url;
                upstream.enabled = true;
            }
            if let Some(key) = var(key_key) {
                upstream.api_key = key;
                // TMDB has a public default base URL, so a token alone is enough.
                if !upstream.base_url.is_empty() {
                    upstream.enabled = true;
                }
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("jellystream").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".jellystream").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("Database URL is required (set DATABASE_URL or [database] url)");
        }

        if self.security.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT secret is required (set JWT_SECRET or [security] jwt_secret)");
        }

        if self.database.operation_timeout_seconds == 0 {
            anyhow::bail!("Database operation timeout must be > 0");
        }

        for (name, upstream) in self.upstreams.iter() {
            if !upstream.enabled {
                continue;
            }
            url::Url::parse(&upstream.base_url)
                .with_context(|| format!("Invalid base URL for upstream '{name}'"))?;
        }

        Ok(())
    }
}

impl UpstreamsConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &UpstreamConfig)> {
        [
            ("jellyfin", &self.jellyfin),
            ("tmdb", &self.tmdb),
            ("radarr", &self.radarr),
            ("sonarr", &self.sonarr),
        ]
        .into_iter()
    }
}
