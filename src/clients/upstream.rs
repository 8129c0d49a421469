//! Pass-through client for the proxied media APIs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName};
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{UpstreamConfig, UpstreamsConfig};
use crate::constants::upstream::{ARR_API_KEY_HEADER, JELLYFIN_TOKEN_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamKind {
    Jellyfin,
    Tmdb,
    Radarr,
    Sonarr,
}

impl UpstreamKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jellyfin => "jellyfin",
            Self::Tmdb => "tmdb",
            Self::Radarr => "radarr",
            Self::Sonarr => "sonarr",
        }
    }

    /// Header name and value carrying the upstream credential.
    fn credential(self, api_key: &str) -> (HeaderName, String) {
        match self {
            Self::Jellyfin => (
                HeaderName::from_static(JELLYFIN_TOKEN_HEADER),
                api_key.to_string(),
            ),
            Self::Tmdb => (AUTHORIZATION, format!("Bearer {api_key}")),
            Self::Radarr | Self::Sonarr => (
                HeaderName::from_static(ARR_API_KEY_HEADER),
                api_key.to_string(),
            ),
        }
    }
}

impl fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamKind {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jellyfin" => Ok(Self::Jellyfin),
            "tmdb" => Ok(Self::Tmdb),
            "radarr" => Ok(Self::Radarr),
            "sonarr" => Ok(Self::Sonarr),
            _ => Err(UpstreamError::NotConfigured(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid upstream path")]
    InvalidPath,

    #[error("Upstream {upstream} request failed: {message}")]
    Transport {
        upstream: UpstreamKind,
        message: String,
    },
}

#[derive(Debug, Clone)]
struct UpstreamTarget {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamTarget {
    fn from_config(config: &UpstreamConfig) -> Self {
        let normalized = Url::parse(&config.base_url)
            .map_or_else(|_| config.base_url.clone(), |url| url.to_string());

        Self {
            base_url: normalized.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }

    /// `path` must still be percent-encoded; it is appended as-is.
    fn url_for(&self, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
        let path = path.trim_start_matches('/');
        if path.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(UpstreamError::InvalidPath);
        }

        let mut url = Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|_| UpstreamError::InvalidPath)?;
        // Encoded dot segments are resolved by the parser; stay under the base.
        if !url.as_str().starts_with(&format!("{}/", self.base_url)) {
            return Err(UpstreamError::InvalidPath);
        }
        url.set_query(query.filter(|q| !q.is_empty()));
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct UpstreamClient {
    http: Client,
    targets: HashMap<UpstreamKind, UpstreamTarget>,
}

impl UpstreamClient {
    /// Only enabled upstreams are routable.
    #[must_use]
    pub fn new(http: Client, config: &UpstreamsConfig) -> Self {
        let targets = config
            .iter()
            .filter(|(_, upstream)| upstream.enabled)
            .filter_map(|(name, upstream)| {
                let kind = name.parse::<UpstreamKind>().ok()?;
                Some((kind, UpstreamTarget::from_config(upstream)))
            })
            .collect();

        Self { http, targets }
    }

    #[must_use]
    pub fn is_enabled(&self, kind: UpstreamKind) -> bool {
        self.targets.contains_key(&kind)
    }

    pub async fn forward(
        &self,
        upstream: &str,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let kind = upstream.parse::<UpstreamKind>()?;
        let target = self
            .targets
            .get(&kind)
            .ok_or_else(|| UpstreamError::NotConfigured(upstream.to_string()))?;

        let url = target.url_for(&request.path, request.query.as_deref())?;
        let (header, value) = kind.credential(&target.api_key);

        debug!(upstream = %kind, method = %request.method, path = %url.path(), "Forwarding upstream request");

        let mut builder = self
            .http
            .request(request.method, url)
            .timeout(target.timeout)
            .header(header, value);
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let transport = |err: reqwest::Error| {
            warn!(upstream = %kind, error = %err, "Upstream request failed");
            UpstreamError::Transport {
                upstream: kind,
                message: err.to_string(),
            }
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport)?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
