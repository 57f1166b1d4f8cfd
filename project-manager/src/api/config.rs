use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// TCP socket address to listen for incoming connections.
    ///
    /// Default: `0.0.0.0:3001`
    pub listen_addr: SocketAddr,

    /// Origin of the web UI. Used for CORS and post-login redirects.
    ///
    /// Default: `http://localhost:5173`
    pub frontend_url: String,

    /// Organization that newly created projects are placed under.
    ///
    /// Default: `123456789`
    pub organization_id: String,

    pub environment: Environment,

    /// Surface Google Cloud failures instead of answering with demo data.
    ///
    /// Default: strict in `production`, demo fallback otherwise.
    pub strict_upstream: Option<bool>,

    pub oauth: OAuthConfig,

    pub rate_limit: RateLimitConfig,

    pub bulk: BulkConfig,

    /// Requests running longer than this are answered with `408`.
    ///
    /// Default: `25s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn strict_upstream(&self) -> bool {
        self.strict_upstream
            .unwrap_or(self.environment == Environment::Production)
    }

    pub fn frontend_url(&self) -> &str {
        self.frontend_url.trim_end_matches('/')
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: (Ipv4Addr::UNSPECIFIED, 3001).into(),
            frontend_url: "http://localhost:5173".to_owned(),
            organization_id: "123456789".to_owned(),
            environment: Environment::default(),
            strict_upstream: None,
            oauth: OAuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            bulk: BulkConfig::default(),
            request_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("unknown environment: {other}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Base URL of this service, used to construct the redirect URI.
    ///
    /// Example: `https://projects.example.com`
    pub base_url: String,

    /// Require the `state` value issued with the consent URL on callback.
    ///
    /// Default: `true`
    pub verify_state: bool,

    /// How long an issued `state` value stays valid.
    ///
    /// Default: `10m`
    #[serde(with = "humantime_serde")]
    pub state_ttl: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_owned(),
            verify_state: true,
            state_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window. `0` disables limiting.
    ///
    /// Default: `100`
    pub max_requests: u32,

    /// Default: `15m`
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Upper bound for `count` in bulk creation.
    ///
    /// Default: `10`
    pub max_count: u32,

    /// Simulated provisioning latency between steps.
    ///
    /// Default: `500ms`
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_count: 10,
            step_delay: Duration::from_millis(500),
        }
    }
}

/// OAuth client credentials. Loaded exclusively from environment variables.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct ApiSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl ApiSecrets {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            client_id: std::env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID not set")?,
            client_secret: std::env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET not set")?,
        })
    }
}
