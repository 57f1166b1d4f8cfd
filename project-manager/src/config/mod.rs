use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::config::ApiConfig;
use crate::sessions::SessionConfig;
use crate::utils::logger::LoggerConfig;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,

    pub sessions: SessionConfig,

    pub logger: LoggerConfig,
}

impl AppConfig {
    /// Applies the deployment environment variables on top of the file config.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = &mut self.api;

        if let Some(port) = var("PORT") {
            let port = port.trim().parse().context("invalid PORT")?;
            api.listen_addr.set_port(port);
        }
        if let Some(url) = var("FRONTEND_URL") {
            api.frontend_url = url;
        }
        if let Some(url) = var("BASE_URL") {
            api.oauth.base_url = url;
        }
        if let Some(id) = var("GCP_ORGANIZATION_ID") {
            api.organization_id = id;
        }
        if let Some(env) = var("APP_ENV") {
            api.environment = env.parse()?;
        }
        if let Some(strict) = var("STRICT_UPSTREAM") {
            let strict = strict
                .trim()
                .parse()
                .context("STRICT_UPSTREAM must be `true` or `false`")?;
            api.strict_upstream = Some(strict);
        }

        Ok(())
    }
}
