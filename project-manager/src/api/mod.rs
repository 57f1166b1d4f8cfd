use std::sync::Arc;

use anyhow::Context;

use crate::api::config::ApiSecrets;
use crate::api::state::ApiState;
use crate::config::AppConfig;
use crate::google::{GoogleOAuthClient, ResourceManagerClient};
use crate::sessions::{self, MemorySessionStore, SessionStore};

pub mod config;
pub mod controllers;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod state;

#[cfg(test)]
mod tests;

pub async fn http_service(config: AppConfig) -> anyhow::Result<()> {
    let secrets = ApiSecrets::from_env()?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("project-manager/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let identity = GoogleOAuthClient::new(http_client.clone(), secrets, &config.api.oauth.base_url);
    let projects = ResourceManagerClient::new(http_client, config.api.organization_id.clone())?;

    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(config.sessions.ttl));
    let sweeper = config
        .sessions
        .ttl
        .map(|_| sessions::spawn_sweeper(store.clone(), config.sessions.sweep_interval));

    tracing::info!(
        listen_addr = %config.api.listen_addr,
        frontend_url = %config.api.frontend_url,
        environment = ?config.api.environment,
        strict_upstream = config.api.strict_upstream(),
        "API server starting..."
    );

    let state = ApiState::builder()
        .with_config(config.api)
        .with_identity_provider(identity)
        .with_projects_api(projects)
        .with_session_store(store)
        .build();

    let endpoint = state.bind_endpoint().await?;
    tracing::info!(local_addr = %endpoint.local_addr()?, "API server started");

    let res = endpoint.serve().await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("API server stopped");

    res.context("API server failed")
}
