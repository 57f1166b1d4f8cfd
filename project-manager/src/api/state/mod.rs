use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::time::Instant;
use uuid::Uuid;

use crate::api::config::ApiConfig;
use crate::api::endpoint::ApiEndpoint;
use crate::api::error::ApiError;
use crate::api::rate_limit::RateLimiter;
use crate::demo::BulkSimulator;
use crate::google::{IdentityProvider, ProjectsApi};
use crate::sessions::{Session, SessionStore};

type Identity = Arc<dyn IdentityProvider>;
type Projects = Arc<dyn ProjectsApi>;
type Sessions = Arc<dyn SessionStore>;

pub struct ApiStateBuilder<MandatoryFields = (Identity, Projects, Sessions)> {
    config: ApiConfig,
    mandatory_fields: MandatoryFields,
}

impl ApiStateBuilder {
    pub fn build(self) -> ApiState {
        let (identity, projects, sessions) = self.mandatory_fields;
        let config = self.config;

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let bulk = BulkSimulator::new(config.bulk.max_count, config.bulk.step_delay);

        ApiState {
            inner: Arc::new(Inner {
                config,
                identity,
                projects,
                sessions,
                rate_limiter,
                bulk,
                oauth_states: DashMap::new(),
            }),
        }
    }
}

impl<T2, T3> ApiStateBuilder<((), T2, T3)> {
    pub fn with_identity_provider(
        self,
        identity: impl IdentityProvider + 'static,
    ) -> ApiStateBuilder<(Identity, T2, T3)> {
        let (_, projects, sessions) = self.mandatory_fields;

        ApiStateBuilder {
            config: self.config,
            mandatory_fields: (Arc::new(identity), projects, sessions),
        }
    }
}

impl<T1, T3> ApiStateBuilder<(T1, (), T3)> {
    pub fn with_projects_api(
        self,
        projects: impl ProjectsApi + 'static,
    ) -> ApiStateBuilder<(T1, Projects, T3)> {
        let (identity, _, sessions) = self.mandatory_fields;

        ApiStateBuilder {
            config: self.config,
            mandatory_fields: (identity, Arc::new(projects), sessions),
        }
    }
}

impl<T1, T2> ApiStateBuilder<(T1, T2, ())> {
    pub fn with_session_store(self, sessions: Sessions) -> ApiStateBuilder<(T1, T2, Sessions)> {
        let (identity, projects, _) = self.mandatory_fields;

        ApiStateBuilder {
            config: self.config,
            mandatory_fields: (identity, projects, sessions),
        }
    }
}

impl<T1, T2, T3> ApiStateBuilder<(T1, T2, T3)> {
    pub fn with_config(self, config: ApiConfig) -> ApiStateBuilder<(T1, T2, T3)> {
        ApiStateBuilder { config, ..self }
    }
}

#[derive(Clone)]
#[repr(transparent)]
pub struct ApiState {
    inner: Arc<Inner>,
}

impl ApiState {
    pub fn builder() -> ApiStateBuilder<((), (), ())> {
        ApiStateBuilder {
            config: ApiConfig::default(),
            mandatory_fields: ((), (), ()),
        }
    }

    pub async fn bind_socket(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config().listen_addr).await
    }

    pub async fn bind_endpoint(&self) -> Result<ApiEndpoint> {
        ApiEndpoint::builder().bind(self.clone()).await
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    pub fn projects(&self) -> &dyn ProjectsApi {
        self.inner.projects.as_ref()
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.inner.sessions.as_ref()
    }

    pub fn bulk(&self) -> &BulkSimulator {
        &self.inner.bulk
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.inner.rate_limiter.clone()
    }

    /// Issues a CSRF state value to embed in the consent URL.
    pub fn issue_oauth_state(&self) -> String {
        let now = Instant::now();
        let ttl = self.config().oauth.state_ttl;
        let states = &self.inner.oauth_states;
        states.retain(|_, issued_at| now.duration_since(*issued_at) < ttl);

        let state = Uuid::new_v4().simple().to_string();
        states.insert(state.clone(), now);
        state
    }

    /// Consumes a CSRF state value on callback.
    /// Returns false if it was never issued or has expired.
    pub fn consume_oauth_state(&self, state: &str) -> bool {
        let ttl = self.config().oauth.state_ttl;
        self.inner
            .oauth_states
            .remove(state)
            .is_some_and(|(_, issued_at)| issued_at.elapsed() < ttl)
    }

    /// Access token to forward upstream, refreshed and written back to the
    /// store when the stored one has expired.
    pub async fn upstream_access_token(&self, session: &Session) -> Result<String> {
        if !session.credentials.is_expired(Utc::now()) {
            return Ok(session.credentials.access_token.clone());
        }

        anyhow::ensure!(
            session.credentials.can_refresh(),
            "access token expired and no refresh token is stored"
        );

        let credentials = self.identity().refresh(&session.credentials).await?;
        let access_token = credentials.access_token.clone();

        // A session logged out during the refresh stays logged out.
        let stored = self
            .sessions()
            .update_credentials(session.token.as_str(), credentials)
            .await
            .context("failed to store refreshed credentials")?;
        if stored {
            tracing::debug!(session = session.token.fingerprint(), "refreshed access token");
        }

        Ok(access_token)
    }

    /// Decides what to do with a failed upstream call: surface it in strict
    /// mode, otherwise log it and let the caller answer with demo data.
    pub fn demo_fallback(&self, operation: &str, error: anyhow::Error) -> Result<(), ApiError> {
        if self.config().strict_upstream() {
            return Err(ApiError::Upstream(error));
        }
        tracing::warn!(operation, "upstream call failed, using demo data: {error:#}");
        Ok(())
    }
}

struct Inner {
    config: ApiConfig,
    identity: Identity,
    projects: Projects,
    sessions: Sessions,
    rate_limiter: Arc<RateLimiter>,
    bulk: BulkSimulator,
    oauth_states: DashMap<String, Instant>,
}
