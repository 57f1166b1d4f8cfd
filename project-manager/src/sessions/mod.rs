use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::google::{OAuthCredentials, UserProfile};

pub use self::config::SessionConfig;
pub use self::memory::MemorySessionStore;
pub use self::token::{SessionToken, fingerprint};

mod config;
mod memory;
mod token;

/// A logged-in browser: provider credentials plus who they belong to.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub credentials: OAuthCredentials,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(credentials: OAuthCredentials, user: UserProfile, created_at: DateTime<Utc>) -> Self {
        Self {
            token: SessionToken::generate(),
            credentials,
            user,
            created_at,
        }
    }
}

/// Storage for sessions keyed by their token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces the session stored under `session.token`.
    async fn put(&self, session: Session) -> Result<()>;

    /// Returns the live session for `token`, if any.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    /// Swaps the credentials of a live session in place. Returns false
    /// without writing anything if the session is gone.
    async fn update_credentials(
        &self,
        token: &str,
        credentials: OAuthCredentials,
    ) -> Result<bool>;

    /// Removes the session. Returns whether it existed.
    async fn delete(&self, token: &str) -> Result<bool>;

    /// Drops sessions past their lifetime. Returns how many were removed.
    async fn evict_expired(&self) -> Result<usize>;
}

/// Periodically evicts expired sessions until the store is dropped elsewhere
/// and the task is aborted.
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.evict_expired().await {
                Ok(0) => {}
                Ok(evicted) => tracing::info!(evicted, "evicted expired sessions"),
                Err(e) => tracing::error!("session sweep failed: {e:?}"),
            }
        }
    })
}
