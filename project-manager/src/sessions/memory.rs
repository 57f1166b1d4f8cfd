use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use super::{Session, SessionStore};
use crate::google::OAuthCredentials;
use crate::utils::time::{Clock, system_clock};

/// Process-local session store. Sessions vanish on restart.
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
    ttl: Option<TimeDelta>,
    clock: Clock,
}

impl MemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_clock(ttl, system_clock())
    }

    pub fn with_clock(ttl: Option<Duration>, clock: Clock) -> Self {
        Self {
            sessions: DashMap::new(),
            // Durations beyond chrono's range never expire in practice.
            ttl: ttl.and_then(|ttl| TimeDelta::from_std(ttl).ok()),
            clock,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        // Past chrono's last representable instant counts as never.
        session
            .created_at
            .checked_add_signed(ttl)
            .is_some_and(|expires_at| expires_at <= now)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.token.as_str().to_owned(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let now = (self.clock)();
        let session = self.sessions.get(token).map(|entry| entry.value().clone());
        Ok(session.filter(|session| !self.is_expired(session, now)))
    }

    async fn update_credentials(
        &self,
        token: &str,
        credentials: OAuthCredentials,
    ) -> Result<bool> {
        let now = (self.clock)();
        // The shard stays locked until the write is done, so a concurrent
        // delete either runs first or removes the updated entry.
        let Some(mut entry) = self.sessions.get_mut(token) else {
            return Ok(false);
        };
        if self.is_expired(&entry, now) {
            return Ok(false);
        }
        entry.credentials = credentials;
        Ok(true)
    }

    async fn delete(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn evict_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }

        let now = (self.clock)();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.is_expired(session, now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
