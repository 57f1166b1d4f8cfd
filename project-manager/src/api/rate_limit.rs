use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::api::config::RateLimitConfig;
use crate::api::error::ApiError;

/// Client windows kept before stale ones are swept on insert.
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, ClientWindow>,
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started_at: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            clients: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, client: &str) -> Decision {
        let now = Instant::now();

        if self.clients.len() >= MAX_TRACKED_CLIENTS && !self.clients.contains_key(client) {
            self.clients
                .retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let mut entry = self
            .clients
            .entry(client.to_owned())
            .or_insert(ClientWindow {
                started_at: now,
                count: 0,
            });

        let window = entry.value_mut();
        let elapsed = now.duration_since(window.started_at);
        if elapsed >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return Decision::Limited {
                retry_after: self.window.saturating_sub(now.duration_since(window.started_at)),
            };
        }

        window.count += 1;
        Decision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }
}

fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = client_key(&request);
    match limiter.check(&client) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(%client, "rate limit exceeded");
            let mut response = ApiError::TooManyRequests.into_response();
            response.headers_mut().insert(
                "retry-after",
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            response
        }
    }
}
