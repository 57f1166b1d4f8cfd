use anyhow::Context;
use axum::Json;
use axum::extract::{FromRef, FromRequestParts, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::Redirect;
use chrono::Utc;
use url::Url;

use crate::api::error::ApiError;
use crate::api::models::auth::{AuthUrlResponse, LogoutResponse, OAuthCallbackQuery};
use crate::api::state::ApiState;
use crate::sessions::{Session, fingerprint};

// ── Session extractor ─────────────────────────────────────────────────────────

/// Session looked up from the `Authorization: Bearer <token>` header.
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    ApiState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        let api_state = ApiState::from_ref(state);
        let session = api_state
            .sessions()
            .get(token)
            .await
            .context("session lookup failed")?;

        match session {
            Some(session) => Ok(AuthSession(session)),
            None => {
                tracing::debug!(session = fingerprint(token), "rejected unknown session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ── Google ────────────────────────────────────────────────────────────────────

pub async fn login(State(state): State<ApiState>) -> Result<Json<AuthUrlResponse>, ApiError> {
    let csrf_state = state.issue_oauth_state();
    let auth_url = state.identity().authorization_url(&csrf_state)?;

    tracing::info!("OAuth login initiated");

    Ok(Json(AuthUrlResponse {
        auth_url: auth_url.into(),
    }))
}

pub async fn callback(
    State(state): State<ApiState>,
    Query(params): Query<OAuthCallbackQuery>,
) -> Redirect {
    let frontend_url = state.config().frontend_url().to_owned();

    match callback_impl(&state, params).await {
        Ok(session) => {
            let token = session.token.clone();
            tracing::info!(
                email = %session.user.email,
                session = token.fingerprint(),
                "user authenticated"
            );
            redirect_to_frontend(&frontend_url, &[
                ("session", token.as_str()),
                ("authenticated", "true"),
            ])
        }
        Err(e) => {
            tracing::warn!("OAuth callback failed: {e:#}");
            redirect_to_frontend(&frontend_url, &[("error", "auth_failed")])
        }
    }
}

pub async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> Json<LogoutResponse> {
    if let Some(token) = bearer_token(&headers) {
        match state.sessions().delete(token).await {
            Ok(true) => tracing::info!(session = fingerprint(token), "user logged out"),
            Ok(false) => {}
            Err(e) => tracing::error!("failed to delete session: {e:?}"),
        }
    }
    Json(LogoutResponse { success: true })
}

// ── Impl ──────────────────────────────────────────────────────────────────────

async fn callback_impl(state: &ApiState, params: OAuthCallbackQuery) -> anyhow::Result<Session> {
    if let Some(error) = params.error {
        anyhow::bail!("provider returned error: {error}");
    }

    if state.config().oauth.verify_state {
        let csrf_state = params.state.as_deref().unwrap_or_default();
        anyhow::ensure!(
            state.consume_oauth_state(csrf_state),
            "invalid or expired CSRF state"
        );
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .context("missing authorization code")?;

    let credentials = state.identity().exchange_code(&code).await?;
    let user = state
        .identity()
        .fetch_profile(&credentials)
        .await
        .context("failed to fetch user profile")?;

    let session = Session::new(credentials, user, Utc::now());
    state.sessions().put(session.clone()).await?;

    Ok(session)
}

fn redirect_to_frontend(frontend_url: &str, params: &[(&str, &str)]) -> Redirect {
    match Url::parse(frontend_url) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            Redirect::to(url.as_str())
        }
        Err(e) => {
            tracing::error!(frontend_url, "invalid frontend URL: {e}");
            Redirect::to("/")
        }
    }
}
