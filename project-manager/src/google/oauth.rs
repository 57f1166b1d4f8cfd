use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use super::types::{OAuthCredentials, TokenResponse, UserProfile};
use crate::api::config::ApiSecrets;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// OAuth2 provider used by the login flow and for refreshing stored tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL the browser is sent to. `state` is echoed back on callback.
    fn authorization_url(&self, state: &str) -> Result<Url>;

    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials>;

    /// Obtains a new access token. The refresh token is carried over when the
    /// provider does not rotate it.
    async fn refresh(&self, credentials: &OAuthCredentials) -> Result<OAuthCredentials>;

    async fn fetch_profile(&self, credentials: &OAuthCredentials) -> Result<UserProfile>;
}

pub struct GoogleOAuthClient {
    http: reqwest::Client,
    secrets: ApiSecrets,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    pub fn new(http: reqwest::Client, secrets: ApiSecrets, base_url: &str) -> Self {
        Self {
            http,
            secrets,
            redirect_uri: format!("{}/auth/callback", base_url.trim_end_matches('/')),
        }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.http.post(TOKEN_ENDPOINT).form(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token endpoint returned {status}: {body}");
        }

        response.json().await.context("invalid token response")
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(AUTH_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("client_id", self.secrets.client_id.as_str())
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials> {
        let token = self
            .request_token(&[
                ("code", code),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await
            .context("failed to exchange authorization code")?;

        Ok(token.into_credentials(Utc::now()))
    }

    async fn refresh(&self, credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .context("no refresh token stored")?;

        let token = self
            .request_token(&[
                ("refresh_token", refresh_token),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await
            .context("failed to refresh access token")?;

        let mut refreshed = token.into_credentials(Utc::now());
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = credentials.refresh_token.clone();
        }
        Ok(refreshed)
    }

    async fn fetch_profile(&self, credentials: &OAuthCredentials) -> Result<UserProfile> {
        self.http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?
            .error_for_status()
            .context("userinfo request failed")?
            .json()
            .await
            .context("invalid userinfo response")
    }
}
