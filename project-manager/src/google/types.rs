use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Credentials obtained from the Google token endpoint.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl OAuthCredentials {
    /// Access tokens are treated as expired slightly early so a request
    /// started just before expiry doesn't race the provider.
    const EXPIRY_SKEW: TimeDelta = TimeDelta::seconds(60);

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Self::EXPIRY_SKEW >= expires_at,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Response of `https://oauth2.googleapis.com/token`.
#[derive(Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn into_credentials(self, now: DateTime<Utc>) -> OAuthCredentials {
        OAuthCredentials {
            expires_at: self
                .expires_in
                .and_then(TimeDelta::try_seconds)
                .and_then(|ttl| now.checked_add_signed(ttl)),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
        }
    }
}

/// Authenticated user as returned by the `oauth2/v2/userinfo` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "picture", default)]
    pub avatar_url: String,
}

/// A Cloud Resource Manager v1 project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_number: String,
    #[serde(default)]
    pub lifecycle_state: LifecycleState,
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Active,
    DeleteRequested,
    DeleteInProgress,
    #[default]
    Unspecified,
    /// Any value this service does not know about, passed through verbatim.
    Other(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::DeleteRequested => "DELETE_REQUESTED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::Unspecified => "LIFECYCLE_STATE_UNSPECIFIED",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for LifecycleState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ACTIVE" => Self::Active,
            "DELETE_REQUESTED" => Self::DeleteRequested,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "LIFECYCLE_STATE_UNSPECIFIED" => Self::Unspecified,
            _ => Self::Other(s),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateProjectRequest<'a> {
    pub project_id: &'a str,
    pub name: &'a str,
    pub parent: ResourceId<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct ResourceId<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListProjectsResponse {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Long-running operation returned by `projects.create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Service account key file, in the layout Google uses for downloaded keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
}
