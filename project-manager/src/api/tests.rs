use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chrono::{TimeDelta, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use crate::api::config::ApiConfig;
use crate::api::endpoint::ApiEndpoint;
use crate::api::state::ApiState;
use crate::google::{
    IdentityProvider, LifecycleState, OAuthCredentials, Operation, Project, ProjectsApi,
    UserProfile,
};
use crate::sessions::{MemorySessionStore, Session, SessionStore};

struct FakeIdentity {
    fail_exchange: bool,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorization_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse("https://accounts.example.com/auth")?;
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials> {
        anyhow::ensure!(!self.fail_exchange, "invalid_grant");
        Ok(credentials(&format!("access-{code}"), None))
    }

    async fn refresh(&self, _credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        Ok(credentials("refreshed", None))
    }

    async fn fetch_profile(&self, _credentials: &OAuthCredentials) -> Result<UserProfile> {
        Ok(user())
    }
}

/// Resource Manager stand-in that records the access tokens it was given.
#[derive(Clone, Default)]
struct FakeProjects {
    fail: bool,
    seen_tokens: Arc<Mutex<Vec<String>>>,
}

impl FakeProjects {
    fn record(&self, access_token: &str) -> Result<()> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(access_token.to_owned());
        anyhow::ensure!(!self.fail, "PERMISSION_DENIED");
        Ok(())
    }
}

#[async_trait]
impl ProjectsApi for FakeProjects {
    async fn list_projects(&self, access_token: &str) -> Result<Vec<Project>> {
        self.record(access_token)?;
        Ok(vec![Project {
            project_id: "real-project".to_owned(),
            name: "Real Project".to_owned(),
            project_number: "42".to_owned(),
            lifecycle_state: LifecycleState::Active,
            create_time: None,
            billing_enabled: None,
        }])
    }

    async fn create_project(
        &self,
        access_token: &str,
        project_id: &str,
        _name: &str,
    ) -> Result<Operation> {
        self.record(access_token)?;
        Ok(Operation {
            name: format!("operations/cp.{project_id}"),
            done: false,
            metadata: None,
            error: None,
        })
    }

    async fn delete_project(&self, access_token: &str, _project_id: &str) -> Result<()> {
        self.record(access_token)
    }
}

/// Identity provider whose refresh completes after the session was logged out.
struct LogoutDuringRefresh {
    store: Arc<MemorySessionStore>,
    token: Arc<OnceLock<String>>,
}

#[async_trait]
impl IdentityProvider for LogoutDuringRefresh {
    fn authorization_url(&self, state: &str) -> Result<Url> {
        FakeIdentity {
            fail_exchange: false,
        }
        .authorization_url(state)
    }

    async fn exchange_code(&self, _code: &str) -> Result<OAuthCredentials> {
        anyhow::bail!("not used")
    }

    async fn refresh(&self, _credentials: &OAuthCredentials) -> Result<OAuthCredentials> {
        if let Some(token) = self.token.get() {
            self.store.delete(token).await?;
        }
        Ok(credentials("refreshed", None))
    }

    async fn fetch_profile(&self, _credentials: &OAuthCredentials) -> Result<UserProfile> {
        Ok(user())
    }
}

struct PanickingProjects;

#[async_trait]
impl ProjectsApi for PanickingProjects {
    async fn list_projects(&self, _access_token: &str) -> Result<Vec<Project>> {
        panic!("resource manager client bug");
    }

    async fn create_project(&self, _: &str, _: &str, _: &str) -> Result<Operation> {
        anyhow::bail!("not used")
    }

    async fn delete_project(&self, _: &str, _: &str) -> Result<()> {
        anyhow::bail!("not used")
    }
}

fn credentials(access_token: &str, expires_in: Option<i64>) -> OAuthCredentials {
    OAuthCredentials {
        access_token: access_token.to_owned(),
        refresh_token: Some("refresh".to_owned()),
        expires_at: expires_in.map(|secs| Utc::now() + TimeDelta::seconds(secs)),
        scope: None,
    }
}

fn user() -> UserProfile {
    UserProfile {
        id: "1001".to_owned(),
        display_name: "Ada".to_owned(),
        email: "ada@example.com".to_owned(),
        avatar_url: "https://example.com/ada.png".to_owned(),
    }
}

fn test_config() -> ApiConfig {
    let mut config = ApiConfig::default();
    config.bulk.step_delay = Duration::ZERO;
    config
}

struct Harness {
    router: Router,
    store: Arc<MemorySessionStore>,
    projects: FakeProjects,
}

impl Harness {
    fn new() -> Self {
        Self::with(test_config(), FakeProjects::default(), false)
    }

    fn with(config: ApiConfig, projects: FakeProjects, fail_exchange: bool) -> Self {
        let store = Arc::new(MemorySessionStore::default());
        let identity = FakeIdentity { fail_exchange };
        Self::from_parts(config, store, identity, projects.clone(), projects)
    }

    fn from_parts(
        config: ApiConfig,
        store: Arc<MemorySessionStore>,
        identity: impl IdentityProvider + 'static,
        projects_api: impl ProjectsApi + 'static,
        projects: FakeProjects,
    ) -> Self {
        let state = ApiState::builder()
            .with_config(config)
            .with_identity_provider(identity)
            .with_projects_api(projects_api)
            .with_session_store(store.clone())
            .build();
        let router = ApiEndpoint::builder().build_router(state).unwrap();

        Self {
            router,
            store,
            projects,
        }
    }

    async fn login(&self, expires_in: Option<i64>) -> String {
        let session = Session::new(credentials("stored", expires_in), user(), Utc::now());
        let token = session.token.as_str().to_owned();
        self.store.put(session).await.unwrap();
        token
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        body_json(self.send(request("GET", uri, token, None)).await).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        body_json(self.send(request("POST", uri, token, Some(body))).await).await
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn location(response: &Response) -> Url {
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    Url::parse(location).unwrap()
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// ── Health and routing ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_is_public() {
    let harness = Harness::new();
    let (status, body) = harness.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_api_path_is_not_found() {
    let harness = Harness::new();
    let (status, body) = harness.get("/api/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "API endpoint not found" }));
}

#[tokio::test]
async fn other_paths_return_service_banner() {
    let harness = Harness::new();
    let (status, body) = harness.get("/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["auth"], "/auth/google");
}

// ── Authentication ────────────────────────────────────────────────────────────

#[tokio::test]
async fn protected_routes_require_known_session() {
    let harness = Harness::new();

    let (status, body) = harness.get("/api/user", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = harness.get("/api/projects", Some("not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = harness
        .post("/api/projects/bulk", None, json!({ "count": 1 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_flow_creates_session() {
    let harness = Harness::new();

    let (status, body) = harness.get("/auth/google", None).await;
    assert_eq!(status, StatusCode::OK);
    let auth_url = Url::parse(body["authUrl"].as_str().unwrap()).unwrap();
    let csrf_state = query_param(&auth_url, "state").unwrap();

    let response = harness
        .send(request(
            "GET",
            &format!("/auth/callback?code=abc&state={csrf_state}"),
            None,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let redirect = location(&response);
    assert!(redirect.as_str().starts_with("http://localhost:5173"));
    assert_eq!(query_param(&redirect, "authenticated").as_deref(), Some("true"));
    let token = query_param(&redirect, "session").unwrap();

    let (status, body) = harness.get("/api/user", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["name"], "Ada");

    let stored = harness.store.get(&token).await.unwrap().unwrap();
    assert_eq!(stored.credentials.access_token, "access-abc");
}

#[tokio::test]
async fn failed_exchange_redirects_with_error() {
    let mut config = test_config();
    config.oauth.verify_state = false;
    let harness = Harness::with(config, FakeProjects::default(), true);

    let response = harness
        .send(request("GET", "/auth/callback?code=abc", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let redirect = location(&response);
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("auth_failed"));
    assert_eq!(query_param(&redirect, "session"), None);
    assert_eq!(harness.store.len(), 0);
}

#[tokio::test]
async fn callback_rejects_unknown_state() {
    let harness = Harness::new();

    let response = harness
        .send(request("GET", "/auth/callback?code=abc&state=forged", None, None))
        .await;
    let redirect = location(&response);
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("auth_failed"));
    assert_eq!(query_param(&redirect, "session"), None);
}

#[tokio::test]
async fn callback_with_provider_error_fails() {
    let mut config = test_config();
    config.oauth.verify_state = false;
    let harness = Harness::with(config, FakeProjects::default(), false);

    let response = harness
        .send(request("GET", "/auth/callback?error=access_denied", None, None))
        .await;
    let redirect = location(&response);
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("auth_failed"));
}

#[tokio::test]
async fn logout_invalidates_session() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let (status, body) = harness.post("/api/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = harness.get("/api/user", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Logging out twice, or without a session, still succeeds.
    let (status, body) = harness.post("/api/logout", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// ── Projects ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_forwards_to_upstream() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let (status, body) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"][0]["projectId"], "real-project");
    assert_eq!(*harness.projects.seen_tokens.lock().unwrap(), ["stored"]);
}

#[tokio::test]
async fn list_falls_back_to_mock_projects() {
    let projects = FakeProjects {
        fail: true,
        ..Default::default()
    };
    let harness = Harness::with(test_config(), projects, false);
    let token = harness.login(None).await;

    let (status, body) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<_> = body["projects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["projectId"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(ids, ["demo-project-1", "demo-project-2"]);
    assert_eq!(body["projects"][0]["projectNumber"], "123456789");
    assert_eq!(body["projects"][0]["lifecycleState"], "ACTIVE");
}

#[tokio::test]
async fn strict_mode_surfaces_upstream_failure() {
    let mut config = test_config();
    config.strict_upstream = Some(true);
    let projects = FakeProjects {
        fail: true,
        ..Default::default()
    };
    let harness = Harness::with(config, projects, false);
    let token = harness.login(None).await;

    let (status, body) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Upstream request failed");
}

#[tokio::test]
async fn create_returns_operation_from_upstream() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let (status, body) = harness
        .post(
            "/api/projects",
            Some(&token),
            json!({ "projectId": "demo-1", "name": "Demo" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["project"]["name"], "operations/cp.demo-1");
    assert_eq!(body["message"], "Project created successfully");
}

#[tokio::test]
async fn create_falls_back_to_demo_project() {
    let projects = FakeProjects {
        fail: true,
        ..Default::default()
    };
    let harness = Harness::with(test_config(), projects, false);
    let token = harness.login(None).await;

    let (status, body) = harness
        .post(
            "/api/projects",
            Some(&token),
            json!({ "projectId": "demo-1", "name": "Demo" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["projectId"], "demo-1");
    assert_eq!(body["project"]["name"], "Demo");
    assert_eq!(body["project"]["lifecycleState"], "ACTIVE");
    assert_eq!(body["message"], "Project created successfully (Demo Mode)");
}

#[tokio::test]
async fn create_requires_id_and_name() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    for body in [json!({ "name": "Demo" }), json!({ "projectId": "x", "name": " " })] {
        let (status, body) = harness.post("/api/projects", Some(&token), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Project ID and name are required");
    }
    assert!(harness.projects.seen_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delete_falls_back_to_demo_message() {
    let projects = FakeProjects {
        fail: true,
        ..Default::default()
    };
    let harness = Harness::with(test_config(), projects, false);
    let token = harness.login(None).await;

    let response = harness
        .send(request("DELETE", "/api/projects/demo-1", Some(&token), None))
        .await;
    let (status, body) = body_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Project deleted successfully (Demo Mode)");
}

#[tokio::test]
async fn expired_access_token_is_refreshed() {
    let harness = Harness::new();
    let token = harness.login(Some(-10)).await;

    let (status, _) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*harness.projects.seen_tokens.lock().unwrap(), ["refreshed"]);

    let stored = harness.store.get(&token).await.unwrap().unwrap();
    assert_eq!(stored.credentials.access_token, "refreshed");
}

#[tokio::test]
async fn logout_during_refresh_is_not_undone() {
    let store = Arc::new(MemorySessionStore::default());
    let token_slot = Arc::new(OnceLock::new());
    let identity = LogoutDuringRefresh {
        store: store.clone(),
        token: token_slot.clone(),
    };
    let projects = FakeProjects::default();
    let harness = Harness::from_parts(test_config(), store, identity, projects.clone(), projects);

    let token = harness.login(Some(-10)).await;
    token_slot.set(token.clone()).unwrap();

    let (status, _) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*harness.projects.seen_tokens.lock().unwrap(), ["refreshed"]);

    let (status, _) = harness.get("/api/user", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.store.len(), 0);
}

#[tokio::test]
async fn handler_panic_is_answered_with_500() {
    crate::utils::logger::log_panics_with_tracing();

    let store = Arc::new(MemorySessionStore::default());
    let identity = FakeIdentity {
        fail_exchange: false,
    };
    let harness = Harness::from_parts(
        test_config(),
        store,
        identity,
        PanickingProjects,
        FakeProjects::default(),
    );
    let token = harness.login(None).await;

    let (status, body) = harness.get("/api/projects", Some(&token)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));

    // The service keeps serving afterwards.
    let (status, _) = harness.get("/api/user", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

// ── Bulk operations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_create_validates_count() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    for count in [0, 11] {
        let (status, body) = harness
            .post("/api/projects/bulk", Some(&token), json!({ "count": count }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Count must be between 1 and 10");
    }
}

#[tokio::test]
async fn bulk_create_returns_unique_projects() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let (status, body) = harness
        .post(
            "/api/projects/bulk",
            Some(&token),
            json!({ "count": 10, "prefix": "load", "enableBilling": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully created 10 projects (Demo Mode)");
    assert!(body.get("serviceAccountKeys").is_none());

    let projects = body["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 10);
    let mut ids: Vec<_> = projects
        .iter()
        .map(|p| p["projectId"].as_str().unwrap())
        .collect();
    assert!(ids.iter().all(|id| id.starts_with("load-")));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn bulk_create_includes_keys_when_requested() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let (status, body) = harness
        .post(
            "/api/projects/bulk",
            Some(&token),
            json!({ "count": 1, "createServiceAccounts": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let keys = body["serviceAccountKeys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["project_id"], body["projects"][0]["projectId"]);
    assert_eq!(keys[0]["type"], "service_account");
}

#[tokio::test]
async fn bulk_delete_validates_and_counts() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    for body in [json!({ "projectIds": [] }), json!({})] {
        let (status, body) = harness
            .post("/api/projects/bulk-delete", Some(&token), body)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Project IDs array is required");
    }

    let (status, body) = harness
        .post(
            "/api/projects/bulk-delete",
            Some(&token),
            json!({ "projectIds": ["a", "b", "c"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully deleted 3 projects (Demo Mode)");
}

#[tokio::test]
async fn download_keys_is_an_attachment() {
    let harness = Harness::new();
    let token = harness.login(None).await;

    let response = harness
        .send(request(
            "POST",
            "/api/projects/download-keys",
            Some(&token),
            Some(json!({ "projectIds": ["alpha", "beta"] })),
        ))
        .await;
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"service-account-keys.json\""
    );

    let (status, body) = body_json(response).await;
    assert_eq!(status, StatusCode::OK);
    let keys = body.as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys[1]["client_email"],
        "demo-service-account@beta.iam.gserviceaccount.com"
    );
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_requests_are_rate_limited_per_client() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let harness = Harness::with(config, FakeProjects::default(), false);

    let from = |ip: &str| {
        Request::builder()
            .uri("/api/user")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for remaining in ["1", "0"] {
        let response = harness.send(from("10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["ratelimit-remaining"], remaining);
    }

    let response = harness.send(from("10.0.0.1")).await;
    assert!(response.headers().contains_key("retry-after"));
    let (status, body) = body_json(response).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({ "error": "Too many requests from this IP, please try again later." })
    );

    let response = harness.send(from("10.0.0.2")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Health checks are outside the limited scope.
    let response = harness
        .send(
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "10.0.0.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
