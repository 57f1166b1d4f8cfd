use std::any::Any;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Json;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;

use crate::api::controllers;
use crate::api::error::{ApiError, ErrorBody};
use crate::api::models::auth::HealthResponse;
use crate::api::rate_limit;
use crate::api::state::*;
use crate::utils::signal::shutdown_signal;

#[derive(Default)]
pub struct ApiEndpointBuilder {
    healthcheck_route: Option<String>,
}

impl ApiEndpointBuilder {
    #[allow(unused)]
    pub fn with_healthcheck_route(mut self, route: impl Into<String>) -> Self {
        self.healthcheck_route = Some(route.into());
        self
    }

    pub async fn bind(self, state: ApiState) -> Result<ApiEndpoint> {
        let listener = state.bind_socket().await?;
        let router = self.build_router(state)?;
        Ok(ApiEndpoint { listener, router })
    }

    /// Full application router with the middleware stack applied.
    pub fn build_router(self, state: ApiState) -> Result<axum::Router<()>> {
        use tower::ServiceBuilder;
        use tower_http::catch_panic::CatchPanicLayer;
        use tower_http::cors::CorsLayer;
        use tower_http::timeout::TimeoutLayer;
        use tower_http::trace::TraceLayer;

        let config = state.config();

        let frontend_origin = HeaderValue::from_str(config.frontend_url())
            .context("frontend URL is not a valid origin")?;
        let cors = CorsLayer::new()
            .allow_origin(frontend_origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        // Prepare middleware
        let service = ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
            .layer(cors)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ));

        #[cfg(feature = "compression")]
        let service = service.layer(tower_http::compression::CompressionLayer::new().gzip(true));

        let healthcheck_route = self.healthcheck_route.as_deref().unwrap_or("/health");

        // Prepare routes
        let router = axum::Router::new()
            .route(healthcheck_route, get(health_check))
            .nest("/auth", auth_router())
            .nest("/api", api_router(&state))
            .fallback(service_banner)
            .layer(service)
            .with_state(state);

        Ok(router)
    }
}

pub struct ApiEndpoint {
    listener: TcpListener,
    router: axum::Router<()>,
}

impl ApiEndpoint {
    pub fn builder() -> ApiEndpointBuilder {
        ApiEndpointBuilder::default()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until a termination signal arrives, then drains in-flight
    /// requests.
    pub async fn serve(self) -> std::io::Result<()> {
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

fn auth_router<S>() -> axum::Router<S>
where
    ApiState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    axum::Router::new()
        .route("/google", get(controllers::auth::login))
        .route("/callback", get(controllers::auth::callback))
}

fn api_router<S>(state: &ApiState) -> axum::Router<S>
where
    ApiState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    axum::Router::new()
        .route("/user", get(controllers::user::info))
        .route(
            "/projects",
            get(controllers::projects::list).post(controllers::projects::create),
        )
        .route("/projects/{project_id}", delete(controllers::projects::delete))
        .route("/projects/bulk", post(controllers::bulk::create))
        .route("/projects/bulk-delete", post(controllers::bulk::delete))
        .route("/projects/download-keys", post(controllers::bulk::download_keys))
        .route("/logout", post(controllers::auth::logout))
        .fallback(api_not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter(),
            rate_limit::rate_limit,
        ))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
    })
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound
}

async fn service_banner(method: Method) -> Response {
    if method != Method::GET {
        return (StatusCode::NOT_FOUND, Json(ErrorBody { error: "Not found" })).into_response();
    }

    Json(json!({
        "message": "GCP Project Manager API Server",
        "status": "running",
        "endpoints": {
            "auth": "/auth/google",
            "api": "/api/*",
        },
    }))
    .into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    ApiError::Internal(anyhow::anyhow!("handler panicked: {details}")).into_response()
}

const MAX_REQUEST_SIZE: usize = 2 << 17; // 256kb
