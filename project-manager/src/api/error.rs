use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::demo::BulkError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream request failed: {0:#}")]
    Upstream(#[source] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),

    #[error("Too many requests from this IP, please try again later.")]
    TooManyRequests,

    #[error("API endpoint not found")]
    NotFound,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Upstream(e) => {
                tracing::warn!("upstream failure surfaced to client: {e:#}");
                "Upstream request failed".to_owned()
            }
            Self::Internal(e) => {
                tracing::error!("internal error: {e:?}");
                "Internal server error".to_owned()
            }
            other => other.to_string(),
        };

        (self.status(), Json(ErrorBody { error: &message })).into_response()
    }
}

impl From<BulkError> for ApiError {
    fn from(e: BulkError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
