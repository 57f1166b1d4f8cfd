use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header;
use axum::response::IntoResponse;

use crate::api::controllers::auth::AuthSession;
use crate::api::error::ApiError;
use crate::api::models::projects::{
    BulkCreateRequest, BulkCreateResponse, MessageResponse, ProjectIdsRequest,
};
use crate::api::state::ApiState;
use crate::demo::{self, BulkCreate, ProgressUpdate};

const KEYS_ATTACHMENT: &str = "attachment; filename=\"service-account-keys.json\"";

fn log_progress(update: ProgressUpdate) {
    tracing::debug!(
        current = update.current,
        total = update.total,
        project_id = update.project_id.as_deref(),
        "{}",
        update.status
    );
}

pub async fn create(
    State(state): State<ApiState>,
    AuthSession(session): AuthSession,
    body: Result<Json<BulkCreateRequest>, JsonRejection>,
) -> Result<Json<BulkCreateResponse>, ApiError> {
    let Json(req) = body?;

    let request = BulkCreate {
        count: req.count,
        prefix: req.prefix,
        enable_billing: req.enable_billing,
        create_service_accounts: req.create_service_accounts,
    };

    tracing::info!(
        email = %session.user.email,
        count = request.count,
        prefix = %request.prefix,
        "bulk project creation started"
    );

    let outcome = state.bulk().create(&request, log_progress).await?;
    let created = outcome.projects.len();

    Ok(Json(BulkCreateResponse {
        success: true,
        projects: outcome.projects,
        service_account_keys: outcome.service_account_keys,
        message: format!("Successfully created {created} projects (Demo Mode)"),
    }))
}

pub async fn delete(
    State(state): State<ApiState>,
    AuthSession(session): AuthSession,
    body: Result<Json<ProjectIdsRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Project IDs array is required"))?;

    tracing::info!(
        email = %session.user.email,
        count = req.project_ids.len(),
        "bulk project deletion started"
    );

    let deleted = state.bulk().delete(&req.project_ids, log_progress).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: format!("Successfully deleted {deleted} projects (Demo Mode)"),
    }))
}

pub async fn download_keys(
    AuthSession(_session): AuthSession,
    body: Result<Json<ProjectIdsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;

    let keys = req
        .project_ids
        .iter()
        .map(|project_id| demo::fabricate_service_account_key(project_id))
        .collect::<Vec<_>>();

    Ok(([(header::CONTENT_DISPOSITION, KEYS_ATTACHMENT)], Json(keys)))
}
