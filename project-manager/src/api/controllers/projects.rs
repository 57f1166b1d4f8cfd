use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use chrono::Utc;

use crate::api::controllers::auth::AuthSession;
use crate::api::error::ApiError;
use crate::api::models::projects::{
    CreateProjectRequest, CreateProjectResponse, CreatedProject, MessageResponse,
    ProjectsResponse,
};
use crate::api::state::ApiState;
use crate::demo;

pub async fn list(
    State(state): State<ApiState>,
    AuthSession(session): AuthSession,
) -> Result<Json<ProjectsResponse>, ApiError> {
    let result = async {
        let access_token = state.upstream_access_token(&session).await?;
        state.projects().list_projects(&access_token).await
    }
    .await;

    let projects = match result {
        Ok(projects) => projects,
        Err(e) => {
            state.demo_fallback("projects.list", e)?;
            demo::mock_projects()
        }
    };

    Ok(Json(ProjectsResponse { projects }))
}

pub async fn create(
    State(state): State<ApiState>,
    AuthSession(session): AuthSession,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<Json<CreateProjectResponse>, ApiError> {
    let Json(req) = body?;

    let (Some(project_id), Some(name)) = (
        req.project_id.filter(|s| !s.trim().is_empty()),
        req.name.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("Project ID and name are required"));
    };

    let result = async {
        let access_token = state.upstream_access_token(&session).await?;
        state
            .projects()
            .create_project(&access_token, &project_id, &name)
            .await
    }
    .await;

    let response = match result {
        Ok(operation) => {
            tracing::info!(%project_id, operation = %operation.name, "project creation requested");
            CreateProjectResponse {
                success: true,
                project: CreatedProject::Operation(operation),
                message: "Project created successfully".to_owned(),
            }
        }
        Err(e) => {
            state.demo_fallback("projects.create", e)?;
            CreateProjectResponse {
                success: true,
                project: CreatedProject::Project(demo::fabricate_project(
                    &project_id,
                    &name,
                    Utc::now(),
                )),
                message: "Project created successfully (Demo Mode)".to_owned(),
            }
        }
    };

    Ok(Json(response))
}

pub async fn delete(
    State(state): State<ApiState>,
    AuthSession(session): AuthSession,
    Path(project_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let result = async {
        let access_token = state.upstream_access_token(&session).await?;
        state
            .projects()
            .delete_project(&access_token, &project_id)
            .await
    }
    .await;

    let message = match result {
        Ok(()) => {
            tracing::info!(%project_id, "project deletion requested");
            "Project deleted successfully"
        }
        Err(e) => {
            state.demo_fallback("projects.delete", e)?;
            "Project deleted successfully (Demo Mode)"
        }
    };

    Ok(Json(MessageResponse {
        success: true,
        message: message.to_owned(),
    }))
}
