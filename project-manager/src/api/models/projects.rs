use serde::{Deserialize, Serialize};

use crate::google::{Operation, Project, ServiceAccountKey};

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub project_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    pub success: bool,
    pub project: CreatedProject,
    pub message: String,
}

/// What Google returned for `projects.create`, or the stand-in fabricated
/// when the call failed.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreatedProject {
    Operation(Operation),
    Project(Project),
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BulkCreateRequest {
    pub count: u32,
    pub prefix: String,
    pub enable_billing: bool,
    pub create_service_accounts: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateResponse {
    pub success: bool,
    pub projects: Vec<Project>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_keys: Option<Vec<ServiceAccountKey>>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdsRequest {
    pub project_ids: Vec<String>,
}
