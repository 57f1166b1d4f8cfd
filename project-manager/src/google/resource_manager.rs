use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use super::types::{
    CreateProjectRequest, ListProjectsResponse, Operation, Project, ResourceId,
};

const RESOURCE_MANAGER_API_BASE: &str = "https://cloudresourcemanager.googleapis.com/v1/";

/// Project operations forwarded to Google Cloud on behalf of a user.
#[async_trait]
pub trait ProjectsApi: Send + Sync {
    async fn list_projects(&self, access_token: &str) -> Result<Vec<Project>>;

    async fn create_project(
        &self,
        access_token: &str,
        project_id: &str,
        name: &str,
    ) -> Result<Operation>;

    async fn delete_project(&self, access_token: &str, project_id: &str) -> Result<()>;
}

/// Cloud Resource Manager v1 REST client.
pub struct ResourceManagerClient {
    http: reqwest::Client,
    base_url: Url,
    organization_id: String,
}

impl ResourceManagerClient {
    pub fn new(http: reqwest::Client, organization_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http,
            base_url: Url::parse(RESOURCE_MANAGER_API_BASE)?,
            organization_id: organization_id.into(),
        })
    }

    fn projects_url(&self) -> Result<Url> {
        self.base_url.join("projects").map_err(Into::into)
    }

    fn project_url(&self, project_id: &str) -> Result<Url> {
        let mut url = self.projects_url()?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("base url cannot be a base"))?
            .push(project_id);
        Ok(url)
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{what} failed ({status}): {body}")
}

#[async_trait]
impl ProjectsApi for ResourceManagerClient {
    async fn list_projects(&self, access_token: &str) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.projects_url()?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self
                .http
                .get(url)
                .bearer_auth(access_token)
                .send()
                .await
                .context("failed to call projects.list")?;

            let page: ListProjectsResponse = check_status(response, "projects.list")
                .await?
                .json()
                .await
                .context("invalid projects.list response")?;

            projects.extend(page.projects);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(projects)
    }

    async fn create_project(
        &self,
        access_token: &str,
        project_id: &str,
        name: &str,
    ) -> Result<Operation> {
        let request = CreateProjectRequest {
            project_id,
            name,
            parent: ResourceId {
                kind: "organization",
                id: &self.organization_id,
            },
        };

        let response = self
            .http
            .post(self.projects_url()?)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .context("failed to call projects.create")?;

        check_status(response, "projects.create")
            .await?
            .json()
            .await
            .context("invalid projects.create response")
    }

    async fn delete_project(&self, access_token: &str, project_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.project_url(project_id)?)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to call projects.delete")?;

        check_status(response, "projects.delete").await?;
        Ok(())
    }
}
