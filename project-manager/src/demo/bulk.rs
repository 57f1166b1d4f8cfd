use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::{fabricate_project, fabricate_service_account_key};
use crate::google::{Project, ServiceAccountKey};

const DEFAULT_PREFIX: &str = "project";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BulkError {
    #[error("Count must be between 1 and {max}")]
    CountOutOfRange { max: u32 },
    #[error("Project IDs array is required")]
    NoProjectIds,
    #[error("Project IDs must be non-empty strings")]
    BlankProjectId,
}

/// Progress of an in-flight bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BulkCreate {
    pub count: u32,
    pub prefix: String,
    pub enable_billing: bool,
    pub create_service_accounts: bool,
}

#[derive(Debug, Default)]
pub struct BulkCreateOutcome {
    pub projects: Vec<Project>,
    /// Present only when service accounts were requested.
    pub service_account_keys: Option<Vec<ServiceAccountKey>>,
}

/// Runs bulk create/delete as a sequence of simulated provisioning steps.
///
/// Nothing here talks to Google Cloud. Steps run one after another with
/// `step_delay` between them.
#[derive(Debug, Clone)]
pub struct BulkSimulator {
    max_count: u32,
    step_delay: Duration,
}

impl BulkSimulator {
    pub fn new(max_count: u32, step_delay: Duration) -> Self {
        Self {
            max_count,
            step_delay,
        }
    }

    pub fn check_count(&self, count: u32) -> Result<(), BulkError> {
        if (1..=self.max_count).contains(&count) {
            Ok(())
        } else {
            Err(BulkError::CountOutOfRange {
                max: self.max_count,
            })
        }
    }

    pub async fn create<F>(
        &self,
        request: &BulkCreate,
        mut on_progress: F,
    ) -> Result<BulkCreateOutcome, BulkError>
    where
        F: FnMut(ProgressUpdate),
    {
        self.check_count(request.count)?;

        let prefix = match request.prefix.trim() {
            "" => DEFAULT_PREFIX,
            prefix => prefix,
        };
        let total = request.count as usize;
        let started_at = Utc::now();
        let timestamp = started_at.timestamp_millis();

        let mut outcome = BulkCreateOutcome {
            projects: Vec::with_capacity(total),
            service_account_keys: request
                .create_service_accounts
                .then(|| Vec::with_capacity(total)),
        };

        for i in 1..=total {
            if i > 1 {
                tokio::time::sleep(self.step_delay).await;
            }

            let project_id = format!("{prefix}-{timestamp}-{i}");
            on_progress(ProgressUpdate {
                current: i - 1,
                total,
                status: format!("Creating project {i} of {total}..."),
                project_id: Some(project_id.clone()),
            });

            let mut project =
                fabricate_project(&project_id, &format!("{prefix} Project {i}"), Utc::now());
            project.billing_enabled = Some(request.enable_billing);

            if let Some(keys) = &mut outcome.service_account_keys {
                keys.push(fabricate_service_account_key(&project_id));
            }
            outcome.projects.push(project);
        }

        on_progress(ProgressUpdate {
            current: total,
            total,
            status: format!("Created {total} projects"),
            project_id: None,
        });

        Ok(outcome)
    }

    /// Walks through `project_ids` without deleting anything upstream.
    /// Returns how many were processed.
    pub async fn delete<F>(
        &self,
        project_ids: &[String],
        mut on_progress: F,
    ) -> Result<usize, BulkError>
    where
        F: FnMut(ProgressUpdate),
    {
        if project_ids.is_empty() {
            return Err(BulkError::NoProjectIds);
        }
        if project_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(BulkError::BlankProjectId);
        }

        let total = project_ids.len();
        for (i, project_id) in project_ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.step_delay).await;
            }

            on_progress(ProgressUpdate {
                current: i,
                total,
                status: format!("Deleting project {} of {total}...", i + 1),
                project_id: Some(project_id.clone()),
            });
        }

        on_progress(ProgressUpdate {
            current: total,
            total,
            status: format!("Deleted {total} projects"),
            project_id: None,
        });

        Ok(total)
    }
}
