//! Project membership checks delegated to the project service.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use live_common::{ProjectId, UserId};
use parking_lot::RwLock;
use reqwest::StatusCode;

use crate::error::ServiceError;

/// Answers "may this user see this project's live updates?".
#[async_trait]
pub trait ProjectMembership: Send + Sync {
    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, ServiceError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests / no project service configured)
// ---------------------------------------------------------------------------

pub struct MemoryMembership {
    projects: RwLock<HashMap<ProjectId, HashSet<UserId>>>,
}

impl MemoryMembership {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_member(&self, project_id: ProjectId, user_id: UserId) {
        self.projects
            .write()
            .entry(project_id)
            .or_default()
            .insert(user_id);
    }

    pub fn remove_member(&self, project_id: ProjectId, user_id: UserId) {
        if let Some(members) = self.projects.write().get_mut(&project_id) {
            members.remove(&user_id);
        }
    }

    pub fn remove_project(&self, project_id: ProjectId) {
        self.projects.write().remove(&project_id);
    }
}

impl Default for MemoryMembership {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectMembership for MemoryMembership {
    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, ServiceError> {
        Ok(self
            .projects
            .read()
            .get(&project_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}

// ---------------------------------------------------------------------------
// Project service over HTTP
// ---------------------------------------------------------------------------

/// Asks the project service `GET {base}/api/projects/{project}/members/{user}`.
///
/// 200 means member, 404 means not a member, anything else is a service error.
pub struct HttpMembership {
    base_url: String,
    http: reqwest::Client,
}

impl HttpMembership {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProjectMembership for HttpMembership {
    async fn is_member(&self, project_id: ProjectId, user_id: UserId) -> Result<bool, ServiceError> {
        let url = format!(
            "{}/api/projects/{project_id}/members/{user_id}",
            self.base_url
        );
        let resp = self.http.get(&url).send().await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                tracing::error!(%url, %status, "unexpected membership response");
                Err(ServiceError::unexpected_response(format!(
                    "Membership check returned {status}"
                )))
            }
        }
    }
}
