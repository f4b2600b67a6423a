#![allow(async_fn_in_trait)]

use std::collections::BTreeMap;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::instrument;

use super::gitlab_curl::GitlabCurlClient;
use crate::config::Config;

/// GitLab caps `per_page` at this value.
const MAX_PER_PAGE: usize = 100;

// -----------------------------------------------------------------------------
// GitlabOps trait

/// Operations against the GitLab REST API
#[cfg_attr(test, automock)]
pub trait GitlabOps {
    /// Look up a project by its `namespace/project` path
    async fn find_project(&self, path: &str) -> Result<Project>;

    async fn get_project(&self, id: u64) -> Result<Project>;

    /// List at most `limit` merge requests of a project matching `query`
    async fn list_merge_requests(
        &self,
        project_id: u64,
        query: &MergeRequestQuery,
        limit: usize,
    ) -> Result<Vec<MergeRequest>>;

    async fn get_merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest>;

    async fn get_issue(&self, project_id: u64, iid: u64) -> Result<Issue>;

    /// Create a pipeline for a branch or tag
    async fn create_pipeline(&self, project_id: u64, git_ref: &str) -> Result<Pipeline>;

    /// Create a merge request pipeline
    async fn create_merge_request_pipeline(&self, project_id: u64, iid: u64) -> Result<Pipeline>;

    /// Run a pipeline trigger
    async fn trigger_pipeline(
        &self,
        project_id: u64,
        request: &TriggerPipeline,
    ) -> Result<Pipeline>;

    /// List todos of the authenticated user. `None` lists all of them.
    async fn list_todos(
        &self,
        target_type: Option<TodoTargetType>,
        limit: Option<usize>,
    ) -> Result<Vec<Todo>>;

    /// The authenticated user
    async fn current_user(&self) -> Result<User>;
}

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub ssh_url_to_repo: String,
    #[serde(default)]
    pub http_url_to_repo: String,
    #[serde(default)]
    pub web_url: String,
}

impl Project {
    /// URL to clone the project with
    pub fn url_to_repo(&self, https: bool) -> &str {
        if https {
            &self.http_url_to_repo
        } else {
            &self.ssh_url_to_repo
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    pub source_branch: String,
    pub source_project_id: u64,
    pub author: User,
    #[serde(default)]
    pub draft: bool,
    /// Older GitLab versions only report this
    #[serde(default)]
    pub work_in_progress: bool,
    #[serde(default)]
    pub web_url: String,
}

impl MergeRequest {
    pub fn is_draft(&self) -> bool {
        self.draft || self.work_in_progress
    }
}

/// How to select merge requests of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeRequestQuery {
    /// By project-local id
    Iid(u64),
    /// Open merge requests from a source branch
    SourceBranch(String),
}

impl MergeRequestQuery {
    fn to_query_string(&self) -> String {
        match self {
            // Brackets are encoded so curl does not treat them as a glob
            MergeRequestQuery::Iid(iid) => format!("iids%5B%5D={}", iid),
            MergeRequestQuery::SourceBranch(branch) => format!(
                "source_branch={}&state=opened",
                urlencoding::encode(branch)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerPipeline {
    pub token: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoTargetType {
    MergeRequest,
    Issue,
}

impl TodoTargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoTargetType::MergeRequest => "MergeRequest",
            TodoTargetType::Issue => "Issue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TodoProject {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub action_name: String,
    pub target_type: String,
    pub target_url: String,
    pub project: TodoProject,
    pub author: User,
}

// -----------------------------------------------------------------------------
// GitlabClient

/// Client to interact with the GitLab API.
pub struct GitlabClient {
    api_url: String,
    http_client: GitlabCurlClient,
}

impl GitlabClient {
    pub fn new(config: &Config) -> Self {
        Self {
            api_url: config.api_url(),
            http_client: GitlabCurlClient::new(config.token.clone()),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        let response = self.http_client.get(&url).await?;
        Ok(serde_json::from_str(&response)?)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        json_data: Option<&str>,
    ) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        let response = self.http_client.post(&url, json_data).await?;
        Ok(serde_json::from_str(&response)?)
    }
}

impl GitlabOps for GitlabClient {
    #[instrument(skip_all)]
    async fn find_project(&self, path: &str) -> Result<Project> {
        self.get_json(&format!("/projects/{}", urlencoding::encode(path)))
            .await
    }

    #[instrument(skip_all)]
    async fn get_project(&self, id: u64) -> Result<Project> {
        self.get_json(&format!("/projects/{}", id)).await
    }

    #[instrument(skip_all)]
    async fn list_merge_requests(
        &self,
        project_id: u64,
        query: &MergeRequestQuery,
        limit: usize,
    ) -> Result<Vec<MergeRequest>> {
        let per_page = limit.clamp(1, MAX_PER_PAGE);
        let mut mrs: Vec<MergeRequest> = self
            .get_json(&format!(
                "/projects/{}/merge_requests?{}&per_page={}",
                project_id,
                query.to_query_string(),
                per_page
            ))
            .await?;
        mrs.truncate(limit);
        Ok(mrs)
    }

    #[instrument(skip_all)]
    async fn get_merge_request(&self, project_id: u64, iid: u64) -> Result<MergeRequest> {
        self.get_json(&format!("/projects/{}/merge_requests/{}", project_id, iid))
            .await
    }

    #[instrument(skip_all)]
    async fn get_issue(&self, project_id: u64, iid: u64) -> Result<Issue> {
        self.get_json(&format!("/projects/{}/issues/{}", project_id, iid))
            .await
    }

    #[instrument(skip_all)]
    async fn create_pipeline(&self, project_id: u64, git_ref: &str) -> Result<Pipeline> {
        self.post_json(
            &format!(
                "/projects/{}/pipeline?ref={}",
                project_id,
                urlencoding::encode(git_ref)
            ),
            None,
        )
        .await
    }

    #[instrument(skip_all)]
    async fn create_merge_request_pipeline(&self, project_id: u64, iid: u64) -> Result<Pipeline> {
        self.post_json(
            &format!("/projects/{}/merge_requests/{}/pipelines", project_id, iid),
            None,
        )
        .await
    }

    #[instrument(skip_all)]
    async fn trigger_pipeline(
        &self,
        project_id: u64,
        request: &TriggerPipeline,
    ) -> Result<Pipeline> {
        let json_data = serde_json::to_string(request)?;
        self.post_json(
            &format!("/projects/{}/trigger/pipeline", project_id),
            Some(&json_data),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn list_todos(
        &self,
        target_type: Option<TodoTargetType>,
        limit: Option<usize>,
    ) -> Result<Vec<Todo>> {
        let per_page = limit.unwrap_or(MAX_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let type_filter = target_type
            .map(|t| format!("&type={}", t.as_str()))
            .unwrap_or_default();

        let mut todos = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<Todo> = self
                .get_json(&format!(
                    "/todos?per_page={}&page={}{}",
                    per_page, page, type_filter
                ))
                .await?;
            let last_page = batch.len() < per_page;
            todos.extend(batch);

            if last_page || limit.is_some_and(|limit| todos.len() >= limit) {
                break;
            }
            page += 1;
        }

        if let Some(limit) = limit {
            todos.truncate(limit);
        }
        Ok(todos)
    }

    #[instrument(skip_all)]
    async fn current_user(&self) -> Result<User> {
        self.get_json("/user").await
    }
}
