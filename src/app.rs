use anyhow::Context;
use anyhow::Result;
use tracing::info;

use crate::args::MergeRequestRef;
use crate::args::MergeRequestSelector;
use crate::clients::git::GitOps;
use crate::clients::git::TrackingRef;
use crate::clients::gitlab::GitlabOps;
use crate::clients::gitlab::MergeRequest;
use crate::clients::gitlab::MergeRequestQuery;
use crate::clients::gitlab::Project;
use crate::config::Config;
use crate::error::LabError;

pub struct App<G: GitOps, L: GitlabOps> {
    pub config: Config,
    pub git: G,
    pub gitlab: L,
}

impl<G: GitOps, L: GitlabOps> App<G, L> {
    pub fn new(config: Config, git: G, gitlab: L) -> Self {
        Self {
            config,
            git,
            gitlab,
        }
    }
}

/// Shared helper methods for App
impl<G: GitOps, L: GitlabOps> App<G, L> {
    /// Resolve a local remote to the GitLab project its URL points at
    pub(crate) async fn remote_project(&self, remote: &str) -> Result<Project> {
        let path = self.git.path_for_remote(remote).await?;
        self.gitlab
            .find_project(&path)
            .await
            .with_context(|| format!("Failed to find project {}", path))
    }

    /// Fetch the single merge request that `mr_ref` points at.
    ///
    /// Returns the project the merge request was looked up in alongside it.
    pub(crate) async fn resolve_merge_request(
        &self,
        mr_ref: &MergeRequestRef,
    ) -> Result<(Project, MergeRequest)> {
        let project = self.remote_project(&mr_ref.remote).await?;

        let query = match &mr_ref.selector {
            MergeRequestSelector::Id(id) => MergeRequestQuery::Iid(*id),
            MergeRequestSelector::Branch(branch) => {
                MergeRequestQuery::SourceBranch(branch.clone())
            }
        };
        let mrs = self.gitlab.list_merge_requests(project.id, &query, 1).await?;

        let Some(mr) = mrs.into_iter().next() else {
            return Err(match &mr_ref.selector {
                MergeRequestSelector::Id(id) => LabError::MergeRequestNotFound(*id),
                MergeRequestSelector::Branch(branch) => {
                    LabError::BranchMergeRequestNotFound(branch.clone())
                }
            }
            .into());
        };

        info!(iid = mr.iid, source_branch = %mr.source_branch, "Resolved merge request");
        Ok((project, mr))
    }

    /// Find or create the remote that hosts the merge request's source branch.
    ///
    /// An explicit `remote` is used as is. Otherwise the first configured remote
    /// whose URL points at the source project wins. Failing that, a remote named
    /// after the author is added.
    pub(crate) async fn resolve_tracking_remote(
        &self,
        mr: &MergeRequest,
        remote: Option<&str>,
        https: bool,
    ) -> Result<TrackingRef> {
        let remote = match remote {
            Some(remote) => remote.to_string(),
            None => {
                let project = self.gitlab.get_project(mr.source_project_id).await?;
                let remotes = self.git.list_remotes().await?;

                let target = Some(project.path_with_namespace.as_str());
                let existing = remotes
                    .into_iter()
                    .find(|r| r.project_path().as_deref() == target);

                match existing {
                    Some(existing) => existing.name,
                    None => {
                        let name = mr.author.username.clone();
                        let url = project.url_to_repo(https);
                        info!(%name, %url, "Adding remote");
                        self.git.add_remote(&name, url).await?;
                        name
                    }
                }
            }
        };

        Ok(TrackingRef {
            remote,
            branch: mr.source_branch.clone(),
        })
    }
}
