use std::collections::BTreeMap;

use anyhow::Result;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::gitlab::GitlabOps;
use crate::clients::gitlab::TriggerPipeline;
use crate::error::LabError;

/// Options for `lab ci create`
#[derive(Debug, Clone, Default)]
pub struct CiCreateOptions {
    /// Project path to use instead of the remote's project
    pub project: Option<String>,
    /// Create a merge request pipeline
    pub merge_request: bool,
}

/// Options for `lab ci trigger`
#[derive(Debug, Clone, Default)]
pub struct CiTriggerOptions {
    pub project: Option<String>,
    pub token: String,
    /// `key=value` pairs
    pub variables: Vec<String>,
}

impl<G: GitOps, L: GitlabOps> App<G, L> {
    /// Create a pipeline for a branch, or a merge request pipeline
    pub async fn cmd_ci_create(
        &self,
        args: &[String],
        options: &CiCreateOptions,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let pipeline = if options.merge_request {
            let mr_ref = self.parse_remote_and_mr(args).await?;
            let (project, mr) = self.resolve_merge_request(&mr_ref).await?;
            let project_id = match &options.project {
                Some(path) => self.gitlab.find_project(path).await?.id,
                None => project.id,
            };
            self.gitlab
                .create_merge_request_pipeline(project_id, mr.iid)
                .await?
        } else {
            let (remote, branch) = self.parse_remote_and_branch(args).await?;
            let project_id = self
                .pipeline_project_id(&remote, options.project.as_deref())
                .await?;
            self.gitlab.create_pipeline(project_id, &branch).await?
        };

        writeln!(stdout, "{}", pipeline.web_url)?;
        Ok(())
    }

    /// Run a pipeline trigger on a branch
    pub async fn cmd_ci_trigger(
        &self,
        args: &[String],
        options: &CiTriggerOptions,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let variables = parse_ci_variables(&options.variables)?;
        let (remote, branch) = self.parse_remote_and_branch(args).await?;
        let project_id = self
            .pipeline_project_id(&remote, options.project.as_deref())
            .await?;

        let request = TriggerPipeline {
            token: options.token.clone(),
            git_ref: branch,
            variables,
        };
        let pipeline = self.gitlab.trigger_pipeline(project_id, &request).await?;

        writeln!(stdout, "{}", pipeline.web_url)?;
        Ok(())
    }

    async fn pipeline_project_id(&self, remote: &str, project: Option<&str>) -> Result<u64> {
        let project = match project {
            Some(path) => self.gitlab.find_project(path).await?,
            None => self.remote_project(remote).await?,
        };
        Ok(project.id)
    }
}

/// Parse `key=value` pipeline variables. Only the first `=` separates.
pub fn parse_ci_variables(vars: &[String]) -> Result<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    for var in vars {
        let Some((key, value)) = var.split_once('=') else {
            return Err(LabError::InvalidVariable(var.clone()).into());
        };
        variables.insert(key.to_string(), value.to_string());
    }
    Ok(variables)
}
