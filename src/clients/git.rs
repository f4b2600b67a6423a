#![allow(async_fn_in_trait)]

use std::fmt::Display;
use std::process::Output;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

use crate::git_url;
use crate::git_url::RemoteUrl;

// -----------------------------------------------------------------------------
// GitOps trait

/// Operations for interacting with the local git repository
#[cfg_attr(test, automock)]
pub trait GitOps {
    /// Remotes that have a URL, in `git remote` order (sorted by name).
    async fn list_remotes(&self) -> Result<Vec<Remote>>;

    /// Project path (`namespace/project`) derived from a remote's URL.
    async fn path_for_remote(&self, name: &str) -> Result<String>;

    async fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Check whether `refs/heads/<name>` exists.
    async fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Force-delete a local branch.
    async fn delete_branch(&self, name: &str) -> Result<()>;

    async fn fetch(&self, remote: &str, refspec: &str) -> Result<()>;

    async fn checkout(&self, branch: &str) -> Result<()>;

    /// Configure `branch` to track `tracking`.
    async fn set_upstream(&self, branch: &str, tracking: &TrackingRef) -> Result<()>;

    /// Name of the currently checked out branch.
    async fn current_branch(&self) -> Result<String>;
}

/// A configured git remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

impl Remote {
    /// Project path derived from the remote URL, if it is a hosted URL.
    pub fn project_path(&self) -> Option<String> {
        git_url::project_path(&self.url)
    }
}

/// Upstream for a local branch: a branch on a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRef {
    pub remote: String,
    pub branch: String,
}

impl Display for TrackingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.remote, self.branch)
    }
}

// -----------------------------------------------------------------------------
// GitClient

/// Real implementation that calls the git CLI
pub struct GitClient {
    path: std::path::PathBuf,
}

impl GitClient {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "git");
        Command::new("git")
            .current_dir(&self.path)
            .args(args)
            .output()
            .await
            .context("Failed to execute git command")
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;

        if !output.status.success() {
            bail!(
                "git command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    async fn configured_url(&self, name: &str) -> Result<Option<String>> {
        let key = format!("remote.{}.url", name);
        let output = self.output(&["config", "--get", &key]).await?;

        // Exit code 1 means the key is not set
        if !output.status.success() {
            return Ok(None);
        }

        Ok(Some(String::from_utf8(output.stdout)?.trim().to_string()))
    }

    async fn remote_url(&self, name: &str) -> Result<String> {
        self.configured_url(name)
            .await?
            .with_context(|| format!("No git remote '{}' configured", name))
    }
}

impl GitOps for GitClient {
    async fn list_remotes(&self) -> Result<Vec<Remote>> {
        let names = self.run(&["remote"]).await?;

        let mut remotes = Vec::new();
        for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
            // Remotes without a fetch URL cannot be matched to a project
            if let Some(url) = self.configured_url(name).await? {
                remotes.push(Remote {
                    name: name.to_string(),
                    url,
                });
            }
        }

        Ok(remotes)
    }

    async fn path_for_remote(&self, name: &str) -> Result<String> {
        let url = self.remote_url(name).await?;
        let parsed = RemoteUrl::parse(&url)
            .with_context(|| format!("Remote {} is not a GitLab URL: {}", name, url))?;
        debug!(remote = name, host = parsed.host(), "Resolved remote URL");
        Ok(parsed.path_with_namespace().to_string())
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.run(&["remote", "add", name, url]).await?;
        Ok(())
    }

    async fn branch_exists(&self, name: &str) -> Result<bool> {
        let branch_ref = format!("refs/heads/{}", name);
        let output = self
            .output(&["show-ref", "--verify", "--quiet", &branch_ref])
            .await?;

        // Exit code 0 means the ref exists
        Ok(output.status.success())
    }

    async fn delete_branch(&self, name: &str) -> Result<()> {
        self.run(&["branch", "-D", name]).await?;
        Ok(())
    }

    async fn fetch(&self, remote: &str, refspec: &str) -> Result<()> {
        self.run(&["fetch", remote, refspec]).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", branch]).await?;
        Ok(())
    }

    async fn set_upstream(&self, branch: &str, tracking: &TrackingRef) -> Result<()> {
        // Written directly so the remote-tracking ref need not have been fetched yet
        let remote_key = format!("branch.{}.remote", branch);
        let merge_key = format!("branch.{}.merge", branch);
        let merge_ref = format!("refs/heads/{}", tracking.branch);

        // Without `remote`, git ignores a lone `merge` entry
        self.run(&["config", &merge_key, &merge_ref]).await?;
        self.run(&["config", &remote_key, &tracking.remote]).await?;
        Ok(())
    }

    async fn current_branch(&self) -> Result<String> {
        let branch = self.run(&["symbolic-ref", "--short", "HEAD"]).await?;
        Ok(branch)
    }
}
