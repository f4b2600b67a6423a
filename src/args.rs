//! Positional argument handling shared by commands that take `[remote] [target]`.

use anyhow::Result;
use anyhow::bail;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::gitlab::GitlabOps;
use crate::error::LabError;

/// A merge request as named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestRef {
    pub remote: String,
    pub selector: MergeRequestSelector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeRequestSelector {
    /// Project-local merge request id
    Id(u64),
    /// The open merge request whose source branch this is
    Branch(String),
}

impl MergeRequestSelector {
    /// Numbers (optionally prefixed with `!`) are ids, anything else is a branch.
    pub fn parse(arg: &str) -> Result<Self> {
        let digits = arg.strip_prefix('!').unwrap_or(arg);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return match digits.parse::<u64>() {
                Ok(id) if id > 0 => Ok(MergeRequestSelector::Id(id)),
                _ => Err(LabError::InvalidMergeRequestId(arg.to_string()).into()),
            };
        }
        Ok(MergeRequestSelector::Branch(arg.to_string()))
    }
}

impl<G: GitOps, L: GitlabOps> App<G, L> {
    /// Parse `[remote] [<MR id or branch>]`. Without a target, the MR of the
    /// current branch is meant.
    pub(crate) async fn parse_remote_and_mr(&self, args: &[String]) -> Result<MergeRequestRef> {
        let (remote, target) = self.split_remote(args).await?;
        let selector = match target {
            Some(target) => MergeRequestSelector::parse(target)?,
            None => MergeRequestSelector::Branch(self.git.current_branch().await?),
        };
        Ok(MergeRequestRef { remote, selector })
    }

    /// Parse `[remote] [branch]`, defaulting to the current branch.
    pub(crate) async fn parse_remote_and_branch(
        &self,
        args: &[String],
    ) -> Result<(String, String)> {
        let (remote, target) = self.split_remote(args).await?;
        let branch = match target {
            Some(branch) => branch.to_string(),
            None => self.git.current_branch().await?,
        };
        Ok((remote, branch))
    }

    /// Split off a leading remote name. A single argument is a remote only if
    /// such a remote is configured; with two, the first one must be a remote.
    async fn split_remote<'a>(
        &self,
        args: &'a [String],
    ) -> Result<(String, Option<&'a str>)> {
        match args {
            [] => Ok((self.config.default_remote.clone(), None)),
            [arg] => {
                if self.is_remote(arg).await? {
                    Ok((arg.clone(), None))
                } else {
                    Ok((self.config.default_remote.clone(), Some(arg.as_str())))
                }
            }
            [remote, target] => {
                if !self.is_remote(remote).await? {
                    return Err(LabError::InvalidRemote(remote.clone()).into());
                }
                Ok((remote.clone(), Some(target.as_str())))
            }
            _ => bail!("Too many arguments: expected at most 2, got {}", args.len()),
        }
    }

    async fn is_remote(&self, name: &str) -> Result<bool> {
        let remotes = self.git.list_remotes().await?;
        Ok(remotes.iter().any(|r| r.name == name))
    }
}
