use anyhow::Result;
use anyhow::ensure;
use tracing::info;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::git::TrackingRef;
use crate::clients::gitlab::GitlabOps;
use crate::error::LabError;

/// Options for `lab mr checkout`
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Local branch name, instead of the MR's source branch
    pub branch: Option<String>,
    /// Tracking remote, instead of looking one up
    pub remote: Option<String>,
    /// Set the new branch to track the MR's source branch
    pub track: bool,
    /// Replace an existing local branch
    pub force: bool,
    /// Use HTTPS rather than SSH for a newly added remote
    pub https: bool,
}

/// Resolved state of a single checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub local_branch: String,
    /// Remote the merge request head is fetched from
    pub target_remote: String,
    pub tracking: Option<TrackingRef>,
}

impl CheckoutPlan {
    /// GitLab exposes every MR head as `refs/merge-requests/<iid>/head`.
    pub fn fetch_refspec(&self, iid: u64) -> String {
        format!("refs/merge-requests/{}/head:{}", iid, self.local_branch)
    }
}

impl<G: GitOps, L: GitlabOps> App<G, L> {
    /// Check out a merge request into a local branch.
    ///
    /// 1. Look up the merge request on the remote's project.
    /// 2. Pick the local branch name (`--branch` or the MR source branch).
    /// 3. Refuse to touch an existing branch of that name unless forced.
    /// 4. With `--track`, find or add the remote the source branch lives on.
    /// 5. Delete the existing branch when forced.
    /// 6. Fetch the MR head into the branch, check it out, and set its upstream.
    pub async fn cmd_mr_checkout(
        &self,
        args: &[String],
        options: &CheckoutOptions,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let mr_ref = self.parse_remote_and_mr(args).await?;
        let (_, mr) = self.resolve_merge_request(&mr_ref).await?;

        let local_branch = options
            .branch
            .clone()
            .filter(|branch| !branch.is_empty())
            .unwrap_or_else(|| mr.source_branch.clone());
        ensure!(!local_branch.is_empty(), "MR !{} has no source branch", mr.iid);

        // Checked before tracking is resolved, which may add a remote
        let branch_exists = self.git.branch_exists(&local_branch).await?;
        if branch_exists && !options.force {
            return Err(LabError::BranchExists {
                mr_id: mr.iid,
                branch: local_branch,
            }
            .into());
        }

        let tracking = if options.track {
            Some(
                self.resolve_tracking_remote(&mr, options.remote.as_deref(), options.https)
                    .await?,
            )
        } else {
            None
        };

        let plan = CheckoutPlan {
            local_branch,
            target_remote: mr_ref.remote,
            tracking,
        };

        if branch_exists {
            info!(branch = %plan.local_branch, "Deleting existing branch");
            self.git.delete_branch(&plan.local_branch).await?;
        }

        self.git
            .fetch(&plan.target_remote, &plan.fetch_refspec(mr.iid))
            .await?;
        self.git.checkout(&plan.local_branch).await?;

        if let Some(tracking) = &plan.tracking {
            self.git.set_upstream(&plan.local_branch, tracking).await?;
        }

        writeln!(stdout, "branch name: {}", plan.local_branch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;

    use super::*;
    use crate::app::test_utils::*;
    use crate::clients::git::MockGitOps;
    use crate::clients::git::Remote;
    use crate::clients::gitlab::MockGitlabOps;
    use crate::config::Config;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Git mock that knows about `origin` and `upstream`, both on `group/project`
    fn mock_git() -> MockGitOps {
        let mut mock_git = MockGitOps::new();
        mock_git.expect_list_remotes().returning(|| {
            Ok(vec![
                Remote {
                    name: "origin".to_string(),
                    url: "git@gitlab.example.com:group/project.git".to_string(),
                },
                Remote {
                    name: "upstream".to_string(),
                    url: "https://gitlab.example.com/group/project.git".to_string(),
                },
            ])
        });
        mock_git
            .expect_path_for_remote()
            .returning(|_| Ok("group/project".to_string()));
        mock_git
    }

    /// GitLab mock where MR !10 comes from `feature` on project 2 (`alice/project`)
    fn mock_gitlab() -> MockGitlabOps {
        let mut mock_gitlab = MockGitlabOps::new();
        mock_gitlab
            .expect_find_project()
            .returning(|path| Ok(project(1, path)));
        mock_gitlab
            .expect_get_project()
            .returning(|id| Ok(project(id, "alice/project")));
        mock_gitlab
            .expect_list_merge_requests()
            .returning(|_, query, _| match query {
                crate::clients::gitlab::MergeRequestQuery::Iid(10) => {
                    Ok(vec![merge_request(10, "feature", 2)])
                }
                _ => Ok(vec![]),
            });
        mock_gitlab
    }

    fn expect_no_mutations(mock_git: &mut MockGitOps) {
        mock_git.expect_add_remote().never();
        mock_git.expect_delete_branch().never();
        mock_git.expect_fetch().never();
        mock_git.expect_checkout().never();
        mock_git.expect_set_upstream().never();
    }

    #[tokio::test]
    async fn test_checkout_fetches_mr_head() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(false));
        mock_git
            .expect_fetch()
            .times(1)
            .returning(|remote, refspec| {
                assert_eq!(remote, "origin");
                assert_eq!(refspec, "refs/merge-requests/10/head:feature");
                Ok(())
            });
        mock_git
            .expect_checkout()
            .times(1)
            .returning(|branch| {
                assert_eq!(branch, "feature");
                Ok(())
            });
        mock_git.expect_set_upstream().never();
        mock_git.expect_delete_branch().never();

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let mut stdout = Vec::new();
        app.cmd_mr_checkout(&args(&["10"]), &CheckoutOptions::default(), &mut stdout)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(stdout).unwrap(), "branch name: feature\n");
    }

    #[tokio::test]
    async fn test_checkout_with_branch_override_and_remote() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|branch| {
            assert_eq!(branch, "review");
            Ok(false)
        });
        mock_git
            .expect_fetch()
            .times(1)
            .returning(|remote, refspec| {
                assert_eq!(remote, "upstream");
                assert_eq!(refspec, "refs/merge-requests/10/head:review");
                Ok(())
            });
        mock_git.expect_checkout().times(1).returning(|_| Ok(()));

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            branch: Some("review".to_string()),
            ..Default::default()
        };
        let mut stdout = Vec::new();
        app.cmd_mr_checkout(&args(&["upstream", "10"]), &options, &mut stdout)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(stdout).unwrap(), "branch name: review\n");
    }

    #[tokio::test]
    async fn test_checkout_mr_not_found() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().never();
        expect_no_mutations(&mut mock_git);

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            track: true,
            force: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["origin", "11"]), &options, &mut stdout)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "MR !11 not found");
        assert_eq!(
            err.downcast_ref::<LabError>(),
            Some(&LabError::MergeRequestNotFound(11))
        );
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_existing_branch_without_force() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().times(1).returning(|_| Ok(true));
        expect_no_mutations(&mut mock_git);

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        // Tracking would add a remote for alice, which must not happen either
        let options = CheckoutOptions {
            track: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LabError>(),
            Some(&LabError::BranchExists {
                mr_id: 10,
                branch: "feature".to_string(),
            })
        );
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_existing_branch_with_force() {
        let mut seq = Sequence::new();
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(true));
        mock_git
            .expect_delete_branch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|branch| {
                assert_eq!(branch, "feature");
                Ok(())
            });
        mock_git
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock_git
            .expect_checkout()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            force: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        app.cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(stdout).unwrap(), "branch name: feature\n");
    }

    #[tokio::test]
    async fn test_checkout_delete_failure_stops_before_fetch() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(true));
        mock_git.expect_delete_branch().times(1).returning(|_| {
            Err(anyhow::anyhow!(
                "git command failed: error: Cannot delete branch 'feature' checked out at '/repo'"
            ))
        });
        mock_git.expect_fetch().never();
        mock_git.expect_checkout().never();

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            force: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot delete branch"));
    }

    #[tokio::test]
    async fn test_checkout_with_tracking_adds_author_remote() {
        let mut seq = Sequence::new();
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(false));
        mock_git
            .expect_add_remote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, url| {
                assert_eq!(name, "alice");
                assert_eq!(url, "git@gitlab.example.com:alice/project.git");
                Ok(())
            });
        mock_git
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|remote, _| {
                // The MR head still comes from the target remote
                assert_eq!(remote, "origin");
                Ok(())
            });
        mock_git
            .expect_checkout()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock_git
            .expect_set_upstream()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|branch, tracking| {
                assert_eq!(branch, "feature");
                assert_eq!(tracking.to_string(), "alice/feature");
                Ok(())
            });

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            track: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        app.cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checkout_with_explicit_tracking_remote() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(false));
        mock_git.expect_add_remote().never();
        mock_git.expect_fetch().returning(|_, _| Ok(()));
        mock_git.expect_checkout().returning(|_| Ok(()));
        mock_git
            .expect_set_upstream()
            .times(1)
            .returning(|_, tracking| {
                assert_eq!(tracking.to_string(), "fork/feature");
                Ok(())
            });

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            track: true,
            remote: Some("fork".to_string()),
            ..Default::default()
        };
        let mut stdout = Vec::new();
        app.cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checkout_fetch_failure_skips_checkout() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(false));
        mock_git.expect_fetch().times(1).returning(|_, _| {
            Err(anyhow::anyhow!(
                "git command failed: fatal: couldn't find remote ref refs/merge-requests/10/head"
            ))
        });
        mock_git.expect_checkout().never();
        mock_git.expect_set_upstream().never();

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["10"]), &CheckoutOptions::default(), &mut stdout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("couldn't find remote ref"));
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_failure_skips_upstream() {
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(false));
        mock_git.expect_add_remote().times(1).returning(|_, _| Ok(()));
        mock_git.expect_fetch().times(1).returning(|_, _| Ok(()));
        mock_git.expect_checkout().times(1).returning(|_| {
            Err(anyhow::anyhow!(
                "git command failed: error: Your local changes would be overwritten by checkout"
            ))
        });
        mock_git.expect_set_upstream().never();

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            track: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("would be overwritten"));
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_fatal() {
        let mut seq = Sequence::new();
        let mut mock_git = mock_git();
        mock_git.expect_branch_exists().returning(|_| Ok(true));
        mock_git.expect_add_remote().times(1).returning(|_, _| Ok(()));
        mock_git
            .expect_delete_branch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock_git
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock_git
            .expect_checkout()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock_git
            .expect_set_upstream()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(anyhow::anyhow!(
                    "git command failed: error: could not lock config file .git/config"
                ))
            });

        let app = App::new(Config::default_for_tests(), mock_git, mock_gitlab());
        let options = CheckoutOptions {
            track: true,
            force: true,
            ..Default::default()
        };
        let mut stdout = Vec::new();
        let err = app
            .cmd_mr_checkout(&args(&["10"]), &options, &mut stdout)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not lock config file"));
        // The checkout stays in place and no branch name is reported
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_fetch_refspec() {
        let plan = CheckoutPlan {
            local_branch: "feature".to_string(),
            target_remote: "origin".to_string(),
            tracking: None,
        };
        assert_eq!(plan.fetch_refspec(42), "refs/merge-requests/42/head:feature");
    }
}
