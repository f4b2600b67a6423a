//! Clients for the two systems that `lab` coordinates:
//!
//! - [`git`]: the local repository (remotes, branches, fetch, checkout)
//! - [`gitlab`]: the GitLab REST API (projects, merge requests, pipelines, todos)
//! - [`gitlab_curl`]: Curl-based HTTP client used by [`gitlab`]
//!
//! Each client sits behind a trait with a mockall mock for tests.

pub mod git;
pub mod gitlab;
pub mod gitlab_curl;
