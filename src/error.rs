//! Domain errors that the top-level boundary needs to recognise.
//!
//! Everything else (failed git commands, curl failures, API errors) travels as a
//! plain `anyhow::Error` and is reported verbatim.

use std::process::ExitCode;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabError {
    #[error("MR !{0} not found")]
    MergeRequestNotFound(u64),

    #[error("MR for branch {0} not found")]
    BranchMergeRequestNotFound(String),

    #[error("mr !{mr_id} branch {branch} already exists")]
    BranchExists { mr_id: u64, branch: String },

    #[error("{0} is not a valid remote")]
    InvalidRemote(String),

    #[error("Invalid MR id: {0}")]
    InvalidMergeRequestId(String),

    #[error("Invalid Variable: \"{0}\", Variables must be in the format key=value")]
    InvalidVariable(String),
}

impl LabError {
    /// Not-found conditions are reported as a plain message rather than an error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LabError::MergeRequestNotFound(_) | LabError::BranchMergeRequestNotFound(_)
        )
    }
}

/// Report an error to the user and return the exit code for it.
pub fn report(
    err: &anyhow::Error,
    stdout: &mut impl std::io::Write,
    stderr: &mut impl std::io::Write,
) -> ExitCode {
    match err.downcast_ref::<LabError>() {
        Some(lab_err) if lab_err.is_not_found() => {
            let _ = writeln!(stdout, "{}", lab_err);
        }
        _ => {
            let _ = writeln!(stderr, "Error: {:#}", err);
        }
    }
    ExitCode::FAILURE
}
