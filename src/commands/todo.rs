use std::sync::LazyLock;

use anyhow::Context;
use anyhow::Result;
use colored::ColoredString;
use colored::Colorize;
use regex::Regex;

use crate::App;
use crate::clients::git::GitOps;
use crate::clients::gitlab::GitlabOps;
use crate::clients::gitlab::Todo;
use crate::clients::gitlab::TodoTargetType;

static MERGE_REQUEST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"merge_requests/(\d+)").expect("valid regex"));
static ISSUE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"issues/(\d+)").expect("valid regex"));

/// Options for `lab todo list`
#[derive(Debug, Clone, Default)]
pub struct TodoListOptions {
    /// `None` lists all target types
    pub target_type: Option<TodoTargetType>,
    /// `None` lists every todo
    pub limit: Option<usize>,
    pub pretty: bool,
}

impl TodoListOptions {
    /// Interpret the `--type` and `--number` flags. Unknown types mean all
    /// types; a non-numeric number means no limit.
    pub fn from_flags(target_type: &str, number: &str, pretty: bool) -> Self {
        let target_type = match target_type.to_lowercase().as_str() {
            "mr" => Some(TodoTargetType::MergeRequest),
            "issue" => Some(TodoTargetType::Issue),
            _ => None,
        };
        Self {
            target_type,
            limit: number.parse().ok(),
            pretty,
        }
    }
}

impl<G: GitOps, L: GitlabOps> App<G, L> {
    pub async fn cmd_todo_list(
        &self,
        options: &TodoListOptions,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        let todos = self
            .gitlab
            .list_todos(options.target_type, options.limit)
            .await?;

        let current_user = if options.pretty && !todos.is_empty() {
            Some(self.gitlab.current_user().await?.username)
        } else {
            None
        };

        for todo in &todos {
            let Some(current_user) = current_user.as_deref().filter(|_| is_pretty_target(todo))
            else {
                writeln!(stdout, "{} {}", todo.id, todo.target_url)?;
                continue;
            };

            let (state, title) = self.todo_target_state(todo).await?;

            let name = if todo.author.username == current_user {
                "you"
            } else {
                todo.author.name.as_str()
            };

            writeln!(
                stdout,
                "{} {} \"{}\" {}",
                format_state(&state),
                todo.id,
                title,
                describe_action(&todo.action_name, name)
            )?;
            writeln!(stdout, "       {}", todo.target_url)?;
        }

        Ok(())
    }

    /// State and title of the MR or issue a todo points at
    async fn todo_target_state(&self, todo: &Todo) -> Result<(String, String)> {
        let iid = target_iid(todo)
            .with_context(|| format!("Cannot find target id in {}", todo.target_url))?;

        if todo.target_type == "MergeRequest" {
            let mr = self.gitlab.get_merge_request(todo.project.id, iid).await?;
            let state = if mr.state == "opened" && mr.is_draft() {
                "draft".to_string()
            } else {
                mr.state
            };
            Ok((state, mr.title))
        } else {
            let issue = self.gitlab.get_issue(todo.project.id, iid).await?;
            Ok((issue.state, issue.title))
        }
    }
}

/// Designs and alerts have no state to show
fn is_pretty_target(todo: &Todo) -> bool {
    !matches!(
        todo.target_type.as_str(),
        "DesignManagement::Design" | "AlertManagement::Alert"
    )
}

/// Project-local id of the MR or issue from the todo's target URL
fn target_iid(todo: &Todo) -> Option<u64> {
    let pattern = if todo.target_type == "Issue" {
        &ISSUE_ID
    } else {
        &MERGE_REQUEST_ID
    };
    pattern
        .captures(&todo.target_url)
        .and_then(|caps| caps[1].parse().ok())
}

/// Fixed-width, colored state
fn format_state(state: &str) -> ColoredString {
    match state {
        "opened" => "open  ".green(),
        "merged" => "merged".cyan(),
        "draft" => "draft ".green(),
        _ => state.red(),
    }
}

fn describe_action(action: &str, name: &str) -> String {
    match action {
        "approval_required" => format!("(approval requested by {})", name),
        "assigned" => format!("(assigned to you by {})", name),
        "build_failed" => "(build failed)".to_string(),
        "directly_addressed" => format!("({} directly addressed you)", name),
        "marked" => "(Todo Entry added by you)".to_string(),
        "mentioned" => format!("({} mentioned you)", name),
        "merge_train_removed" => "(Merge Train was removed)".to_string(),
        "review_requested" => format!("(review requested by {})", name),
        "unmergeable" => "(Cannot be merged)".to_string(),
        _ => format!("Unknown action {}", action),
    }
}
