use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Runs git in `dir` and returns its trimmed stdout.
pub async fn git(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;
    anyhow::ensure!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr).trim()
    );

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Like [`git`], but returns `None` when git exits non-zero.
pub async fn git_opt(dir: &Path, args: &[&str]) -> anyhow::Result<Option<String>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Ok(None);
    }

    Ok(Some(String::from_utf8(output.stdout)?.trim().to_string()))
}

/// Creates a git repository in the given directory, on branch `main`.
///
/// This initializes the repo and sets basic git config needed for commits.
/// The directory should already exist.
pub async fn create_git_repo(dir: &Path) -> anyhow::Result<()> {
    git(dir, &["init", "--quiet"]).await?;
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]).await?;
    git(dir, &["config", "user.name", "Test User"]).await?;
    git(dir, &["config", "user.email", "test@example.com"]).await?;
    git(dir, &["config", "commit.gpgsign", "false"]).await?;

    Ok(())
}

/// Writes a file and commits it, returning the new commit id.
pub async fn create_git_commit(
    dir: &Path,
    message: &str,
    filename: &str,
    contents: &str,
) -> anyhow::Result<String> {
    tokio::fs::write(dir.join(filename), contents).await?;
    git(dir, &["add", filename]).await?;
    git(dir, &["commit", "--quiet", "-m", message]).await?;

    git(dir, &["rev-parse", "HEAD"]).await
}

/// Adds a remote whose URL git rewrites to a local repository, so that a
/// GitLab-looking URL can be fetched from without a network.
pub async fn add_rewritten_remote(
    dir: &Path,
    name: &str,
    url: &str,
    local_repo: &Path,
) -> anyhow::Result<()> {
    git(dir, &["remote", "add", name, url]).await?;

    let key = format!("url.{}.insteadOf", local_repo.display());
    git(dir, &["config", &key, url]).await?;

    Ok(())
}

pub fn setup_logging() -> anyhow::Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_test_writer()
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

pub enum TestDir {
    Temp(tempfile::TempDir),
    Kept(std::path::PathBuf),
}

impl TestDir {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;

        if std::env::var("DEBUG_TESTS").is_ok() {
            let path = temp_dir.keep();
            eprintln!("Test directory kept at: {}", path.display());
            Ok(TestDir::Kept(path))
        } else {
            Ok(TestDir::Temp(temp_dir))
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            TestDir::Temp(t) => t.path(),
            TestDir::Kept(p) => p.as_path(),
        }
    }
}
