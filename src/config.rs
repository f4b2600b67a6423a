use anyhow::Result;

pub const DEFAULT_HOST: &str = "https://gitlab.com";
pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the GitLab instance, without a trailing slash
    pub host: String,
    pub token: Option<String>,
    /// Remote used when no remote is given on the command line
    pub default_remote: String,
}

impl Config {
    /// Load config from the environment and .git/config.
    ///
    /// `LAB_CORE_HOST` and `LAB_CORE_TOKEN` take precedence over `lab.host` and
    /// `lab.token`. The default remote comes from `lab.remote`.
    pub fn load() -> Result<Self> {
        let git = |key: &str| git_config_get(key);
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self::from_lookup(env, git)
    }

    fn from_lookup(
        env: impl Fn(&str) -> Option<String>,
        git: impl Fn(&str) -> Result<Option<String>>,
    ) -> Result<Self> {
        let host = match env("LAB_CORE_HOST") {
            Some(host) => host,
            None => git("lab.host")?.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        };
        let token = match env("LAB_CORE_TOKEN") {
            Some(token) => Some(token),
            None => git("lab.token")?,
        };
        let default_remote = git("lab.remote")?.unwrap_or_else(|| DEFAULT_REMOTE.to_string());

        Ok(Self::new(host, token, default_remote))
    }

    /// Create a new config with explicit values (useful for tests)
    pub fn new(host: String, token: Option<String>, default_remote: String) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            default_remote,
        }
    }

    /// Default config for tests
    pub fn default_for_tests() -> Self {
        Self::new(
            "https://gitlab.example.com".to_string(),
            Some("test-token".to_string()),
            DEFAULT_REMOTE.to_string(),
        )
    }

    /// Root of the REST API, e.g. `https://gitlab.com/api/v4`
    pub fn api_url(&self) -> String {
        format!("{}/api/v4", self.host)
    }
}

/// Read a single value from git config. Unset keys are `None`.
fn git_config_get(key: &str) -> Result<Option<String>> {
    let output = std::process::Command::new("git")
        .args(["config", "--get", key])
        .output()?;

    // Exit code 1 means the key is not set
    if !output.status.success() {
        return Ok(None);
    }

    let value = String::from_utf8(output.stdout)?.trim().to_string();
    Ok(Some(value).filter(|v| !v.is_empty()))
}
