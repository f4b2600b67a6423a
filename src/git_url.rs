//! Git remote URL parsing.
//!
//! GitLab identifies a project by its `path_with_namespace` (e.g.
//! `group/subgroup/project`). Remotes are matched against projects by
//! extracting that path from the remote URL.

/// Parsed git remote URL.
///
/// # Supported URL formats
///
/// - `https://<host>/<namespace>/<project>.git`
/// - `http://<host>/<namespace>/<project>.git`
/// - `ssh://[<user>@]<host>[:<port>]/<namespace>/<project>.git`
/// - `<user>@<host>:<namespace>/<project>.git`
///
/// Namespaces may be nested, so everything after the host is kept as the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    host: String,
    path: String,
}

impl RemoteUrl {
    /// Parse a git remote URL. Returns `None` for local paths and malformed URLs.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();

        let (host, path) = if let Some(rest) = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .or_else(|| url.strip_prefix("ssh://"))
        {
            let (authority, path) = rest.split_once('/')?;
            let host = authority.rsplit('@').next()?;
            // Drop the port, if any
            let host = host.split(':').next()?;
            (host, path)
        } else if !url.contains("://") && url.contains('@') {
            // scp-like syntax: git@gitlab.com:group/project.git
            let (user_host, path) = url.split_once(':')?;
            let host = user_host.rsplit('@').next()?;
            (host, path)
        } else {
            return None;
        };

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        if host.is_empty() || path.is_empty() || !path.contains('/') {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    /// The hostname (e.g. "gitlab.com").
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Project path with namespace, without the `.git` suffix.
    pub fn path_with_namespace(&self) -> &str {
        &self.path
    }
}

/// Extract the project path (`namespace/project`) from a git remote URL.
pub fn project_path(url: &str) -> Option<String> {
    RemoteUrl::parse(url).map(|u| u.path_with_namespace().to_string())
}
