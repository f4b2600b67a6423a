use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// HTTP client using curl for making GitLab API requests
pub struct GitlabCurlClient {
    token: Option<String>,
}

/// GitLab reports errors as either `{"message": ...}` or `{"error": ...}`.
/// `message` may be a string or an object of field errors.
#[derive(Debug, Deserialize)]
struct GitlabError {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl GitlabError {
    fn describe(&self) -> Option<String> {
        match (&self.message, &self.error) {
            (Some(serde_json::Value::String(message)), _) => Some(message.clone()),
            (Some(message), _) => Some(message.to_string()),
            (None, Some(error)) => Some(error.clone()),
            (None, None) => None,
        }
    }
}

impl GitlabCurlClient {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<String> {
        self.request("GET", url, None).await
    }

    /// Make a POST request with an optional JSON body
    pub async fn post(&self, url: &str, json_data: Option<&str>) -> Result<String> {
        self.request("POST", url, json_data).await
    }

    async fn request(&self, method: &str, url: &str, json_data: Option<&str>) -> Result<String> {
        debug!(method, url, "curl");

        let mut args = vec![
            "-s".to_string(),
            "-w".to_string(),
            "\n%{http_code}".to_string(),
            "-X".to_string(),
            method.to_string(),
            "-H".to_string(),
            "Accept: application/json".to_string(),
            "-H".to_string(),
            "User-Agent: lab-cli".to_string(),
        ];
        if let Some(token) = &self.token {
            args.push("-H".to_string());
            args.push(format!("PRIVATE-TOKEN: {}", token));
        }
        if let Some(json_data) = json_data {
            args.push("-H".to_string());
            args.push("Content-Type: application/json".to_string());
            args.push("-d".to_string());
            args.push(json_data.to_string());
        }
        args.push(url.to_string());

        let output = Command::new("curl")
            .args(&args)
            .output()
            .await
            .context("Failed to execute curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }
}

/// Parse curl response with status code appended
fn parse_response(stdout: Vec<u8>) -> Result<String> {
    let output_str = String::from_utf8(stdout)?;
    let (response, status) = output_str.rsplit_once('\n').unwrap_or(("", &output_str));
    let status_code = status.trim().parse::<u16>().unwrap_or(0);

    // Check HTTP status code
    if status_code >= 400 {
        // Try to parse error message from response
        if let Some(message) = serde_json::from_str::<GitlabError>(response)
            .ok()
            .and_then(|error| error.describe())
        {
            bail!("GitLab API error: {}", message);
        }
        bail!(
            "GitLab API request failed with status {}: {}",
            status_code,
            response
        );
    }

    Ok(response.to_string())
}
