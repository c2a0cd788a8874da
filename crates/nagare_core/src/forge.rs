//! Remote forge integration via the `gh` command line tool.
//!
//! The HTTP API is deliberately not spoken here; the forge tool owns
//! authentication and endpoint details. The token is read from
//! `GITHUB_TOKEN`, held as a secret, passed through the subprocess
//! environment, and never logged.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::command::run_tool;
use crate::error::{Error, Result};

pub const FORGE_TOOL: &str = "gh";

#[derive(Debug, Clone, Serialize)]
pub struct RemoteRelease {
    pub id: String,
    pub url: String,
}

pub struct ForgeClient {
    token: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for ForgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeClient")
            .field("token", &self.token.as_ref().map(|_| "<secret>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ForgeClient {
    pub fn from_env(timeout: Duration) -> Self {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        Self { token, timeout }
    }

    /// Verify the forge tool is installed. Run during pre-flight so a
    /// missing tool is reported before any mutation.
    pub async fn probe(&self) -> Result<()> {
        let timeout = self.timeout.min(Duration::from_secs(10));
        let output = run_tool(FORGE_TOOL, &["--version"], None, &[], timeout).await;
        match output {
            Ok(out) if out.success() => Ok(()),
            _ => Err(Error::RemoteToolMissing {
                tool: FORGE_TOOL.to_string(),
            }),
        }
    }

    /// Create a release entry for an existing tag.
    pub async fn create_release(
        &self,
        tag: &str,
        title: &str,
        notes: &str,
    ) -> Result<RemoteRelease> {
        let mut env = vec![];
        if let Some(token) = &self.token {
            env.push(("GH_TOKEN", token.expose_secret().to_string()));
        }
        let args = [
            "release", "create", tag, "--title", title, "--notes", notes,
        ];
        let output = run_tool(FORGE_TOOL, &args, None, &env, self.timeout).await?;
        if !output.success() {
            let stderr = output.stderr.to_lowercase();
            if stderr.contains("auth") || stderr.contains("credentials") {
                return Err(Error::RemoteAuthFailed);
            }
            return Err(Error::RemoteReleaseFailed {
                detail: output.stderr.trim().to_string(),
            });
        }
        // `gh release create` prints the release URL.
        let url = output.stdout.trim().to_string();
        debug!("created remote release for {tag}");
        Ok(RemoteRelease {
            id: tag.to_string(),
            url,
        })
    }
}
