//! Release, rollback and retry commands, plus the subprocess plumbing
//! they share.

pub mod release;
pub mod retry;
pub mod rollback;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::Utf8Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::security;

/// Cooperative cancellation, set by the SIGINT handler and observed at
/// every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bail_if_cancelled(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Spawn a tool with an argument array (no shell), a working directory,
/// extra environment variables, and a timeout.
pub async fn run_tool(
    program: &str,
    args: &[&str],
    current_dir: Option<&Utf8Path>,
    env: &[(&str, String)],
    timeout: Duration,
) -> Result<ToolOutput> {
    security::validate_cli_args(&[program])?;
    security::validate_cli_args(args)?;

    let mut command = tokio::process::Command::new(program);
    command.args(args);
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }
    for (key, value) in env {
        command.env(key, value);
    }
    command.kill_on_drop(true);
    debug!("running {program} {args:?}");

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            Error::Internal(anyhow::anyhow!(
                "`{program}` did not finish within {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::DepNotFound {
                tool: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: program.into(),
            },
            _ => Error::Internal(anyhow::anyhow!("cannot spawn `{program}`: {e}")),
        })?;

    Ok(ToolOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a user-configured command (check, hook, fix command).
/// The first element is the program, the rest are arguments.
pub async fn run_configured_command(
    command: &[String],
    current_dir: &Utf8Path,
    timeout: Duration,
) -> Result<ToolOutput> {
    let (program, args) = command.split_first().ok_or_else(|| Error::ConfigInvalid {
        reason: "empty command".to_string(),
    })?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_tool(program, &args, Some(current_dir), &[], timeout).await
}
