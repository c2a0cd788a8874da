//! Recovering a release that failed part-way.
//!
//! The supported shape: the local release completed (commit and tag
//! exist) but PUBLISH failed — exit code 5. `retry` re-runs only the
//! PUBLISH sub-stage. When the persisted state shows the failure was
//! earlier, the state is cleared and the caller performs a full release.

use camino::Utf8PathBuf;
use git_cmd::Repo;
use semver::Version;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::command::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forge::{ForgeClient, RemoteRelease};
use crate::release_state::{FailedStage, SideEffect, StateStore};
use crate::repo_versions;
use crate::security::{self, RefKind};

#[derive(Debug)]
pub struct RetryRequest {
    root: Utf8PathBuf,
    config: Config,
    version: Version,
    cancel: CancelToken,
}

impl RetryRequest {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config, version: Version) -> Self {
        Self {
            root: root.into(),
            config,
            version,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Serialize)]
pub enum RetryOutcome {
    /// The publish sub-stage was re-run successfully.
    Republished {
        version: String,
        tag: String,
        remote_release: Option<RemoteRelease>,
    },
    /// Failed state was cleared; the caller should run a full release.
    StateCleared { version: String },
}

#[instrument(skip(req))]
pub async fn retry(req: &RetryRequest) -> Result<RetryOutcome> {
    let repo = Repo::new(&req.root).map_err(|_| Error::GitNotRepo {
        directory: req.root.clone(),
    })?;
    let version = req.version.to_string();
    let store = StateStore::new(&req.root);
    let state = store.load(&version)?;

    let tag = repo_versions::tag_for(&req.config.release.tag_prefix, &req.version);
    security::validate_git_ref(&tag, RefKind::Tag)?;

    let publish_failed = state
        .as_ref()
        .is_some_and(|s| s.failed_stage == Some(FailedStage::Publish));
    let tag_exists = repo.tag_exists(&tag)?;

    if !publish_failed || !tag_exists {
        if state.is_some() {
            warn!("release {version} did not fail during publish; clearing its state");
            store.clear(&version)?;
        }
        return Ok(RetryOutcome::StateCleared { version });
    }

    req.cancel.bail_if_cancelled("publish")?;
    let state = state.expect("checked above");
    let remote = &req.config.release.remote;

    if req.config.release.push {
        let branch = repo.current_branch()?;
        security::validate_git_ref(&branch, RefKind::Branch)?;
        security::validate_git_ref(remote, RefKind::Remote)?;
        repo.push(&branch, remote).map_err(|e| Error::GitRemoteError {
            op: "push".to_string(),
            detail: security::sanitize_error_message(&e.to_string(), false),
        })?;
        repo.push(&tag, remote).map_err(|e| Error::GitRemoteError {
            op: "push".to_string(),
            detail: security::sanitize_error_message(&e.to_string(), false),
        })?;
        info!("pushed branch and tag {tag} to {remote}");
    }

    let remote_release = if req.config.forge.enabled {
        let already_created = state
            .effects
            .iter()
            .any(|e| matches!(e, SideEffect::RemoteReleaseCreated { .. }));
        if already_created {
            None
        } else {
            let forge = ForgeClient::from_env(std::time::Duration::from_secs(
                req.config.release.publish_timeout_secs,
            ));
            let notes = crate::changelog_parser::last_changes(
                &req.root.join(&req.config.changelog.path),
            )
            .unwrap_or(None)
            .unwrap_or_default();
            Some(forge.create_release(&tag, &tag, &notes).await?)
        }
    } else {
        None
    };

    store.clear(&version)?;
    info!("publish of {version} completed");
    Ok(RetryOutcome::Republished {
        version,
        tag,
        remote_release,
    })
}
