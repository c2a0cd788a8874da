//! Reverting a named release.
//!
//! The reverse flow is independent of the forward pipeline: it works from
//! the tag, the release commit's message prefix, and (when present) the
//! persisted state log. Every step tolerates missing preconditions, so
//! running a rollback twice is a no-op the second time.

use camino::Utf8PathBuf;
use git_cmd::Repo;
use semver::Version;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::command::CancelToken;
use crate::command::release::RELEASE_COMMIT_PREFIX;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::release_state::{SideEffect, StateStore};
use crate::repo_versions;
use crate::security::{self, RefKind};

#[derive(Debug)]
pub struct RollbackRequest {
    root: Utf8PathBuf,
    config: Config,
    version: Version,
    cancel: CancelToken,
}

impl RollbackRequest {
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
pub struct RollbackOutcome {
    pub version: String,
    pub tag: String,
    /// Nothing to undo: the tag does not exist and no state log was found.
    pub nothing_to_do: bool,
    pub tag_deleted: bool,
    pub remote_tag_deleted: bool,
    pub commit_reset: bool,
    pub files_restored: usize,
}

#[instrument(skip(req))]
pub async fn rollback(req: &RollbackRequest) -> Result<RollbackOutcome> {
    let repo = Repo::new(&req.root).map_err(|_| Error::GitNotRepo {
        directory: req.root.clone(),
    })?;
    let tag = repo_versions::tag_for(&req.config.release.tag_prefix, &req.version);
    security::validate_git_ref(&tag, RefKind::Tag)?;

    let store = StateStore::new(&req.root);
    let state = store.load(&req.version.to_string())?;
    let tag_exists = repo.tag_exists(&tag)?;

    if !tag_exists && state.is_none() {
        info!("tag {tag} not found — nothing to do");
        return Ok(RollbackOutcome {
            version: req.version.to_string(),
            tag,
            nothing_to_do: true,
            tag_deleted: false,
            remote_tag_deleted: false,
            commit_reset: false,
            files_restored: 0,
        });
    }

    req.cancel.bail_if_cancelled("rollback")?;

    // Resolve the release commit before the tag disappears.
    let release_commit = if tag_exists {
        Some(repo.tag_commit(&tag)?)
    } else {
        state.as_ref().and_then(|s| s.commit_made().map(str::to_string))
    };

    let mut tag_deleted = false;
    if tag_exists {
        repo.delete_tag(&tag)?;
        tag_deleted = true;
        debug!("deleted local tag {tag}");
    }

    // Best-effort: the remote may never have seen the tag.
    let remote = &req.config.release.remote;
    let remote_tag_deleted = match repo.delete_remote_tag(&tag, remote) {
        Ok(()) => {
            debug!("deleted tag {tag} on {remote}");
            true
        }
        Err(e) => {
            debug!("remote tag deletion skipped: {e}");
            false
        }
    };

    let default_branch = repo.default_branch(remote)?;
    debug!("default branch is {default_branch}");

    let mut commit_reset = false;
    let mut files_restored = 0;
    if let Some(commit) = &release_commit {
        let subject = repo.commit_subject(commit)?;
        let expected = format!("{RELEASE_COMMIT_PREFIX}{}", req.version);
        if subject != expected {
            warn!(
                "commit {commit} does not look like the release commit for {} (subject: {subject:?}); leaving history untouched",
                req.version
            );
        } else if repo.current_commit_hash()? == *commit {
            repo.reset_hard(&format!("{commit}^"))?;
            commit_reset = true;
            info!("reset release commit {commit}");
        } else {
            // The release commit is buried under newer work. Restore the
            // released files from its parent instead of rewriting history.
            files_restored = restore_files_from_parent(&repo, commit, &state)?;
        }
    }

    if !commit_reset {
        files_restored += restore_from_backups(&req.root, &state)?;
    }

    store.clear(&req.version.to_string())?;
    info!("rolled back {}", req.version);
    Ok(RollbackOutcome {
        version: req.version.to_string(),
        tag,
        nothing_to_do: false,
        tag_deleted,
        remote_tag_deleted,
        commit_reset,
        files_restored,
    })
}

fn restore_files_from_parent(
    repo: &Repo,
    commit: &str,
    state: &Option<crate::release_state::ReleaseState>,
) -> Result<usize> {
    let paths = match state {
        Some(state) => state
            .effects
            .iter()
            .filter_map(|effect| match effect {
                SideEffect::FileWritten { path, .. } | SideEffect::FileCreated { path } => {
                    Some(path.clone())
                }
                _ => None,
            })
            .collect::<Vec<_>>(),
        None => repo.changed_files(commit)?,
    };
    let parent = format!("{commit}^");
    let mut restored = 0;
    for path in paths {
        match repo.checkout_path_from(&parent, &path) {
            Ok(()) => restored += 1,
            Err(e) => debug!("cannot restore {path} from {parent}: {e}"),
        }
    }
    Ok(restored)
}

/// Restore tracked files from their `.bak` siblings when those still
/// exist on disk (a failed release that never reached COMMIT).
fn restore_from_backups(
    root: &camino::Utf8Path,
    state: &Option<crate::release_state::ReleaseState>,
) -> Result<usize> {
    let Some(state) = state else {
        return Ok(0);
    };
    let mut restored = 0;
    for effect in state.effects_reversed() {
        match effect {
            SideEffect::FileWritten {
                path,
                backup: Some(backup),
            } if backup.exists() => {
                let target = root.join(path);
                let bytes = fs_err::read(backup.as_std_path())
                    .map_err(|e| anyhow::anyhow!("cannot read backup {backup}: {e}"))?;
                fs_err::write(target.as_std_path(), &bytes)
                    .map_err(|e| anyhow::anyhow!("cannot restore {target}: {e}"))?;
                let _ = fs_err::remove_file(backup.as_std_path());
                restored += 1;
            }
            SideEffect::FileCreated { path } => {
                let target = root.join(path);
                if target.exists() {
                    fs_err::remove_file(target.as_std_path())
                        .map_err(|e| anyhow::anyhow!("cannot remove {target}: {e}"))?;
                    restored += 1;
                }
            }
            _ => {}
        }
    }
    Ok(restored)
}
