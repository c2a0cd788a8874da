//! The release pipeline.
//!
//! Stages run in order: PREFLIGHT → COMPUTE → GENERATE → MUTATE → COMMIT
//! → TAG → PUBLISH → HOOKS. Side-effects start at MUTATE; any failure
//! from there until the tag exists unwinds through the state log and the
//! backup manager. PUBLISH failures keep local state (the tag is real)
//! and are recovered with `retry`. Dry-run stops every stage at the point
//! of side-effect and reports what would have happened.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use git_cmd::Repo;
use next_version::VersionIncrement;
use semver::Version;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::backup::BackupManager;
use crate::changelog::{self, ReleaseNotes};
use crate::changelog_parser;
use crate::command::{CancelToken, run_configured_command};
use crate::commit;
use crate::config::{Config, HookConfig, PreflightCheckConfig};
use crate::error::{Error, Result};
use crate::file_handler::{
    FileHandler, FileHandlerRegistry, FileUpdate, FileUpdateSpec, UpdateFn, VersionPattern,
};
use crate::forge::{ForgeClient, RemoteRelease};
use crate::fs_utils;
use crate::release_state::{FailedStage, ReleaseState, SideEffect, StateStore};
use crate::repo_versions;
use crate::security::{self, RefKind};
use crate::template::{TemplateData, TemplateProcessor};
use crate::version_file;

/// Release commit message; rollback identifies the release commit by this
/// prefix.
pub const RELEASE_COMMIT_PREFIX: &str = "chore(release): bump version to ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Compute,
    Generate,
    Mutate,
    Commit,
    Tag,
    Publish,
    Hooks,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Preflight => "preflight",
            Self::Compute => "compute",
            Self::Generate => "generate",
            Self::Mutate => "mutate",
            Self::Commit => "commit",
            Self::Tag => "tag",
            Self::Publish => "publish",
            Self::Hooks => "hooks",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub fixable: bool,
    pub fix_suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseOutcome {
    pub version: String,
    pub previous_version: Option<String>,
    pub tag: String,
    pub commit: Option<String>,
    pub dry_run: bool,
    pub files: Vec<FileUpdate>,
    pub pushed: bool,
    pub remote_release: Option<RemoteRelease>,
    pub preflight: PreflightReport,
    pub warnings: Vec<String>,
}

/// What to release and how. Built by the CLI from the configuration, or
/// directly by library embedders.
pub struct ReleaseRequest {
    root: Utf8PathBuf,
    config: Config,
    registry: FileHandlerRegistry,
    forced_bump: Option<VersionIncrement>,
    dry_run: bool,
    update_fns: BTreeMap<Utf8PathBuf, UpdateFn>,
    cancel: CancelToken,
}

impl std::fmt::Debug for ReleaseRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseRequest")
            .field("root", &self.root)
            .field("forced_bump", &self.forced_bump.map(|b| b.to_string()))
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ReleaseRequest {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            registry: FileHandlerRegistry::with_builtins(),
            forced_bump: None,
            dry_run: false,
            update_fns: BTreeMap::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_forced_bump(mut self, bump: Option<VersionIncrement>) -> Self {
        self.forced_bump = bump;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register a custom file handler, appended after the built-ins.
    pub fn with_handler(mut self, handler: FileHandler) -> Self {
        self.registry.register(handler);
        self
    }

    /// Attach a programmatic update function to one of the configured
    /// files.
    pub fn with_update_fn(mut self, path: impl Into<Utf8PathBuf>, update_fn: UpdateFn) -> Self {
        self.update_fns.insert(path.into(), update_fn);
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.release.command_timeout_secs)
    }

    fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.config.release.publish_timeout_secs)
    }

    fn update_specs(&self) -> Result<Vec<FileUpdateSpec>> {
        let mut specs = vec![];
        for spec_config in &self.config.update_files {
            let mut spec = FileUpdateSpec::new(spec_config.path.clone());
            for (name, pattern) in &spec_config.patterns {
                spec = spec.with_pattern(VersionPattern::new(name, pattern)?);
            }
            if let Some(update_fn) = self.update_fns.get(&spec_config.path) {
                spec = spec.with_update_fn(update_fn.clone());
            }
            specs.push(spec);
        }
        Ok(specs)
    }
}

struct Plan {
    previous: Option<Version>,
    version: Version,
    tag: String,
    data: TemplateData,
    notes: ReleaseNotes,
    writes: Vec<PlannedWrite>,
    warnings: Vec<String>,
}

struct PlannedWrite {
    rel: Utf8PathBuf,
    abs: Utf8PathBuf,
    existed: bool,
    update: FileUpdate,
    /// Re-applied from disk at mutate time so later files observe
    /// earlier files' new content.
    spec: Option<FileUpdateSpec>,
}

/// Run a release.
#[instrument(skip(req))]
pub async fn release(req: &ReleaseRequest) -> Result<ReleaseOutcome> {
    let repo = Repo::new(&req.root).map_err(|_| Error::GitNotRepo {
        directory: req.root.clone(),
    })?;

    req.cancel.bail_if_cancelled("preflight")?;
    let preflight = run_preflight(req, &repo).await?;

    req.cancel.bail_if_cancelled("compute")?;
    let mut plan = compute_and_generate(req, &repo)?;

    if req.dry_run {
        info!(
            "dry run: would release {} as {} ({} files)",
            plan.version,
            plan.tag,
            plan.writes.len()
        );
        return Ok(ReleaseOutcome {
            version: plan.version.to_string(),
            previous_version: plan.previous.map(|v| v.to_string()),
            tag: plan.tag,
            commit: None,
            dry_run: true,
            files: plan.writes.into_iter().map(|w| w.update).collect(),
            pushed: false,
            remote_release: None,
            preflight,
            warnings: plan.warnings,
        });
    }

    // Side-effects begin here.
    run_hooks(
        &req.config.release.pre_release_hooks,
        &req.root,
        req.command_timeout(),
        true,
    )
    .await?;

    let store = StateStore::new(&req.root);
    let mut state = ReleaseState::new(&plan.version.to_string());
    let mut backup = BackupManager::new();

    let mutated = mutate_commit_tag(req, &repo, &mut plan, &mut state, &mut backup, &store).await;
    let commit_hash = match mutated {
        Ok(hash) => hash,
        Err(e) => {
            warn!("release failed, rolling back: {e}");
            undo_side_effects(&repo, &state, &mut backup)?;
            store.clear(&state.version)?;
            return Err(Error::rolled_back(e));
        }
    };

    // From here the tag exists: failures no longer roll back local state.
    // The release commit is the restore point now, so the backup siblings
    // are dropped either way.
    backup.drop_all();
    let published = publish(req, &repo, &plan, &mut state).await;
    let (pushed, remote_release) = match published {
        Ok(result) => {
            store.clear(&state.version)?;
            result
        }
        Err(e) => {
            state.failed_stage = Some(FailedStage::Publish);
            store.save(&state)?;
            return Err(Error::publish_failed(e));
        }
    };

    let hook_warnings = run_hooks(
        &req.config.release.post_release_hooks,
        &req.root,
        req.command_timeout(),
        false,
    )
    .await?;
    plan.warnings.extend(hook_warnings);

    info!("released {} as {}", plan.version, plan.tag);
    Ok(ReleaseOutcome {
        version: plan.version.to_string(),
        previous_version: plan.previous.map(|v| v.to_string()),
        tag: plan.tag,
        commit: Some(commit_hash),
        dry_run: false,
        files: plan.writes.into_iter().map(|w| w.update).collect(),
        pushed,
        remote_release,
        preflight,
        warnings: plan.warnings,
    })
}

async fn run_preflight(req: &ReleaseRequest, repo: &Repo) -> Result<PreflightReport> {
    let mut report = PreflightReport::default();

    let clean = repo.is_clean()?;
    report.checks.push(CheckResult {
        name: "working-directory-clean".to_string(),
        passed: clean,
        fixable: false,
        fix_suggestion: None,
    });
    if !clean {
        return Err(Error::GitNotClean);
    }

    let identity = repo.config_get("user.name")?.filter(|v| !v.is_empty()).is_some()
        && repo.config_get("user.email")?.filter(|v| !v.is_empty()).is_some();
    report.checks.push(CheckResult {
        name: "git-user-configured".to_string(),
        passed: identity,
        fixable: false,
        fix_suggestion: None,
    });
    if !identity {
        return Err(Error::GitUserNotConfigured);
    }

    if req.config.forge.enabled {
        let forge = ForgeClient::from_env(req.publish_timeout());
        forge.probe().await?;
        report.checks.push(CheckResult {
            name: "forge-tool-available".to_string(),
            passed: true,
            fixable: false,
            fix_suggestion: None,
        });
    }

    // User checks run concurrently; results are collected before the
    // stage transition. Fixable checks are repaired and re-run once.
    let mut handles = vec![];
    for check in req.config.release.checks.clone() {
        let root = req.root.clone();
        let timeout = req.command_timeout();
        handles.push(tokio::spawn(async move {
            let passed = run_configured_command(&check.command, &root, timeout)
                .await
                .map(|output| output.success())
                .unwrap_or(false);
            (check, passed)
        }));
    }
    for handle in handles {
        let (check, passed) = handle
            .await
            .map_err(|e| anyhow::anyhow!("preflight task failed: {e}"))?;
        let passed = if !passed && check.fix_command.is_some() {
            retry_fixable_check(req, &check).await
        } else {
            passed
        };
        report.checks.push(CheckResult {
            name: check.name.clone(),
            passed,
            fixable: check.fix_command.is_some(),
            fix_suggestion: check.fix_command.as_ref().map(|fix| fix.join(" ")),
        });
    }
    if let Some(failed) = report.checks.iter().find(|check| !check.passed) {
        return Err(Error::PreflightCheckFailed {
            name: failed.name.clone(),
        });
    }
    Ok(report)
}

async fn retry_fixable_check(req: &ReleaseRequest, check: &PreflightCheckConfig) -> bool {
    let Some(fix) = &check.fix_command else {
        return false;
    };
    info!("check `{}` failed, attempting auto-repair", check.name);
    let fixed = run_configured_command(fix, &req.root, req.command_timeout())
        .await
        .map(|output| output.success())
        .unwrap_or(false);
    if !fixed {
        return false;
    }
    run_configured_command(&check.command, &req.root, req.command_timeout())
        .await
        .map(|output| output.success())
        .unwrap_or(false)
}

fn compute_and_generate(req: &ReleaseRequest, repo: &Repo) -> Result<Plan> {
    let prefix = &req.config.release.tag_prefix;

    // COMPUTE. The tag, not the version file, is the source of truth: the
    // version file may be stale if a previous release failed after its
    // generation.
    let current = repo_versions::current_tag_version(repo, prefix)?;
    let (current_tag, current_version) = match current {
        Some((tag, version)) => (Some(tag), version),
        None => {
            debug!("no release tag found, starting from 0.0.0");
            (None, Version::new(0, 0, 0))
        }
    };

    check_version_file_drift(req, current_tag.as_deref(), &current_version)?;

    let raw_commits = repo.commits_since(current_tag.as_deref())?;
    if raw_commits.is_empty() {
        return Err(Error::GitNoCommits {
            since: current_tag.clone(),
        });
    }
    let commits = commit::parse_commits(&raw_commits);
    let messages: Vec<&str> = raw_commits.iter().map(|c| c.message.as_str()).collect();

    let mut warnings = vec![];
    let increment = match req.forced_bump {
        Some(requested) => {
            let validated =
                VersionIncrement::validate_forced(&current_version, requested, &messages)
                    .map_err(|_| Error::BreakingRequiresMajor)?;
            if validated != requested {
                warnings.push(format!(
                    "requested {requested} bump demoted to {validated}: breaking changes under major version 0 advance the minor version"
                ));
            }
            validated
        }
        None => {
            let increment = VersionIncrement::from_commits(&current_version, &messages)
                .ok_or(Error::GitNoCommits {
                    since: current_tag.clone(),
                })?;
            if VersionIncrement::is_zero_major_demotion(&current_version, &messages) {
                warnings.push(
                    "breaking changes under major version 0 advance the minor version".to_string(),
                );
            }
            increment
        }
    };
    for warning in &warnings {
        warn!("{warning}");
    }

    let version = increment.bump(&current_version);
    let tag = repo_versions::tag_for(prefix, &version);
    security::validate_git_ref(&tag, RefKind::Tag)?;
    if repo.tag_exists(&tag)? {
        return Err(Error::GitTagExists { tag });
    }

    // GENERATE. Abort on any template failure before anything is written.
    let now = Utc::now();
    let notes = changelog::build_release_notes(
        &version,
        now.date_naive(),
        &commits,
        &req.config.changelog.sections,
    );
    let head = repo.current_commit_hash()?;
    let data = TemplateData::new(
        &version,
        current_tag.is_some().then_some(&current_version),
        &head,
        now,
        req.config.project.clone(),
        notes.clone(),
        req.config.metadata.clone(),
    );
    let processor = TemplateProcessor::new(req.config.template.sandbox, req.config.template.max_bytes);

    let mut writes = vec![];

    let version_file_rel = req.config.version_file.path.clone();
    let version_file_abs = security::validate_file_path(&version_file_rel, &req.root)?;
    let new_version_file = version_file::render_version_file(&req.config.version_file, &processor, &data)?;
    let old_version_file = version_file_abs
        .exists()
        .then(|| fs_utils::read_to_string(&version_file_abs))
        .transpose()?;
    writes.push(PlannedWrite {
        rel: version_file_rel.clone(),
        abs: version_file_abs,
        existed: old_version_file.is_some(),
        update: FileUpdate {
            path: version_file_rel,
            changed: old_version_file.as_deref() != Some(new_version_file.as_str()),
            preview: vec![],
            new_content: new_version_file,
        },
        spec: None,
    });

    if req.config.changelog.enabled {
        let changelog_rel = req.config.changelog.path.clone();
        let changelog_abs = security::validate_file_path(&changelog_rel, &req.root)?;
        let old_changelog = changelog_abs
            .exists()
            .then(|| fs_utils::read_to_string(&changelog_abs))
            .transpose()?;
        let merged = changelog::merge_into(old_changelog.as_deref().unwrap_or_default(), &notes);
        writes.push(PlannedWrite {
            rel: changelog_rel.clone(),
            abs: changelog_abs,
            existed: old_changelog.is_some(),
            update: FileUpdate {
                path: changelog_rel,
                changed: old_changelog.as_deref() != Some(merged.as_str()),
                preview: vec![],
                new_content: merged,
            },
            spec: None,
        });
    }

    for spec in req.update_specs()? {
        let abs = security::validate_file_path(&spec.path, &req.root)?;
        if !abs.exists() {
            return Err(Error::FileNotFound {
                path: spec.path.clone(),
            });
        }
        let content = fs_utils::read_to_string(&abs)?;
        let update = req.registry.preview(&spec, &content, &data)?;
        writes.push(PlannedWrite {
            rel: spec.path.clone(),
            abs,
            existed: true,
            update,
            spec: Some(spec),
        });
    }

    Ok(Plan {
        previous: current_tag.is_some().then_some(current_version),
        version,
        tag,
        data,
        notes,
        writes,
        warnings,
    })
}

/// Reject a release when the version file and the latest tag disagree,
/// unless the user opted into syncing (the tag wins).
fn check_version_file_drift(
    req: &ReleaseRequest,
    current_tag: Option<&str>,
    current_version: &Version,
) -> Result<()> {
    if current_tag.is_none() {
        return Ok(());
    }
    let abs = security::validate_file_path(&req.config.version_file.path, &req.root)?;
    if !abs.exists() {
        return Ok(());
    }
    let content = fs_utils::read_to_string(&abs)?;
    let Some(recorded) = version_file::read_version_from(&content, req.config.version_file.format)
    else {
        return Ok(());
    };
    if &recorded != current_version {
        if req.config.release.sync_on_mismatch {
            warn!(
                "version file records {recorded} but the latest tag is {current_version}; continuing with the tag"
            );
            return Ok(());
        }
        return Err(Error::PreflightCheckFailed {
            name: format!(
                "version-file-sync (file records {recorded}, latest tag is {current_version}; set release.sync_on_mismatch to continue)"
            ),
        });
    }
    Ok(())
}

async fn mutate_commit_tag(
    req: &ReleaseRequest,
    repo: &Repo,
    plan: &mut Plan,
    state: &mut ReleaseState,
    backup: &mut BackupManager,
    store: &StateStore,
) -> Result<String> {
    // MUTATE. Files are written in configuration order; a later file's
    // update function can observe an earlier file's new content.
    for write in &mut plan.writes {
        req.cancel.bail_if_cancelled("mutate")?;
        let backup_ref = backup.capture(&write.abs)?;
        match &write.spec {
            Some(spec) => {
                let update = req.registry.update(spec, &write.abs, &plan.data)?;
                write.update = update;
            }
            None => {
                fs_utils::atomic_write(&write.abs, &write.update.new_content)?;
            }
        }
        let effect = if write.existed {
            SideEffect::FileWritten {
                path: write.rel.clone(),
                backup: backup_ref,
            }
        } else {
            SideEffect::FileCreated {
                path: write.rel.clone(),
            }
        };
        state.record(effect);
        store.save(state)?;
        debug!("updated {}", write.rel);
    }

    // COMMIT. One commit containing every written file.
    req.cancel.bail_if_cancelled("commit")?;
    let paths: Vec<Utf8PathBuf> = plan.writes.iter().map(|w| w.rel.clone()).collect();
    let message = format!("{RELEASE_COMMIT_PREFIX}{}", plan.version);
    repo.add_and_commit(&message, &paths)?;
    let hash = repo.current_commit_hash()?;
    state.record(SideEffect::CommitMade { hash: hash.clone() });
    store.save(state)?;

    // TAG.
    req.cancel.bail_if_cancelled("tag")?;
    repo.tag(&plan.tag, &format!("Release {}", plan.version))?;
    state.record(SideEffect::TagCreated {
        name: plan.tag.clone(),
        remote: None,
    });
    store.save(state)?;
    info!("created tag {}", plan.tag);
    Ok(hash)
}

async fn publish(
    req: &ReleaseRequest,
    repo: &Repo,
    plan: &Plan,
    state: &mut ReleaseState,
) -> Result<(bool, Option<RemoteRelease>)> {
    if req.cancel.is_cancelled() {
        // Cancellation during PUBLISH is a publish failure: local state
        // (commit and tag) is preserved.
        return Err(Error::Cancelled {
            stage: "publish".to_string(),
        });
    }
    let remote = &req.config.release.remote;
    let mut pushed = false;
    if req.config.release.push {
        let branch = repo.current_branch()?;
        security::validate_git_ref(&branch, RefKind::Branch)?;
        security::validate_git_ref(remote, RefKind::Remote)?;
        push_with_retry(repo, &branch, remote).await?;
        state.record(SideEffect::PushPerformed {
            refspec: branch,
            remote: remote.clone(),
        });
        push_with_retry(repo, &plan.tag, remote).await?;
        state.record(SideEffect::PushPerformed {
            refspec: plan.tag.clone(),
            remote: remote.clone(),
        });
        pushed = true;
        info!("pushed branch and tag to {remote}");
    }

    let remote_release = if req.config.forge.enabled {
        let forge = ForgeClient::from_env(req.publish_timeout());
        let body = release_body(&plan.notes);
        let release = forge.create_release(&plan.tag, &plan.tag, &body).await?;
        state.record(SideEffect::RemoteReleaseCreated {
            id: release.id.clone(),
            url: release.url.clone(),
        });
        Some(release)
    } else {
        None
    };
    Ok((pushed, remote_release))
}

/// The changelog fragment without its version heading, used as the
/// remote release body.
pub(crate) fn release_body(notes: &ReleaseNotes) -> String {
    let fragment = changelog::render_fragment(notes);
    fragment
        .split_once('\n')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default()
}

/// Push with one retry and backoff; network hiccups on publish are
/// common and retryable.
async fn push_with_retry(repo: &Repo, refspec: &str, remote: &str) -> Result<()> {
    match repo.push(refspec, remote) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("push of {refspec} failed ({first}), retrying once");
            tokio::time::sleep(Duration::from_secs(2)).await;
            repo.push(refspec, remote).map_err(|e| Error::GitRemoteError {
                op: "push".to_string(),
                detail: security::sanitize_error_message(&e.to_string(), false),
            })
        }
    }
}

/// Reverse every recorded side-effect, newest first, then restore file
/// contents. Tolerant of missing preconditions: an already-deleted tag or
/// an already-moved HEAD is skipped.
fn undo_side_effects(repo: &Repo, state: &ReleaseState, backup: &mut BackupManager) -> Result<()> {
    for effect in state.effects_reversed() {
        match effect {
            SideEffect::TagCreated { name, .. } => {
                if repo.tag_exists(name).unwrap_or(false) {
                    repo.delete_tag(name)?;
                    debug!("deleted tag {name}");
                }
            }
            SideEffect::CommitMade { hash } => {
                let head = repo.current_commit_hash()?;
                if &head == hash {
                    repo.reset_hard(&format!("{hash}^"))?;
                    debug!("reset release commit {hash}");
                }
            }
            SideEffect::FileWritten { .. }
            | SideEffect::FileCreated { .. }
            | SideEffect::PushPerformed { .. }
            | SideEffect::RemoteReleaseCreated { .. } => {}
        }
    }
    backup.restore_all()
}

async fn run_hooks(
    hooks: &[HookConfig],
    root: &Utf8Path,
    timeout: Duration,
    abort_on_failure: bool,
) -> Result<Vec<String>> {
    let mut warnings = vec![];
    for hook in hooks {
        let outcome = run_configured_command(&hook.command, root, timeout).await;
        let failed = match &outcome {
            Ok(output) => !output.success(),
            Err(_) => true,
        };
        if failed {
            if abort_on_failure {
                return Err(Error::Internal(anyhow::anyhow!(
                    "pre-release hook `{}` failed",
                    hook.name
                )));
            }
            // The release has already succeeded; a post-release hook
            // failure is reported but never fails the release.
            let warning = format!("post-release hook `{}` failed", hook.name);
            warn!("{warning}");
            warnings.push(warning);
        } else {
            debug!("hook `{}` succeeded", hook.name);
        }
    }
    Ok(warnings)
}
