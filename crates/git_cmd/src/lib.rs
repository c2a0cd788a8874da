//! Wrapper around the `git` command line interface.
//!
//! Commands are spawned directly with an argument array, never through a
//! shell. Callers are expected to validate untrusted input (tag names,
//! refspecs, paths) before it reaches this crate; a minimal guard against
//! NUL bytes, option injection and oversized arguments is applied here as
//! a second line of defense.

use std::process::Command;

use anyhow::{Context, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{instrument, trace};

#[cfg(feature = "test_fixture")]
pub mod test_fixture;

const MAX_ARG_BYTES: usize = 8192;

/// Separators used to split `git log` output into records and fields.
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// A commit as read from `git log`, before any conventional-commit parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    /// Full hex hash.
    pub hash: String,
    /// Committer date, ISO-8601 (`%cI`).
    pub date: String,
    /// Full commit message (subject and body).
    pub message: String,
}

impl RawCommit {
    pub fn first_line(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Local git repository.
#[derive(Debug)]
pub struct Repo {
    directory: Utf8PathBuf,
    /// Branch that was checked out when this object was created.
    original_branch: String,
}

impl Repo {
    /// Open the repository containing `directory`.
    ///
    /// Fails if `directory` is not inside a git work tree.
    pub fn new(directory: impl AsRef<Utf8Path>) -> anyhow::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let in_work_tree = git_in(&directory, &["rev-parse", "--is-inside-work-tree"])
            .map(|out| out == "true")
            .unwrap_or(false);
        if !in_work_tree {
            bail!("directory {directory:?} is not in a git work tree");
        }
        let original_branch = git_in(&directory, &["rev-parse", "--abbrev-ref", "HEAD"])
            .context("cannot determine current branch")?;
        Ok(Self {
            directory,
            original_branch,
        })
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    pub fn original_branch(&self) -> &str {
        &self.original_branch
    }

    /// Run git with the given arguments in the repository directory.
    ///
    /// Returns trimmed stdout. Non-zero exit status is an error carrying
    /// the git subcommand name and stderr.
    pub fn git(&self, args: &[&str]) -> anyhow::Result<String> {
        git_in(&self.directory, args)
    }

    /// True if there are no staged or unstaged changes.
    /// Untracked files don't make the work tree dirty.
    pub fn is_clean(&self) -> anyhow::Result<bool> {
        let output = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(output.is_empty())
    }

    pub fn current_commit_hash(&self) -> anyhow::Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn current_branch(&self) -> anyhow::Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Subject line of the given commit.
    pub fn commit_subject(&self, commit_ish: &str) -> anyhow::Result<String> {
        guard_ref(commit_ish)?;
        self.git(&["show", "-s", "--format=%s", commit_ish])
    }

    /// First parent of the given commit.
    pub fn commit_parent(&self, commit_ish: &str) -> anyhow::Result<String> {
        guard_ref(commit_ish)?;
        self.git(&["rev-parse", &format!("{commit_ish}^")])
    }

    pub fn checkout(&self, commit_ish: &str) -> anyhow::Result<()> {
        guard_ref(commit_ish)?;
        self.git(&["checkout", commit_ish])?;
        Ok(())
    }

    /// Restore `path` to its content at `commit_ish`.
    pub fn checkout_path_from(&self, commit_ish: &str, path: &Utf8Path) -> anyhow::Result<()> {
        guard_ref(commit_ish)?;
        self.git(&["checkout", commit_ish, "--", path.as_str()])?;
        Ok(())
    }

    pub fn reset_hard(&self, commit_ish: &str) -> anyhow::Result<()> {
        guard_ref(commit_ish)?;
        self.git(&["reset", "--hard", commit_ish])?;
        Ok(())
    }

    /// Stage the given paths and record a single commit.
    pub fn add_and_commit(&self, message: &str, paths: &[Utf8PathBuf]) -> anyhow::Result<()> {
        let mut add_args = vec!["add", "--"];
        for path in paths {
            add_args.push(path.as_str());
        }
        self.git(&add_args)?;
        self.git(&["commit", "--no-verify", "-m", message])?;
        Ok(())
    }

    /// Create an annotated tag.
    pub fn tag(&self, name: &str, message: &str) -> anyhow::Result<()> {
        guard_ref(name)?;
        self.git(&["tag", "-a", name, "-m", message])?;
        Ok(())
    }

    pub fn tag_exists(&self, name: &str) -> anyhow::Result<bool> {
        guard_ref(name)?;
        let output = self.git(&["tag", "--list", name])?;
        Ok(!output.is_empty())
    }

    pub fn delete_tag(&self, name: &str) -> anyhow::Result<()> {
        guard_ref(name)?;
        self.git(&["tag", "-d", name])?;
        Ok(())
    }

    /// Delete a tag on `remote`. Errors if the remote refuses; the caller
    /// decides whether "not found" is tolerable.
    pub fn delete_remote_tag(&self, name: &str, remote: &str) -> anyhow::Result<()> {
        guard_ref(name)?;
        guard_ref(remote)?;
        self.git(&["push", remote, &format!(":refs/tags/{name}")])?;
        Ok(())
    }

    /// Commit a tag points at (peeled).
    pub fn tag_commit(&self, name: &str) -> anyhow::Result<String> {
        guard_ref(name)?;
        self.git(&["rev-parse", &format!("{name}^{{commit}}")])
    }

    /// Tag names ordered newest first by creation date.
    pub fn tags_by_recency(&self) -> anyhow::Result<Vec<String>> {
        let output = self.git(&[
            "for-each-ref",
            "--sort=-creatordate",
            "--format=%(refname:short)",
            "refs/tags",
        ])?;
        Ok(output.lines().map(str::to_string).collect())
    }

    pub fn push(&self, refspec: &str, remote: &str) -> anyhow::Result<()> {
        guard_ref(refspec)?;
        guard_ref(remote)?;
        self.git(&["push", remote, refspec])?;
        Ok(())
    }

    pub fn fetch(&self, refspec: &str, remote: &str) -> anyhow::Result<()> {
        guard_ref(refspec)?;
        guard_ref(remote)?;
        self.git(&["fetch", remote, refspec])?;
        Ok(())
    }

    /// Commits reachable from HEAD and not from `since`, oldest first.
    /// With `since = None`, the whole history of HEAD.
    #[instrument(skip(self))]
    pub fn commits_since(&self, since: Option<&str>) -> anyhow::Result<Vec<RawCommit>> {
        if let Some(reference) = since {
            guard_ref(reference)?;
        }
        let range = match since {
            Some(reference) => format!("{reference}..HEAD"),
            None => "HEAD".to_string(),
        };
        let format = format!("--format=%H{FIELD_SEP}%cI{FIELD_SEP}%B{RECORD_SEP}");
        let output = self.git(&["log", "--reverse", &format, &range])?;
        Ok(parse_log(&output))
    }

    /// Paths touched by the given commit.
    pub fn changed_files(&self, commit_ish: &str) -> anyhow::Result<Vec<Utf8PathBuf>> {
        guard_ref(commit_ish)?;
        let output = self.git(&[
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "-r",
            commit_ish,
        ])?;
        Ok(output.lines().map(Utf8PathBuf::from).collect())
    }

    /// Value of a git config key, `None` when unset.
    pub fn config_get(&self, key: &str) -> anyhow::Result<Option<String>> {
        guard_ref(key)?;
        let output = Command::new("git")
            .current_dir(&self.directory)
            .args(["config", "--get", key])
            .output()
            .context("error while spawning git")?;
        if output.status.success() {
            let value = String::from_utf8(output.stdout).context("invalid utf-8 in git config")?;
            Ok(Some(value.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Default branch of `remote`, falling back to the current branch when
    /// the remote HEAD is unknown.
    pub fn default_branch(&self, remote: &str) -> anyhow::Result<String> {
        guard_ref(remote)?;
        let symbolic = self.git(&[
            "symbolic-ref",
            "--short",
            &format!("refs/remotes/{remote}/HEAD"),
        ]);
        match symbolic {
            Ok(full) => Ok(full
                .strip_prefix(&format!("{remote}/"))
                .unwrap_or(&full)
                .to_string()),
            Err(_) => self.current_branch(),
        }
    }
}

fn parse_log(output: &str) -> Vec<RawCommit> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_start_matches(['\n', '\r']);
            let mut fields = record.splitn(3, FIELD_SEP);
            let hash = fields.next()?.trim();
            let date = fields.next()?.trim();
            let message = fields.next()?.trim_end();
            if hash.is_empty() {
                return None;
            }
            Some(RawCommit {
                hash: hash.to_string(),
                date: date.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

fn git_in(directory: &Utf8Path, args: &[&str]) -> anyhow::Result<String> {
    for arg in args {
        guard_arg(arg)?;
    }
    let op = args.first().copied().unwrap_or_default();
    trace!("running git {args:?}");
    let output = Command::new("git")
        .current_dir(directory)
        .args(args)
        .output()
        .context("error while spawning git")?;
    let stdout = String::from_utf8(output.stdout).context("invalid utf-8 in git output")?;
    if output.status.success() {
        Ok(stdout.trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!("git {op} failed: {}", stderr.trim()))
    }
}

fn guard_arg(arg: &str) -> anyhow::Result<()> {
    if arg.contains('\0') {
        bail!("git argument contains a NUL byte");
    }
    if arg.len() > MAX_ARG_BYTES {
        bail!("git argument exceeds {MAX_ARG_BYTES} bytes");
    }
    Ok(())
}

/// Guard for user-influenced refs, tag names, remotes and refspecs.
/// Option-like strings must never be interpreted as flags.
fn guard_ref(input: &str) -> anyhow::Result<()> {
    guard_arg(input)?;
    if input.is_empty() {
        bail!("empty git reference");
    }
    if input.starts_with('-') {
        bail!("git reference starts with '-': {input:?}");
    }
    if input.chars().any(char::is_control) {
        bail!("git reference contains control characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_output_is_parsed() {
        let output = format!(
            "abc1234{FIELD_SEP}2024-05-01T10:00:00+00:00{FIELD_SEP}feat: one\n\nbody{RECORD_SEP}\ndef5678{FIELD_SEP}2024-05-02T10:00:00+00:00{FIELD_SEP}fix: two{RECORD_SEP}"
        );
        let commits = parse_log(&output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc1234");
        assert_eq!(commits[0].message, "feat: one\n\nbody");
        assert_eq!(commits[0].first_line(), "feat: one");
        assert_eq!(commits[1].hash, "def5678");
        assert_eq!(commits[1].date, "2024-05-02T10:00:00+00:00");
    }

    #[test]
    fn ref_guard_rejects_option_injection() {
        assert!(guard_ref("--force").is_err());
        assert!(guard_ref("").is_err());
        assert!(guard_ref("v1.0.0").is_ok());
    }

    #[test]
    fn arg_guard_rejects_nul() {
        assert!(guard_arg("a\0b").is_err());
        assert!(guard_arg("fine").is_ok());
    }
}
