//! Error taxonomy.
//!
//! Every variant carries a stable [`ErrorCode`] that appears verbatim in
//! user output, one or more remediation suggestions, and a process exit
//! code. Messages are sanitized before display: absolute paths and
//! secret-shaped substrings never reach the terminal.

use camino::Utf8PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigNotFound,
    ConfigInvalid,
    ConfigMissingRequired,
    GitNotRepo,
    GitNotClean,
    GitUserNotConfigured,
    GitNoCommits,
    GitTagExists,
    GitRemoteError,
    VersionNotFound,
    VersionInvalidFormat,
    VersionBumpInvalid,
    BreakingRequiresMajor,
    FileNotFound,
    FileUpdateFailed,
    FilePatternNoMatch,
    FileHandlerNotFound,
    FileJsonInvalid,
    FilePatternDangerous,
    TemplateInvalid,
    TemplateProcessingFailed,
    TemplateSecurityViolation,
    SecInvalidRef,
    SecPathTraversal,
    SecShellInjection,
    SecNullByte,
    RemoteToolMissing,
    RemoteAuthFailed,
    RemoteReleaseFailed,
    PreflightCheckFailed,
    DepNotFound,
    PermissionDenied,
    OpCancelled,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigMissingRequired => "CONFIG_MISSING_REQUIRED",
            Self::GitNotRepo => "GIT_NOT_REPO",
            Self::GitNotClean => "GIT_NOT_CLEAN",
            Self::GitUserNotConfigured => "GIT_USER_NOT_CONFIGURED",
            Self::GitNoCommits => "GIT_NO_COMMITS",
            Self::GitTagExists => "GIT_TAG_EXISTS",
            Self::GitRemoteError => "GIT_REMOTE_ERROR",
            Self::VersionNotFound => "VERSION_NOT_FOUND",
            Self::VersionInvalidFormat => "VERSION_INVALID_FORMAT",
            Self::VersionBumpInvalid => "VERSION_BUMP_INVALID",
            Self::BreakingRequiresMajor => "BREAKING_REQUIRES_MAJOR",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::FileUpdateFailed => "FILE_UPDATE_FAILED",
            Self::FilePatternNoMatch => "FILE_PATTERN_NO_MATCH",
            Self::FileHandlerNotFound => "FILE_HANDLER_NOT_FOUND",
            Self::FileJsonInvalid => "FILE_JSON_INVALID",
            Self::FilePatternDangerous => "FILE_PATTERN_DANGEROUS",
            Self::TemplateInvalid => "TEMPLATE_INVALID",
            Self::TemplateProcessingFailed => "TEMPLATE_PROCESSING_FAILED",
            Self::TemplateSecurityViolation => "TEMPLATE_SECURITY_VIOLATION",
            Self::SecInvalidRef => "SEC_INVALID_REF",
            Self::SecPathTraversal => "SEC_PATH_TRAVERSAL",
            Self::SecShellInjection => "SEC_SHELL_INJECTION",
            Self::SecNullByte => "SEC_NULL_BYTE",
            Self::RemoteToolMissing => "REMOTE_TOOL_MISSING",
            Self::RemoteAuthFailed => "REMOTE_AUTH_FAILED",
            Self::RemoteReleaseFailed => "REMOTE_RELEASE_FAILED",
            Self::PreflightCheckFailed => "PREFLIGHT_CHECK_FAILED",
            Self::DepNotFound => "DEP_NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::OpCancelled => "OP_CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no configuration file found (searched: {})", searched.join(", "))]
    ConfigNotFound { searched: Vec<String> },

    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("missing required configuration field `{field}`")]
    ConfigMissingRequired { field: &'static str },

    #[error("{directory} is not a git repository")]
    GitNotRepo { directory: Utf8PathBuf },

    #[error("the working directory has uncommitted changes")]
    GitNotClean,

    #[error("git user.name and user.email are not configured")]
    GitUserNotConfigured,

    #[error("no commits found since {}", since.as_deref().unwrap_or("the beginning of history"))]
    GitNoCommits { since: Option<String> },

    #[error("tag {tag} already exists")]
    GitTagExists { tag: String },

    #[error("git {op} against the remote failed: {detail}")]
    GitRemoteError { op: String, detail: String },

    #[error("no release version found: the repository has no version tag")]
    VersionNotFound,

    #[error("{value:?} is not a valid semantic version")]
    VersionInvalidFormat { value: String },

    #[error("invalid version bump {requested:?}")]
    VersionBumpInvalid { requested: String },

    #[error(
        "the commits since the last release contain a breaking change: a non-major bump is not allowed"
    )]
    BreakingRequiresMajor,

    #[error("file not found: {path}")]
    FileNotFound { path: Utf8PathBuf },

    #[error("failed to update {path}: {reason}")]
    FileUpdateFailed { path: Utf8PathBuf, reason: String },

    #[error("pattern {pattern:?} matched nothing in {path}")]
    FilePatternNoMatch { path: Utf8PathBuf, pattern: String },

    #[error("no file handler matches {path} and no custom patterns were provided")]
    FileHandlerNotFound { path: Utf8PathBuf },

    #[error("{path} is no longer valid JSON after the update: {reason}")]
    FileJsonInvalid { path: Utf8PathBuf, reason: String },

    #[error("dangerous pattern {pattern:?}: {reason}")]
    FilePatternDangerous { pattern: String, reason: String },

    #[error("invalid template: {reason}")]
    TemplateInvalid { reason: String },

    #[error("template processing failed: {reason}")]
    TemplateProcessingFailed { reason: String },

    #[error("template rejected by the {level} sandbox: forbidden token {token:?}")]
    TemplateSecurityViolation { level: String, token: String },

    #[error("invalid git reference in {field}")]
    SecInvalidRef { field: String },

    #[error("path {path} escapes the project directory")]
    SecPathTraversal { path: String },

    #[error("shell metacharacters are not allowed in {field}")]
    SecShellInjection { field: String },

    #[error("NUL byte in {field}")]
    SecNullByte { field: String },

    #[error("required tool `{tool}` is not installed or not on PATH")]
    RemoteToolMissing { tool: String },

    #[error("authentication with the remote forge failed")]
    RemoteAuthFailed,

    #[error("creating the remote release failed: {detail}")]
    RemoteReleaseFailed { detail: String },

    #[error("pre-flight check `{name}` failed")]
    PreflightCheckFailed { name: String },

    #[error("required dependency `{tool}` not found")]
    DepNotFound { tool: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: Utf8PathBuf },

    #[error("operation cancelled during {stage}")]
    Cancelled { stage: String },

    /// The release failed after mutation started; all recorded
    /// side-effects were reverted.
    #[error("release failed and was rolled back: {source}")]
    RolledBack {
        #[source]
        source: Box<Error>,
    },

    /// Local release succeeded (commit and tag exist) but publishing to
    /// the remote failed. Recoverable with `retry <version>`.
    #[error("release is complete locally, but publishing failed: {source}")]
    PublishFailed {
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Self::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            Self::ConfigMissingRequired { .. } => ErrorCode::ConfigMissingRequired,
            Self::GitNotRepo { .. } => ErrorCode::GitNotRepo,
            Self::GitNotClean => ErrorCode::GitNotClean,
            Self::GitUserNotConfigured => ErrorCode::GitUserNotConfigured,
            Self::GitNoCommits { .. } => ErrorCode::GitNoCommits,
            Self::GitTagExists { .. } => ErrorCode::GitTagExists,
            Self::GitRemoteError { .. } => ErrorCode::GitRemoteError,
            Self::VersionNotFound => ErrorCode::VersionNotFound,
            Self::VersionInvalidFormat { .. } => ErrorCode::VersionInvalidFormat,
            Self::VersionBumpInvalid { .. } => ErrorCode::VersionBumpInvalid,
            Self::BreakingRequiresMajor => ErrorCode::BreakingRequiresMajor,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::FileUpdateFailed { .. } => ErrorCode::FileUpdateFailed,
            Self::FilePatternNoMatch { .. } => ErrorCode::FilePatternNoMatch,
            Self::FileHandlerNotFound { .. } => ErrorCode::FileHandlerNotFound,
            Self::FileJsonInvalid { .. } => ErrorCode::FileJsonInvalid,
            Self::FilePatternDangerous { .. } => ErrorCode::FilePatternDangerous,
            Self::TemplateInvalid { .. } => ErrorCode::TemplateInvalid,
            Self::TemplateProcessingFailed { .. } => ErrorCode::TemplateProcessingFailed,
            Self::TemplateSecurityViolation { .. } => ErrorCode::TemplateSecurityViolation,
            Self::SecInvalidRef { .. } => ErrorCode::SecInvalidRef,
            Self::SecPathTraversal { .. } => ErrorCode::SecPathTraversal,
            Self::SecShellInjection { .. } => ErrorCode::SecShellInjection,
            Self::SecNullByte { .. } => ErrorCode::SecNullByte,
            Self::RemoteToolMissing { .. } => ErrorCode::RemoteToolMissing,
            Self::RemoteAuthFailed => ErrorCode::RemoteAuthFailed,
            Self::RemoteReleaseFailed { .. } => ErrorCode::RemoteReleaseFailed,
            Self::PreflightCheckFailed { .. } => ErrorCode::PreflightCheckFailed,
            Self::DepNotFound { .. } => ErrorCode::DepNotFound,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Cancelled { .. } => ErrorCode::OpCancelled,
            Self::RolledBack { source } => source.code(),
            Self::PublishFailed { source } => source.code(),
            Self::Internal(_) => ErrorCode::Unknown,
        }
    }

    /// Process exit code per the CLI contract:
    /// 1 unhandled, 2 usage/validation, 3 preflight failure,
    /// 4 release failure with rollback performed, 5 partial release
    /// (local done, remote failed).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigInvalid { .. }
            | Self::ConfigMissingRequired { .. }
            | Self::VersionInvalidFormat { .. }
            | Self::VersionBumpInvalid { .. }
            | Self::BreakingRequiresMajor
            | Self::FilePatternDangerous { .. }
            | Self::TemplateInvalid { .. }
            | Self::TemplateSecurityViolation { .. }
            | Self::SecInvalidRef { .. }
            | Self::SecPathTraversal { .. }
            | Self::SecShellInjection { .. }
            | Self::SecNullByte { .. } => 2,
            Self::GitNotRepo { .. }
            | Self::GitNotClean
            | Self::GitUserNotConfigured
            | Self::GitNoCommits { .. }
            | Self::PreflightCheckFailed { .. }
            | Self::DepNotFound { .. }
            | Self::RemoteToolMissing { .. } => 3,
            Self::RolledBack { .. } => 4,
            Self::PublishFailed { .. } => 5,
            _ => 1,
        }
    }

    /// Remediation hints shown under the error summary.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ConfigNotFound { .. } => vec![
                "run `nagare init` to scaffold a configuration file".to_string(),
                "pass an explicit path with `--config <path>`".to_string(),
            ],
            Self::ConfigInvalid { .. } | Self::ConfigMissingRequired { .. } => vec![
                "check the configuration against the documented schema".to_string(),
            ],
            Self::GitNotRepo { .. } => {
                vec!["run nagare from inside a git repository".to_string()]
            }
            Self::GitNotClean => vec![
                "commit or stash your changes before releasing".to_string(),
                "`git status` shows what is pending".to_string(),
            ],
            Self::GitUserNotConfigured => vec![
                "set your identity: `git config user.name <name>` and `git config user.email <email>`"
                    .to_string(),
            ],
            Self::GitNoCommits { .. } => {
                vec!["there is nothing to release since the last tag".to_string()]
            }
            Self::GitTagExists { tag } => vec![
                format!("delete the tag with `nagare rollback {}` or bump further", tag),
            ],
            Self::GitRemoteError { .. } => vec![
                "check your network connection and remote access rights".to_string(),
                "retry the publish step with `nagare retry <version>`".to_string(),
            ],
            Self::VersionNotFound => vec![
                "create an initial tag, e.g. `git tag v0.1.0`, or configure a starting version"
                    .to_string(),
            ],
            Self::BreakingRequiresMajor => vec![
                "run `nagare release major`, or drop the explicit bump to auto-detect".to_string(),
            ],
            Self::FilePatternNoMatch { path, .. } => vec![
                format!("check that {path} contains the version field the pattern expects"),
            ],
            Self::FileHandlerNotFound { .. } => vec![
                "add a `patterns` entry to this file's update configuration".to_string(),
            ],
            Self::FilePatternDangerous { .. } => vec![
                "anchor the pattern to the beginning of a line, e.g. `^(\\s*)\"version\": \"([^\"]+)\"`"
                    .to_string(),
            ],
            Self::TemplateSecurityViolation { .. } => vec![
                "remove host-access tokens from the template, or lower the sandbox level deliberately"
                    .to_string(),
            ],
            Self::RemoteToolMissing { tool } => {
                vec![format!("install `{tool}` and make sure it is on PATH")]
            }
            Self::RemoteAuthFailed => vec![
                "set the GITHUB_TOKEN environment variable with a token that can create releases"
                    .to_string(),
            ],
            Self::RemoteReleaseFailed { .. } | Self::PublishFailed { .. } => vec![
                "the local commit and tag are intact; run `nagare retry <version>` to publish again"
                    .to_string(),
            ],
            Self::PreflightCheckFailed { name } => vec![
                format!("fix the `{name}` check locally and run the release again"),
            ],
            Self::RolledBack { source } => source.suggestions(),
            _ => vec![],
        }
    }

    /// Wrap an error that occurred after mutation started and was undone.
    pub fn rolled_back(source: Self) -> Self {
        Self::RolledBack {
            source: Box::new(source),
        }
    }

    /// Wrap an error that occurred during PUBLISH; local state is kept.
    pub fn publish_failed(source: Self) -> Self {
        Self::PublishFailed {
            source: Box::new(source),
        }
    }
}
