//! Validation of untrusted input and sanitization of output.
//!
//! Every string that crosses into a subprocess, a file path, or user-visible
//! output goes through one of these functions. They are pure and total
//! except where a filesystem lookup is unavoidable (path containment).

use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::error::{Error, Result};

const MAX_REF_BYTES: usize = 255;
const MAX_CLI_ARG_BYTES: usize = 1024;

/// Characters git refuses in refnames, plus anything a shell could abuse.
const FORBIDDEN_REF_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\', ' '];

const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '{', '}', '"', '\'', '\\', '\n',
];

/// Anchored semver 2.0, optionally preceded by a short alphabetic tag prefix.
/// https://semver.org/#is-there-a-suggested-regular-expression-regex-to-check-a-semver-string
static TAG_SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[A-Za-z-]{0,16}",
        r"(?:0|[1-9]\d*)",
        r"\.",
        r"(?:0|[1-9]\d*)",
        r"\.",
        r"(?:0|[1-9]\d*)",
        r"(?:-(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*)?",
        r"(?:\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?",
        r"$",
    ))
    .expect("invalid tag regex")
});

static COMMIT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{7,40}$").expect("invalid hash regex"));

static GITHUB_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ghp_[A-Za-z0-9]+").expect("invalid token regex"));

static LABELLED_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(token|secret|password|api[_-]?key)\s*[=:]\s*\S+").expect("invalid regex")
});

static ABSOLUTE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/[A-Za-z0-9._@+-]+){2,}").expect("invalid path regex"));

/// What a git reference is used as. Tags additionally require a
/// semver-like shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
    Remote,
    Refspec,
}

impl RefKind {
    fn field(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Remote => "remote",
            Self::Refspec => "refspec",
        }
    }
}

/// Validate a string destined to be a git ref argument.
pub fn validate_git_ref(input: &str, kind: RefKind) -> Result<()> {
    let field = kind.field().to_string();
    if input.contains('\0') {
        return Err(Error::SecNullByte { field });
    }
    if input.is_empty()
        || input.len() > MAX_REF_BYTES
        || input.starts_with('-')
        || input.contains("..")
        || input.contains("@{")
        || input.chars().any(char::is_control)
    {
        return Err(Error::SecInvalidRef { field });
    }
    let forbidden: &[char] = if kind == RefKind::Refspec {
        // refspecs legitimately contain `:` (e.g. `:refs/tags/v1.2.3`)
        &['~', '^', '?', '*', '[', '\\', ' ']
    } else {
        FORBIDDEN_REF_CHARS
    };
    if input.contains(forbidden) {
        return Err(Error::SecInvalidRef { field });
    }
    if kind == RefKind::Tag && !TAG_SEMVER_RE.is_match(input) {
        return Err(Error::SecInvalidRef { field });
    }
    Ok(())
}

/// Validate a user-supplied relative path and resolve it inside `root`.
///
/// Returns the absolute path. Rejects absolute input, NUL bytes, `..`
/// components, and anything that resolves outside `root` (symlinks
/// included).
pub fn validate_file_path(input: &Utf8Path, root: &Utf8Path) -> Result<Utf8PathBuf> {
    let shown = input.to_string();
    if shown.contains('\0') {
        return Err(Error::SecNullByte {
            field: "path".to_string(),
        });
    }
    if input.is_absolute() {
        return Err(Error::SecPathTraversal { path: shown });
    }
    if input
        .components()
        .any(|c| matches!(c, camino::Utf8Component::ParentDir))
    {
        return Err(Error::SecPathTraversal { path: shown });
    }
    let joined = root.join(input);
    let canonical_root = canonicalize_utf8(root).map_err(|_| Error::SecPathTraversal {
        path: root.to_string(),
    })?;
    // The file may not exist yet; containment is checked on the deepest
    // existing ancestor.
    let mut probe: &Utf8Path = &joined;
    let canonical_probe = loop {
        if let Ok(resolved) = canonicalize_utf8(probe) {
            break resolved;
        }
        match probe.parent() {
            Some(parent) => probe = parent,
            None => {
                return Err(Error::SecPathTraversal { path: shown });
            }
        }
    };
    if !canonical_probe.starts_with(&canonical_root) {
        return Err(Error::SecPathTraversal { path: shown });
    }
    Ok(joined)
}

fn canonicalize_utf8(path: &Utf8Path) -> anyhow::Result<Utf8PathBuf> {
    let canonical = dunce::canonicalize(path.as_std_path())?;
    Ok(Utf8PathBuf::try_from(canonical)?)
}

/// Validate arguments destined for a subprocess.
///
/// Flags are trusted (they come from our own code); positional arguments
/// must not contain shell metacharacters even though no shell is involved.
pub fn validate_cli_args<S: AsRef<str>>(argv: &[S]) -> Result<()> {
    for arg in argv {
        let arg = arg.as_ref();
        if arg.contains('\0') {
            return Err(Error::SecNullByte {
                field: "argument".to_string(),
            });
        }
        if arg.len() > MAX_CLI_ARG_BYTES {
            return Err(Error::SecShellInjection {
                field: "argument".to_string(),
            });
        }
        if arg.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
            return Err(Error::SecShellInjection {
                field: "argument".to_string(),
            });
        }
        if !arg.starts_with('-') && arg.contains(SHELL_METACHARACTERS) {
            return Err(Error::SecShellInjection {
                field: "argument".to_string(),
            });
        }
    }
    Ok(())
}

/// Strip secrets and, outside debug mode, absolute paths from a message
/// destined for the terminal.
pub fn sanitize_error_message(message: &str, debug: bool) -> String {
    let redacted = GITHUB_TOKEN_RE.replace_all(message, "ghp_[redacted]");
    let redacted = LABELLED_SECRET_RE.replace_all(&redacted, "$1=[redacted]");
    if debug {
        return redacted.into_owned();
    }
    ABSOLUTE_PATH_RE
        .replace_all(&redacted, |caps: &regex::Captures<'_>| {
            let path = caps.get(0).map_or("", |m| m.as_str());
            let base = path.rsplit('/').next().unwrap_or_default();
            format!(".../{base}")
        })
        .into_owned()
}

/// Parse a semantic version, with or without leading `v`.
pub fn validate_semver(input: &str) -> Result<semver::Version> {
    let bare = input.strip_prefix('v').unwrap_or(input);
    semver::Version::parse(bare).map_err(|_| Error::VersionInvalidFormat {
        value: input.to_string(),
    })
}

/// A full or abbreviated (>= 7 chars) lowercase hex commit hash.
pub fn validate_commit_hash(input: &str) -> Result<()> {
    if COMMIT_HASH_RE.is_match(input) {
        Ok(())
    } else {
        Err(Error::SecInvalidRef {
            field: "commit hash".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn refs_with_git_metacharacters_are_rejected() {
        for bad in [
            "a..b", "a@{1}", "a b", "a~1", "a^2", "a:b", "a?b", "a*b", "a[b", "-flag", "",
        ] {
            assert!(validate_git_ref(bad, RefKind::Branch).is_err(), "{bad:?}");
        }
        assert!(validate_git_ref("feature/login", RefKind::Branch).is_ok());
        assert!(validate_git_ref("origin", RefKind::Remote).is_ok());
    }

    #[test]
    fn tags_require_semver_shape() {
        assert!(validate_git_ref("v1.2.3", RefKind::Tag).is_ok());
        assert!(validate_git_ref("v1.2.3-rc.1+build.5", RefKind::Tag).is_ok());
        assert!(validate_git_ref("release-2.0.0", RefKind::Tag).is_ok());
        assert!(validate_git_ref("v1.2", RefKind::Tag).is_err());
        assert!(validate_git_ref("main", RefKind::Tag).is_err());
        assert!(validate_git_ref("v01.2.3", RefKind::Tag).is_err());
    }

    #[test]
    fn refspec_allows_colon() {
        assert!(validate_git_ref(":refs/tags/v1.2.3", RefKind::Refspec).is_ok());
        assert!(validate_git_ref(":refs/tags/v1 2", RefKind::Refspec).is_err());
    }

    #[test]
    fn path_traversal_is_rejected() {
        let root = Utf8Path::new("/tmp");
        let err = validate_file_path(Utf8Path::new("../etc/passwd"), root).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SecPathTraversal);
        let err = validate_file_path(Utf8Path::new("/etc/passwd"), root).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SecPathTraversal);
    }

    #[test]
    fn contained_paths_resolve_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let resolved = validate_file_path(Utf8Path::new("sub/file.json"), root).unwrap();
        assert!(resolved.starts_with(root));
    }

    #[test]
    fn cli_args_with_shell_metacharacters_are_rejected() {
        assert!(validate_cli_args(&["ok", "also-ok"]).is_ok());
        assert!(validate_cli_args(&["rm -rf;"]).is_err());
        assert!(validate_cli_args(&["$(whoami)"]).is_err());
        assert!(validate_cli_args(&["a\0b"]).is_err());
        let long = "x".repeat(2000);
        assert!(validate_cli_args(&[long.as_str()]).is_err());
    }

    #[test]
    fn tokens_are_redacted() {
        let message = "push failed for https://ghp_abc123XYZ@github.com/o/r";
        let sanitized = sanitize_error_message(message, true);
        assert!(!sanitized.contains("ghp_abc123XYZ"));
        assert!(sanitized.contains("ghp_[redacted]"));
    }

    #[test]
    fn labelled_secrets_are_redacted() {
        let sanitized = sanitize_error_message("auth: token=deadbeef failed", false);
        assert!(!sanitized.contains("deadbeef"));
    }

    #[test]
    fn absolute_paths_are_stripped_outside_debug() {
        let sanitized = sanitize_error_message("cannot read /home/user/project/deno.json", false);
        assert!(!sanitized.contains("/home/user"));
        assert!(sanitized.contains("deno.json"));
        let debug = sanitize_error_message("cannot read /home/user/project/deno.json", true);
        assert!(debug.contains("/home/user/project/deno.json"));
    }

    #[test]
    fn semver_and_hash_validation() {
        assert!(validate_semver("1.2.3").is_ok());
        assert!(validate_semver("v1.2.3").is_ok());
        assert!(validate_semver("1.2").is_err());
        assert!(validate_commit_hash("abc1234").is_ok());
        assert!(validate_commit_hash("xyz").is_err());
    }

    #[test]
    fn semver_parse_then_format_is_identity() {
        for input in ["1.2.3", "0.1.0-rc.1", "2.0.0-alpha.1+build.42"] {
            assert_eq!(validate_semver(input).unwrap().to_string(), input);
        }
    }
}
