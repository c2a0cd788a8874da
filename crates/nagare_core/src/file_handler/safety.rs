//! Safety analysis of user-supplied patterns.
//!
//! A pattern is dangerous when it targets a structural key of a
//! structured format without a line anchor (it could match nested keys),
//! or when it contains an unbounded greedy wildcard over version-bearing
//! text. Dangerous-but-fixable patterns are migrated to the anchored
//! equivalent; the rest are rejected.

use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

use crate::error::{Error, Result};

/// What to do with a dangerous pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    /// Reject dangerous patterns.
    Strict,
    /// Migrate fixable patterns to the safe equivalent; reject the rest.
    Migrate,
}

static STRUCTURAL_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""version"\s*:|'version'\s*:|\bversion\s*(:|\\s\*=|=)"#).expect("invalid regex")
});

/// `.*` / `.+` not made lazy by a following `?`.
static GREEDY_WILDCARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[*+](?:[^?]|$)").expect("invalid regex"));

fn is_structured(path: &Utf8Path) -> bool {
    matches!(
        path.extension(),
        Some("json" | "jsonc" | "yaml" | "yml" | "toml")
    )
}

fn has_line_anchor(pattern: &str) -> bool {
    pattern.contains('^')
}

/// Check one pattern against the file it targets.
///
/// Returns `Ok(None)` when the pattern is safe, `Ok(Some(migrated))` when
/// it was dangerous and a safe equivalent exists (migrate mode only), and
/// an error otherwise. The compiled form is not returned; compilation is
/// re-checked here so config validation reports bad regexes early.
pub fn check_pattern(
    pattern: &str,
    path: &Utf8Path,
    mode: PatternMode,
) -> Result<Option<String>> {
    if let Err(e) = Regex::new(pattern) {
        return Err(Error::ConfigInvalid {
            reason: format!("invalid pattern {pattern:?} for {path}: {e}"),
        });
    }

    if GREEDY_WILDCARD_RE.is_match(pattern) {
        return Err(Error::FilePatternDangerous {
            pattern: pattern.to_string(),
            reason: "unbounded greedy wildcard (`.*` or `.+`) over version-bearing text"
                .to_string(),
        });
    }

    let needs_anchor =
        is_structured(path) && STRUCTURAL_KEY_RE.is_match(pattern) && !has_line_anchor(pattern);
    if !needs_anchor {
        return Ok(None);
    }

    match mode {
        PatternMode::Strict => Err(Error::FilePatternDangerous {
            pattern: pattern.to_string(),
            reason: "targets a structural key without a beginning-of-line anchor".to_string(),
        }),
        PatternMode::Migrate => Ok(Some(migrate(pattern))),
    }
}

/// The recommended safe equivalent: multiline, anchored, indentation
/// captured so substitution preserves it.
fn migrate(pattern: &str) -> String {
    format!(r"(?m)^(\s*){pattern}")
}
