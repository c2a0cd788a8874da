//! Reading existing changelogs.

use camino::Utf8Path;

use crate::error::Result;
use crate::fs_utils;

/// Header block: everything before the first released-version heading
/// (`## [X.Y.Z]`). The `## [Unreleased]` heading belongs to the header.
///
/// Returns `None` when the changelog starts directly with a version
/// heading or is empty.
pub fn parse_header(changelog: &str) -> Option<String> {
    if changelog.trim().is_empty() {
        return None;
    }
    let mut offset = 0;
    for line in changelog.split_inclusive('\n') {
        if is_version_heading(line) {
            if offset == 0 {
                return None;
            }
            return Some(changelog[..offset].to_string());
        }
        offset += line.len();
    }
    // No released version yet: the whole changelog is the header,
    // provided it looks like a preamble.
    changelog.starts_with('#').then(|| changelog.to_string())
}

/// True if the changelog already records the given version.
pub fn contains_version(changelog: &str, version: &str) -> bool {
    changelog
        .lines()
        .any(|line| is_version_heading(line) && heading_version(line) == Some(version))
}

fn is_version_heading(line: &str) -> bool {
    let rest = match line.strip_prefix("## [") {
        Some(rest) => rest,
        None => return false,
    };
    rest.starts_with(|c: char| c.is_ascii_digit())
}

fn heading_version(line: &str) -> Option<&str> {
    line.strip_prefix("## [")?.split(']').next()
}

/// Notes of the most recently released version, used as the remote
/// release body. Returns `None` when the changelog has no released
/// version yet.
pub fn last_changes(changelog_path: &Utf8Path) -> Result<Option<String>> {
    let changelog = fs_utils::read_to_string(changelog_path)?;
    last_changes_from_str(&changelog)
}

pub fn last_changes_from_str(changelog: &str) -> Result<Option<String>> {
    let parsed = match parse_changelog::parse(changelog) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(None),
    };
    let last = parsed
        .values()
        .find(|release| !release.version.eq_ignore_ascii_case("unreleased"))
        .map(|release| release.notes.trim().to_string())
        .filter(|notes| !notes.is_empty());
    Ok(last)
}
