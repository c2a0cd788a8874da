//! Keep-a-Changelog generation and merging.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::changelog_parser;
use crate::commit::ConventionalCommit;

pub const CHANGELOG_FILENAME: &str = "CHANGELOG.md";

pub const CHANGELOG_HEADER: &str = r#"# Changelog

All notable changes to this project will be documented in this file.

The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.0.0/),
and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).

## [Unreleased]
"#;

/// Keep-a-Changelog sections, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Added,
    Changed,
    Deprecated,
    Removed,
    Fixed,
    Security,
}

impl Section {
    pub const ALL: [Self; 6] = [
        Self::Added,
        Self::Changed,
        Self::Deprecated,
        Self::Removed,
        Self::Fixed,
        Self::Security,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Changed => "Changed",
            Self::Deprecated => "Deprecated",
            Self::Removed => "Removed",
            Self::Fixed => "Fixed",
            Self::Security => "Security",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "added" => Some(Self::Added),
            "changed" => Some(Self::Changed),
            "deprecated" => Some(Self::Deprecated),
            "removed" => Some(Self::Removed),
            "fixed" => Some(Self::Fixed),
            "security" => Some(Self::Security),
            _ => None,
        }
    }
}

/// Structured notes for one release.
///
/// Section arrays preserve commit order; entries are the rendered lines
/// without the leading `- `.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseNotes {
    pub version: String,
    /// UTC release date.
    pub date: String,
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub deprecated: Vec<String>,
    pub removed: Vec<String>,
    pub fixed: Vec<String>,
    pub security: Vec<String>,
}

impl ReleaseNotes {
    fn section_mut(&mut self, section: Section) -> &mut Vec<String> {
        match section {
            Section::Added => &mut self.added,
            Section::Changed => &mut self.changed,
            Section::Deprecated => &mut self.deprecated,
            Section::Removed => &mut self.removed,
            Section::Fixed => &mut self.fixed,
            Section::Security => &mut self.security,
        }
    }

    pub fn section(&self, section: Section) -> &[String] {
        match section {
            Section::Added => &self.added,
            Section::Changed => &self.changed,
            Section::Deprecated => &self.deprecated,
            Section::Removed => &self.removed,
            Section::Fixed => &self.fixed,
            Section::Security => &self.security,
        }
    }

    pub fn is_empty(&self) -> bool {
        Section::ALL.iter().all(|s| self.section(*s).is_empty())
    }
}

fn default_section_for(kind: &str) -> Section {
    match kind {
        "feat" => Section::Added,
        "fix" => Section::Fixed,
        "security" => Section::Security,
        _ => Section::Changed,
    }
}

/// Map a commit kind to its section, honoring configured overrides.
fn section_for(kind: &str, overrides: &BTreeMap<String, String>) -> Section {
    overrides
        .get(kind)
        .and_then(|name| Section::from_name(name))
        .unwrap_or_else(|| default_section_for(kind))
}

/// Build structured notes from a commit set (oldest to newest).
pub fn build_release_notes(
    version: &semver::Version,
    date: NaiveDate,
    commits: &[ConventionalCommit],
    section_overrides: &BTreeMap<String, String>,
) -> ReleaseNotes {
    let mut notes = ReleaseNotes {
        version: version.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        ..Default::default()
    };
    for commit in commits {
        let section = section_for(&commit.kind, section_overrides);
        let entry = format!("{} ({})", commit.first_line(), commit.short_hash());
        notes.section_mut(section).push(entry);
    }
    notes
}

/// Render the `## [version]` fragment for one release.
/// Empty sections are omitted.
pub fn render_fragment(notes: &ReleaseNotes) -> String {
    let mut out = format!("## [{}] - {}\n", notes.version, notes.date);
    for section in Section::ALL {
        let entries = notes.section(section);
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("\n### {}\n\n", section.title()));
        for entry in entries {
            out.push_str(&format!("- {entry}\n"));
        }
    }
    out
}

/// Merge a rendered fragment into an existing changelog.
///
/// The header block is preserved and the fragment is inserted right after
/// it; previously recorded versions are untouched. Without a header, the
/// canonical preamble is written first. Merging a version that is already
/// recorded is a no-op.
pub fn merge_into(existing: &str, notes: &ReleaseNotes) -> String {
    if changelog_parser::contains_version(existing, &notes.version) {
        return existing.to_string();
    }
    let fragment = render_fragment(notes);
    match changelog_parser::parse_header(existing) {
        Some(header) => {
            let rest = existing[header.len()..].trim_start_matches('\n');
            let mut out = format!("{}\n\n{fragment}", header.trim_end_matches('\n'));
            if !rest.is_empty() {
                out.push('\n');
                out.push_str(rest);
            }
            out
        }
        None => {
            let tail = existing.trim_start_matches('\n');
            if tail.is_empty() {
                format!("{CHANGELOG_HEADER}\n{fragment}")
            } else {
                format!("{CHANGELOG_HEADER}\n{fragment}\n{tail}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{RawCommit, parse_commits};

    fn commits(messages: &[&str]) -> Vec<ConventionalCommit> {
        let raws: Vec<RawCommit> = messages
            .iter()
            .enumerate()
            .map(|(i, message)| RawCommit {
                hash: format!("{i:07}abcdef1234567890abcdef12345678"),
                date: "2024-05-01T10:00:00+00:00".to_string(),
                message: (*message).to_string(),
            })
            .collect();
        parse_commits(&raws)
    }

    fn notes(version: &str, messages: &[&str]) -> ReleaseNotes {
        build_release_notes(
            &semver::Version::parse(version).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            &commits(messages),
            &BTreeMap::new(),
        )
    }

    #[test]
    fn kinds_map_to_keep_a_changelog_sections() {
        let notes = notes(
            "1.3.0",
            &[
                "feat(api): add pagination",
                "fix: race in writer",
                "chore: tidy",
                "security: pin dependency",
                "not conventional at all",
            ],
        );
        assert_eq!(notes.added, vec!["feat(api): add pagination (0000000)"]);
        assert_eq!(notes.fixed, vec!["fix: race in writer (0000001)"]);
        assert_eq!(notes.security, vec!["security: pin dependency (0000003)"]);
        assert_eq!(
            notes.changed,
            vec!["chore: tidy (0000002)", "not conventional at all (0000004)"]
        );
    }

    #[test]
    fn section_overrides_are_honored() {
        let overrides = BTreeMap::from([("chore".to_string(), "removed".to_string())]);
        let notes = build_release_notes(
            &semver::Version::parse("1.0.1").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            &commits(&["chore: drop legacy flag"]),
            &overrides,
        );
        assert_eq!(notes.removed.len(), 1);
        assert!(notes.changed.is_empty());
    }

    #[test]
    fn fragment_omits_empty_sections() {
        let notes = notes("1.3.0", &["feat(api): add pagination", "chore: tidy"]);
        expect_test::expect![[r#"
            ## [1.3.0] - 2024-05-15

            ### Added

            - feat(api): add pagination (0000000)

            ### Changed

            - chore: tidy (0000001)
        "#]]
        .assert_eq(&render_fragment(&notes));
    }

    #[test]
    fn merge_preserves_header_and_previous_versions() {
        let existing = format!(
            "{CHANGELOG_HEADER}\n## [1.2.3] - 2024-01-01\n\n### Fixed\n\n- fix: old (aaaaaaa)\n"
        );
        let merged = merge_into(&existing, &notes("1.3.0", &["feat(api): add pagination"]));
        expect_test::expect![[r#"
            # Changelog

            All notable changes to this project will be documented in this file.

            The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.0.0/),
            and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).

            ## [Unreleased]

            ## [1.3.0] - 2024-05-15

            ### Added

            - feat(api): add pagination (0000000)

            ## [1.2.3] - 2024-01-01

            ### Fixed

            - fix: old (aaaaaaa)
        "#]]
        .assert_eq(&merged);
    }

    #[test]
    fn merge_without_header_writes_preamble() {
        let merged = merge_into("", &notes("0.1.0", &["feat: first"]));
        assert!(merged.starts_with("# Changelog"));
        assert!(merged.contains("## [Unreleased]"));
        assert!(merged.contains("## [0.1.0] - 2024-05-15"));
    }

    #[test]
    fn merge_keeps_headerless_existing_content() {
        let existing = "## [0.0.9] - 2023-01-01\n\n### Fixed\n\n- fix: ancient (bbbbbbb)\n";
        let merged = merge_into(existing, &notes("0.1.0", &["feat: first"]));
        assert!(merged.contains("## [0.1.0]"));
        assert!(merged.contains("## [0.0.9]"));
        let pos_new = merged.find("## [0.1.0]").unwrap();
        let pos_old = merged.find("## [0.0.9]").unwrap();
        assert!(pos_new < pos_old);
    }

    #[test]
    fn merging_same_version_twice_is_a_no_op() {
        let once = merge_into(CHANGELOG_HEADER, &notes("1.3.0", &["feat: x"]));
        let twice = merge_into(&once, &notes("1.3.0", &["feat: x"]));
        assert_eq!(once, twice);
    }
}
