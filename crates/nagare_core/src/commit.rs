//! Conventional-commit records.
//!
//! The parser is total: a commit whose first line doesn't follow the
//! `<type>(<scope>)?!?: <description>` grammar becomes a record with
//! `kind = "other"` and the first line as description. Nothing is ever
//! discarded.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

pub use git_cmd::RawCommit;

/// Kind assigned to commits outside the conventional grammar.
pub const OTHER_KIND: &str = "other";

pub const SHORT_HASH_LEN: usize = 7;

/// The grammar gate: lowercase type, optional non-empty scope, optional
/// bang, colon, space.
static CONVENTIONAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+(\([^()\s][^()]*\))?!?: \S").expect("invalid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConventionalCommit {
    pub kind: String,
    pub scope: Option<String>,
    pub description: String,
    pub body: Option<String>,
    pub breaking: bool,
    pub hash: String,
    pub date: DateTime<Utc>,
    /// Full original commit message.
    pub raw: String,
}

impl ConventionalCommit {
    pub fn short_hash(&self) -> &str {
        let end = self.hash.len().min(SHORT_HASH_LEN);
        &self.hash[..end]
    }

    pub fn first_line(&self) -> &str {
        self.raw.lines().next().unwrap_or_default()
    }
}

/// Parse one raw commit. Never fails.
pub fn parse_commit(raw: &RawCommit) -> ConventionalCommit {
    let date = DateTime::parse_from_rfc3339(&raw.date)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH);
    let first_line = raw.first_line().to_string();

    let conventional = CONVENTIONAL_RE
        .is_match(&first_line)
        .then(|| git_conventional::Commit::parse(&raw.message).ok())
        .flatten();

    match conventional {
        Some(commit) => ConventionalCommit {
            kind: commit.type_().as_str().to_lowercase(),
            scope: commit
                .scope()
                .map(|s| s.as_str().to_string())
                .filter(|s| !s.is_empty()),
            description: commit.description().to_string(),
            body: commit.body().map(str::to_string),
            breaking: commit.breaking(),
            hash: raw.hash.clone(),
            date,
            raw: raw.message.clone(),
        },
        None => {
            let body = raw
                .message
                .split_once('\n')
                .map(|(_, rest)| rest.trim().to_string())
                .filter(|rest| !rest.is_empty());
            ConventionalCommit {
                kind: OTHER_KIND.to_string(),
                scope: None,
                description: first_line,
                body,
                breaking: false,
                hash: raw.hash.clone(),
                date,
                raw: raw.message.clone(),
            }
        }
    }
}

/// Parse a commit set, preserving order (oldest to newest).
pub fn parse_commits(raws: &[RawCommit]) -> Vec<ConventionalCommit> {
    raws.iter().map(parse_commit).collect()
}
