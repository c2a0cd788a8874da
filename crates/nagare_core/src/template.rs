//! Sandboxed template evaluation.
//!
//! Templates are screened before they reach the engine: a size cap, a
//! deny-list of host-access tokens, and (under the strict level) an
//! allow-list of identifiers. The engine itself (tera) exposes no file,
//! process or network functions, so the screen is the outer of two fences.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::changelog::ReleaseNotes;
use crate::commit::SHORT_HASH_LEN;
use crate::config::ProjectConfig;
use crate::error::{Error, Result};

/// Restriction profile under which a template is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxLevel {
    /// Only the approved grammar: data fields, filters, control flow.
    #[default]
    Strict,
    /// Additionally allows the `Date`, `Math` and `JSON` identifiers.
    Moderate,
    /// No identifier screening. Only for built-in, shipped templates.
    Disabled,
}

impl std::fmt::Display for SandboxLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Tokens that refer to host facilities. A template containing any of
/// these is rejected outright, whatever the level (except `disabled`).
const FORBIDDEN_TOKENS: &[&str] = &[
    "Deno.",
    "process.",
    "child_process",
    "require(",
    "import(",
    "eval(",
    "Function(",
    "new Function",
    "fetch(",
    "XMLHttpRequest",
    "globalThis",
    "__proto__",
    "readFile",
    "writeFile",
    "readTextFile",
    "writeTextFile",
    "spawn(",
    "execSync",
    "exec(",
];

/// Identifier roots available to every template.
const APPROVED_IDENTIFIERS: &[&str] = &[
    // data fields
    "version",
    "previous_version",
    "version_components",
    "build_date",
    "commit_hash",
    "short_commit",
    "environment",
    "release_notes",
    "project",
    "metadata",
    // filters
    "jsonStringify",
    "escape",
    "safe",
    "upper",
    "lower",
    "date",
    // tera keywords and common kwargs
    "if",
    "else",
    "elif",
    "endif",
    "for",
    "endfor",
    "in",
    "set",
    "endset",
    "not",
    "and",
    "or",
    "is",
    "defined",
    "true",
    "false",
    "loop",
    "format",
];

const MODERATE_EXTRA_IDENTIFIERS: &[&str] = &["Date", "Math", "JSON"];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").expect("invalid regex"));

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").expect("invalid regex")
});

static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("invalid regex"));

static FOR_VARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in")
        .expect("invalid regex")
});

static SET_VARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*set\s+([A-Za-z_][A-Za-z0-9_]*)\s*=").expect("invalid regex")
});

/// Parsed semver parts, exposed to templates as `version_components`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionComponents {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl From<&semver::Version> for VersionComponents {
    fn from(version: &semver::Version) -> Self {
        Self {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            prerelease: (!version.pre.is_empty()).then(|| version.pre.to_string()),
            build: (!version.build.is_empty()).then(|| version.build.to_string()),
        }
    }
}

/// Everything a template can see.
///
/// Derived fields (`version_components`, `short_commit`, `build_date`) are
/// computed here, not supplied by callers.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData {
    pub version: String,
    pub previous_version: Option<String>,
    /// UTC, ISO-8601 with `T` separator.
    pub build_date: String,
    pub commit_hash: String,
    pub short_commit: String,
    pub environment: String,
    pub version_components: VersionComponents,
    pub release_notes: ReleaseNotes,
    pub project: ProjectConfig,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TemplateData {
    pub fn new(
        version: &semver::Version,
        previous_version: Option<&semver::Version>,
        commit_hash: &str,
        build_timestamp: DateTime<Utc>,
        project: ProjectConfig,
        release_notes: ReleaseNotes,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let short_commit = commit_hash[..commit_hash.len().min(SHORT_HASH_LEN)].to_string();
        Self {
            version: version.to_string(),
            previous_version: previous_version.map(|v| v.to_string()),
            build_date: build_timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            commit_hash: commit_hash.to_string(),
            short_commit,
            environment: std::env::consts::OS.to_string(),
            version_components: VersionComponents::from(version),
            release_notes,
            project,
            metadata,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateProcessor {
    level: SandboxLevel,
    max_bytes: usize,
}

impl TemplateProcessor {
    pub fn new(level: SandboxLevel, max_bytes: usize) -> Self {
        Self { level, max_bytes }
    }

    /// Validate and render a user-supplied template.
    pub fn render(&self, template: &str, data: &TemplateData) -> Result<String> {
        self.validate(template, self.level)?;
        render_unchecked(template, data)
    }

    /// Render one of the shipped templates. Shipped templates skip the
    /// identifier screen but still respect the size cap.
    pub fn render_builtin(&self, template: &str, data: &TemplateData) -> Result<String> {
        self.validate(template, SandboxLevel::Disabled)?;
        render_unchecked(template, data)
    }

    pub fn validate(&self, template: &str, level: SandboxLevel) -> Result<()> {
        if template.len() > self.max_bytes {
            return Err(Error::TemplateInvalid {
                reason: format!(
                    "template is {} bytes, larger than the {} byte limit",
                    template.len(),
                    self.max_bytes
                ),
            });
        }
        if level == SandboxLevel::Disabled {
            return Ok(());
        }
        for token in FORBIDDEN_TOKENS {
            if template.contains(token) {
                return Err(Error::TemplateSecurityViolation {
                    level: level.to_string(),
                    token: (*token).to_string(),
                });
            }
        }
        check_identifiers(template, level)
    }
}

fn check_identifiers(template: &str, level: SandboxLevel) -> Result<()> {
    let mut approved: HashSet<&str> = APPROVED_IDENTIFIERS.iter().copied().collect();
    if level == SandboxLevel::Moderate {
        approved.extend(MODERATE_EXTRA_IDENTIFIERS);
    }
    let mut local: HashSet<String> = HashSet::new();
    for caps in FOR_VARS_RE.captures_iter(template) {
        for group in [1, 2] {
            if let Some(name) = caps.get(group) {
                local.insert(name.as_str().to_string());
            }
        }
    }
    for caps in SET_VARS_RE.captures_iter(template) {
        if let Some(name) = caps.get(1) {
            local.insert(name.as_str().to_string());
        }
    }

    for tag in TAG_RE.captures_iter(template) {
        let content = tag
            .get(1)
            .or_else(|| tag.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let without_strings = STRING_LITERAL_RE.replace_all(content, " ");
        for path in IDENT_RE.find_all_roots(&without_strings) {
            if !approved.contains(path.as_str()) && !local.contains(&path) {
                return Err(Error::TemplateInvalid {
                    reason: format!("identifier {path:?} is outside the approved grammar"),
                });
            }
        }
    }
    Ok(())
}

trait FindRoots {
    fn find_all_roots(&self, haystack: &str) -> Vec<String>;
}

impl FindRoots for Regex {
    fn find_all_roots(&self, haystack: &str) -> Vec<String> {
        self.find_iter(haystack)
            .map(|m| {
                let path = m.as_str();
                path.split('.').next().unwrap_or(path).to_string()
            })
            .collect()
    }
}

fn render_unchecked(template: &str, data: &TemplateData) -> Result<String> {
    let mut tera = tera::Tera::default();
    tera.register_filter("jsonStringify", json_stringify_filter);
    tera.add_raw_template("template", template)
        .map_err(|e| Error::TemplateInvalid {
            reason: e.to_string(),
        })?;
    let context =
        tera::Context::from_serialize(data).map_err(|e| Error::TemplateProcessingFailed {
            reason: e.to_string(),
        })?;
    tera.render("template", &context)
        .map_err(|e| Error::TemplateProcessingFailed {
            reason: render_error_chain(&e),
        })
}

fn render_error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn json_stringify_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| tera::Error::msg(format!("jsonStringify failed: {e}")))?;
    Ok(tera::Value::String(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;

    fn data() -> TemplateData {
        TemplateData::new(
            &semver::Version::parse("1.3.0").unwrap(),
            Some(&semver::Version::parse("1.2.3").unwrap()),
            "abcdef1234567890",
            Utc.with_ymd_and_hms(2024, 5, 15, 12, 30, 0).unwrap(),
            ProjectConfig {
                name: "demo".to_string(),
                repository: "https://github.com/acme/demo".to_string(),
                description: None,
                homepage: None,
            },
            ReleaseNotes::default(),
            BTreeMap::from([("channel".to_string(), serde_json::json!("stable"))]),
        )
    }

    fn processor() -> TemplateProcessor {
        TemplateProcessor::new(SandboxLevel::Strict, 1024 * 1024)
    }

    #[test]
    fn derived_fields_are_computed() {
        let data = data();
        assert_eq!(data.short_commit, "abcdef1");
        assert_eq!(data.build_date, "2024-05-15T12:30:00Z");
        assert_eq!(data.version_components.major, 1);
        assert_eq!(data.version_components.minor, 3);
        assert_eq!(data.version_components.prerelease, None);
    }

    #[test]
    fn variables_and_filters_render() {
        let out = processor()
            .render("{{ project.name }} v{{ version }} ({{ short_commit | upper }})", &data())
            .unwrap();
        assert_eq!(out, "demo v1.3.0 (ABCDEF1)");
    }

    #[test]
    fn conditionals_render() {
        let out = processor()
            .render(
                "{% if previous_version %}from {{ previous_version }}{% endif %}",
                &data(),
            )
            .unwrap();
        assert_eq!(out, "from 1.2.3");
    }

    #[test]
    fn json_stringify_filter_works() {
        let out = processor()
            .render("{{ metadata | jsonStringify }}", &data())
            .unwrap();
        assert!(out.contains("\"channel\": \"stable\""));
    }

    #[test]
    fn forbidden_tokens_are_rejected() {
        for template in [
            "{{ version }} Deno.readTextFile('x')",
            "{% if process.env %}x{% endif %}",
            "require('fs')",
            "{{ eval('1') }}",
        ] {
            let err = processor().render(template, &data()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::TemplateSecurityViolation, "{template:?}");
        }
    }

    #[test]
    fn unknown_identifier_is_outside_the_grammar() {
        let err = processor().render("{{ secrets }}", &data()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemplateInvalid);
    }

    #[test]
    fn moderate_level_allows_json_identifier() {
        let strict = processor();
        let template = "{% if JSON %}x{% endif %}";
        assert!(strict.render(template, &data()).is_err());
        let moderate = TemplateProcessor::new(SandboxLevel::Moderate, 1024);
        assert!(moderate.validate(template, SandboxLevel::Moderate).is_ok());
    }

    #[test]
    fn oversized_template_is_rejected() {
        let small = TemplateProcessor::new(SandboxLevel::Strict, 16);
        let err = small.render("{{ version }} padding padding", &data()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemplateInvalid);
    }

    #[test]
    fn loop_variables_are_in_scope() {
        let template = "{% for entry in release_notes.added %}{{ entry }}\n{% endfor %}";
        assert!(processor().validate(template, SandboxLevel::Strict).is_ok());
    }
}
