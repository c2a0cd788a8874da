//! Strongly-typed configuration record.
//!
//! The file is declarative: one schema, deserialized from TOML, JSON or
//! YAML depending on the file extension. Unknown fields are rejected
//! everywhere except the free-form `metadata` table. Programmatic update
//! functions are attached through [`crate::command::release::ReleaseRequest`],
//! not through the file.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::file_handler::safety::{self, PatternMode};
use crate::template::SandboxLevel;

/// Base names probed, in order, when no `--config` path is given.
/// Each is tried with the `.toml`, `.json`, `.yaml` and `.yml` extensions.
pub const CONFIG_BASENAMES: &[&str] = &["release.config", "nagare.config", ".nagarerc"];
pub const CONFIG_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub project: ProjectConfig,
    pub version_file: VersionFileConfig,
    #[serde(default)]
    pub release: ReleaseSection,
    #[serde(default)]
    pub changelog: ChangelogSection,
    #[serde(default)]
    pub template: TemplateSection,
    /// Extra files rewritten during a release, in order.
    #[serde(default)]
    pub update_files: Vec<FileUpdateSpecConfig>,
    #[serde(default)]
    pub forge: ForgeSection,
    /// Free-form project metadata, exposed to templates as `metadata`.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    /// Repository URL, e.g. `https://github.com/owner/repo`.
    pub repository: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VersionFileFormat {
    Typescript,
    Json,
    Yaml,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VersionFileConfig {
    pub path: Utf8PathBuf,
    pub format: VersionFileFormat,
    /// Mandatory when `format = "custom"`.
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseSection {
    /// Prefix of release tags, stripped when reading versions back.
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Whether to push branch and tag during PUBLISH.
    #[serde(default = "default_true")]
    pub push: bool,
    /// User-configured pre-flight checks (formatter, linter, tests, ...).
    #[serde(default)]
    pub checks: Vec<PreflightCheckConfig>,
    #[serde(default)]
    pub pre_release_hooks: Vec<HookConfig>,
    #[serde(default)]
    pub post_release_hooks: Vec<HookConfig>,
    /// Timeout for each spawned subprocess.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Larger budget for push and remote release creation.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    /// Reject dangerous file patterns instead of migrating them.
    #[serde(default)]
    pub strict_patterns: bool,
    /// Allow releasing when the version file and the latest tag disagree;
    /// the tag wins.
    #[serde(default)]
    pub sync_on_mismatch: bool,
}

impl Default for ReleaseSection {
    fn default() -> Self {
        Self {
            tag_prefix: default_tag_prefix(),
            remote: default_remote(),
            push: true,
            checks: vec![],
            pre_release_hooks: vec![],
            post_release_hooks: vec![],
            command_timeout_secs: default_command_timeout(),
            publish_timeout_secs: default_publish_timeout(),
            strict_patterns: false,
            sync_on_mismatch: false,
        }
    }
}

/// A command invoked during pre-flight. `fix_command`, when present, makes
/// the check auto-repairable: it runs once and the check is retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PreflightCheckConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub fix_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    pub name: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChangelogSection {
    #[serde(default = "default_changelog_path")]
    pub path: Utf8PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides of the commit-kind → changelog-section mapping.
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

impl Default for ChangelogSection {
    fn default() -> Self {
        Self {
            path: default_changelog_path(),
            enabled: true,
            sections: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TemplateSection {
    #[serde(default)]
    pub sandbox: SandboxLevel,
    #[serde(default = "default_max_template_bytes")]
    pub max_bytes: usize,
}

impl Default for TemplateSection {
    fn default() -> Self {
        Self {
            sandbox: SandboxLevel::default(),
            max_bytes: default_max_template_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileUpdateSpecConfig {
    pub path: Utf8PathBuf,
    /// Named regexes; when empty, a built-in handler must match the path.
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ForgeSection {
    /// Create a release entry on the forge after pushing.
    #[serde(default)]
    pub enabled: bool,
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    60
}

fn default_publish_timeout() -> u64 {
    300
}

fn default_changelog_path() -> Utf8PathBuf {
    Utf8PathBuf::from("CHANGELOG.md")
}

fn default_max_template_bytes() -> usize {
    1024 * 1024
}

impl Config {
    /// Validate the whole record, collecting every violation.
    ///
    /// Dangerous update-file patterns are migrated to their safe equivalent
    /// (with a returned warning) unless `release.strict_patterns` is set, in
    /// which case they are errors.
    pub fn validate(&mut self) -> std::result::Result<Vec<String>, Vec<Error>> {
        let mut errors = vec![];
        let mut warnings = vec![];

        if self.project.name.trim().is_empty() {
            errors.push(Error::ConfigMissingRequired {
                field: "project.name",
            });
        }
        if self.project.repository.trim().is_empty() {
            errors.push(Error::ConfigMissingRequired {
                field: "project.repository",
            });
        }
        if self.version_file.path.as_str().trim().is_empty() {
            errors.push(Error::ConfigMissingRequired {
                field: "version_file.path",
            });
        }
        if self.version_file.format == VersionFileFormat::Custom
            && self.version_file.template.is_none()
        {
            errors.push(Error::ConfigMissingRequired {
                field: "version_file.template",
            });
        }
        if self.release.tag_prefix.len() > 16
            || !self
                .release
                .tag_prefix
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '-')
        {
            errors.push(Error::ConfigInvalid {
                reason: format!(
                    "release.tag_prefix {:?} must be a short alphabetic prefix",
                    self.release.tag_prefix
                ),
            });
        }
        for check in &self.release.checks {
            if check.command.is_empty() {
                errors.push(Error::ConfigInvalid {
                    reason: format!("check `{}` has an empty command", check.name),
                });
            }
        }
        for hook in self
            .release
            .pre_release_hooks
            .iter()
            .chain(&self.release.post_release_hooks)
        {
            if hook.command.is_empty() {
                errors.push(Error::ConfigInvalid {
                    reason: format!("hook `{}` has an empty command", hook.name),
                });
            }
        }

        let mode = if self.release.strict_patterns {
            PatternMode::Strict
        } else {
            PatternMode::Migrate
        };
        for spec in &mut self.update_files {
            for (name, pattern) in &mut spec.patterns {
                match safety::check_pattern(pattern, &spec.path, mode) {
                    Ok(Some(migrated)) => {
                        warnings.push(format!(
                            "pattern `{name}` for {} is not line-anchored; migrated to {migrated:?}",
                            spec.path
                        ));
                        *pattern = migrated;
                    }
                    Ok(None) => {}
                    Err(e) => errors.push(e),
                }
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Parse a configuration file's contents based on its extension.
pub fn parse_config(contents: &str, extension: &str) -> Result<Config> {
    let config = match extension {
        "toml" => toml::from_str(contents).map_err(|e| Error::ConfigInvalid {
            reason: e.to_string(),
        })?,
        "json" => serde_json::from_str(contents).map_err(|e| Error::ConfigInvalid {
            reason: e.to_string(),
        })?,
        "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| Error::ConfigInvalid {
            reason: e.to_string(),
        })?,
        other => {
            return Err(Error::ConfigInvalid {
                reason: format!("unsupported config extension {other:?}"),
            });
        }
    };
    Ok(config)
}
