//! Generation of the project version file.
//!
//! The three shipped formats cover the common cases; `custom` hands the
//! user template to the processor under the configured sandbox level.
//! Shipped templates are evaluated with the identifier screen disabled.

use crate::config::{VersionFileConfig, VersionFileFormat};
use crate::error::{Error, Result};
use crate::template::{TemplateData, TemplateProcessor};

const TYPESCRIPT_TEMPLATE: &str = r#"// This file is generated on release. Do not edit by hand.

export const VERSION = "{{ version }}";

export const BUILD_INFO = {
  buildDate: "{{ build_date }}",
  gitCommit: "{{ short_commit }}",
  environment: "{{ environment }}",
} as const;

export const APP_INFO = {
  name: "{{ project.name }}",
  repository: "{{ project.repository }}",
} as const;

export const RELEASE_NOTES = {{ release_notes | jsonStringify }} as const;
"#;

const JSON_TEMPLATE: &str = r#"{
  "version": "{{ version }}",
  "buildDate": "{{ build_date }}",
  "gitCommit": "{{ short_commit }}",
  "environment": "{{ environment }}"
}
"#;

const YAML_TEMPLATE: &str = r#"version: "{{ version }}"
buildDate: "{{ build_date }}"
gitCommit: "{{ short_commit }}"
environment: "{{ environment }}"
"#;

/// Render the configured version file's new content.
pub fn render_version_file(
    config: &VersionFileConfig,
    processor: &TemplateProcessor,
    data: &TemplateData,
) -> Result<String> {
    match config.format {
        VersionFileFormat::Typescript => processor.render_builtin(TYPESCRIPT_TEMPLATE, data),
        VersionFileFormat::Json => processor.render_builtin(JSON_TEMPLATE, data),
        VersionFileFormat::Yaml => processor.render_builtin(YAML_TEMPLATE, data),
        VersionFileFormat::Custom => {
            let template =
                config
                    .template
                    .as_deref()
                    .ok_or(Error::ConfigMissingRequired {
                        field: "version_file.template",
                    })?;
            processor.render(template, data)
        }
    }
}

/// Extract the version recorded in an existing version file, if any.
///
/// Used to detect drift between the version file and the latest tag.
/// The check is format-aware but lenient: an unreadable or unparseable
/// file simply yields `None`.
pub fn read_version_from(content: &str, format: VersionFileFormat) -> Option<semver::Version> {
    let raw = match format {
        VersionFileFormat::Typescript | VersionFileFormat::Custom => content.lines().find_map(
            |line| {
                let rest = line.trim().strip_prefix("export const VERSION")?;
                let start = rest.find('"')? + 1;
                let end = start + rest[start..].find('"')?;
                Some(rest[start..end].to_string())
            },
        ),
        VersionFileFormat::Json => serde_json::from_str::<serde_json::Value>(content)
            .ok()?
            .get("version")?
            .as_str()
            .map(str::to_string),
        VersionFileFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
            .ok()?
            .get("version")?
            .as_str()
            .map(str::to_string),
    };
    raw.and_then(|raw| semver::Version::parse(&raw).ok())
}
