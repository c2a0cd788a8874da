//! Built-in handlers, in registration order.

use super::{Detector, FileHandler, StructuralFormat, VersionPattern};

fn pattern(name: &str, regex: &str) -> VersionPattern {
    VersionPattern::new(name, regex).expect("built-in pattern must compile")
}

pub fn builtin_handlers() -> Vec<FileHandler> {
    vec![
        FileHandler {
            id: "json-manifest",
            name: "JSON manifests",
            detector: Detector::Names(&[
                "package.json",
                "deno.json",
                "deno.jsonc",
                "jsr.json",
                "manifest.json",
            ]),
            patterns: vec![pattern(
                "version-key",
                r#"^(\s*)"version":\s*"(?P<version>[^"]+)""#,
            )],
            validator: Some(StructuralFormat::Json),
        },
        FileHandler {
            id: "yaml",
            name: "YAML documents",
            detector: Detector::Extensions(&["yaml", "yml"]),
            patterns: vec![pattern(
                "version-key",
                r#"^(?P<prefix>\s*version:\s*)(?P<quote>['"]?)(?P<version>[^'"\n]+)(?P<close>['"]?)$"#,
            )],
            validator: Some(StructuralFormat::Yaml),
        },
        FileHandler {
            id: "markdown-badge",
            name: "Markdown version badges",
            detector: Detector::Extensions(&["md", "markdown"]),
            patterns: vec![pattern(
                "shields-badge",
                r"(img\.shields\.io/badge/version-)(?P<version>\d+\.\d+\.\d+)",
            )],
            validator: None,
        },
        FileHandler {
            id: "toml-manifest",
            name: "Cargo and Python manifests",
            detector: Detector::Names(&["Cargo.toml", "pyproject.toml"]),
            patterns: vec![pattern(
                "version-key",
                r#"^(\s*)version\s*=\s*"(?P<version>[^"]+)""#,
            )],
            validator: Some(StructuralFormat::Toml),
        },
        FileHandler {
            id: "typescript-version",
            name: "TypeScript version files",
            detector: Detector::Stems(&["version", "constants"]),
            patterns: vec![pattern(
                "version-const",
                r#"export\s+const\s+VERSION\s*=\s*"(?P<version>[^"]+)""#,
            )],
            validator: None,
        },
        FileHandler {
            id: "html-meta",
            name: "HTML meta version tags",
            detector: Detector::Extensions(&["html", "htm"]),
            patterns: vec![pattern(
                "meta-version",
                r#"<meta\s+name="version"\s+content="(?P<version>[^"]+)""#,
            )],
            validator: None,
        },
    ]
}
