//! Pattern-driven file rewriting.
//!
//! A handler pairs a path detector with pre-validated, line-anchored
//! regexes. Substitution is capture-preserving: only the version token is
//! replaced, everything else in the matched line stays byte-identical.
//! Structured formats are re-parsed after the update.

mod builtins;
pub mod safety;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use regex::{Regex, RegexBuilder};

pub use builtins::builtin_handlers;

use crate::error::{Error, Result};
use crate::fs_utils;
use crate::template::TemplateData;

/// How many times a pattern may match in one file.
pub const DEFAULT_MAX_OCCURRENCES: usize = 1;

/// Programmatic replacement for library embedders: old content in, new
/// content out.
pub type UpdateFn = Arc<dyn Fn(&str, &TemplateData) -> Result<String> + Send + Sync>;

/// One file to rewrite during a release.
///
/// At least one of the following must hold: a built-in handler matches
/// `path`, `patterns` is non-empty, or `update_fn` is present.
#[derive(Clone)]
pub struct FileUpdateSpec {
    pub path: Utf8PathBuf,
    pub patterns: Vec<VersionPattern>,
    pub update_fn: Option<UpdateFn>,
}

impl std::fmt::Debug for FileUpdateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpdateSpec")
            .field("path", &self.path)
            .field("patterns", &self.patterns)
            .field("update_fn", &self.update_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl FileUpdateSpec {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            patterns: vec![],
            update_fn: None,
        }
    }

    pub fn with_pattern(mut self, pattern: VersionPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_update_fn(mut self, update_fn: UpdateFn) -> Self {
        self.update_fn = Some(update_fn);
        self
    }
}

/// Where the version token lives inside a pattern.
///
/// Resolution order: a capture group named `version`; the only group of a
/// single-group pattern; group 2 otherwise (the shape of the built-in
/// JSON pattern and of migrated patterns, where group 1 is indentation).
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionGroup {
    Named,
    Index(usize),
}

#[derive(Debug, Clone)]
pub struct VersionPattern {
    pub name: String,
    regex: Regex,
    version_group: VersionGroup,
}

impl VersionPattern {
    /// Compile a pattern. Multiline mode is always on: the built-in
    /// patterns anchor on line starts.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .map_err(|e| Error::ConfigInvalid {
                reason: format!("invalid pattern {pattern:?}: {e}"),
            })?;
        let version_group = if regex.capture_names().flatten().any(|n| n == "version") {
            VersionGroup::Named
        } else if regex.captures_len() == 2 {
            VersionGroup::Index(1)
        } else {
            VersionGroup::Index(2)
        };
        Ok(Self {
            name: name.into(),
            regex,
            version_group,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    fn occurrences(&self, content: &str) -> usize {
        self.regex.find_iter(content).count()
    }

    /// Replace the version token of the single match, leaving the rest of
    /// the match untouched.
    fn apply(
        &self,
        content: &str,
        replacement: &str,
        path: &Utf8Path,
        max_occurrences: usize,
    ) -> Result<(String, PreviewChange)> {
        let occurrences = self.occurrences(content);
        if occurrences == 0 {
            return Err(Error::FilePatternNoMatch {
                path: path.to_path_buf(),
                pattern: self.regex.as_str().to_string(),
            });
        }
        if occurrences > max_occurrences {
            return Err(Error::FilePatternDangerous {
                pattern: self.regex.as_str().to_string(),
                reason: format!(
                    "matches {occurrences} times in {path}, at most {max_occurrences} allowed"
                ),
            });
        }
        let captures = self
            .regex
            .captures(content)
            .expect("occurrence count was checked");
        let group = match &self.version_group {
            VersionGroup::Named => captures.name("version"),
            VersionGroup::Index(i) => captures.get(*i),
        }
        .ok_or_else(|| Error::FileUpdateFailed {
            path: path.to_path_buf(),
            reason: format!("pattern {:?} has no version capture group", self.regex.as_str()),
        })?;

        let line = content[..group.start()].matches('\n').count() + 1;
        let before_line = line_containing(content, group.start()).to_string();
        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..group.start()]);
        updated.push_str(replacement);
        updated.push_str(&content[group.end()..]);
        let after_line = line_containing(&updated, group.start()).to_string();

        let preview = PreviewChange {
            line,
            before: before_line,
            after: after_line,
        };
        Ok((updated, preview))
    }
}

fn line_containing(content: &str, offset: usize) -> &str {
    let start = content[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = content[offset..]
        .find('\n')
        .map_or(content.len(), |i| offset + i);
    &content[start..end]
}

/// Structured formats that are re-parsed after substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralFormat {
    Json,
    Yaml,
    Toml,
}

impl StructuralFormat {
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension() {
            Some("json" | "jsonc") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("toml") => Some(Self::Toml),
            _ => None,
        }
    }

    pub fn validate(self, content: &str, path: &Utf8Path) -> Result<()> {
        match self {
            Self::Json => serde_json::from_str::<serde_json::Value>(content).map(|_| ()).map_err(
                |e| Error::FileJsonInvalid {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
            ),
            Self::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
                .map(|_| ())
                .map_err(|e| Error::FileUpdateFailed {
                    path: path.to_path_buf(),
                    reason: format!("result is no longer valid YAML: {e}"),
                }),
            Self::Toml => toml::from_str::<toml::Value>(content).map(|_| ()).map_err(|e| {
                Error::FileUpdateFailed {
                    path: path.to_path_buf(),
                    reason: format!("result is no longer valid TOML: {e}"),
                }
            }),
        }
    }
}

/// How a file is matched by a handler.
#[derive(Debug, Clone)]
pub enum Detector {
    /// Exact file names (`package.json`).
    Names(&'static [&'static str]),
    /// File extensions without the dot (`yaml`).
    Extensions(&'static [&'static str]),
    /// File stems (`version` matches `version.ts`, `version.py`, ...).
    Stems(&'static [&'static str]),
    Custom(fn(&Utf8Path) -> bool),
}

impl Detector {
    pub fn matches(&self, path: &Utf8Path) -> bool {
        match self {
            Self::Names(names) => path
                .file_name()
                .is_some_and(|name| names.contains(&name)),
            Self::Extensions(extensions) => path
                .extension()
                .is_some_and(|ext| extensions.contains(&ext)),
            Self::Stems(stems) => path.file_stem().is_some_and(|stem| stems.contains(&stem)),
            Self::Custom(f) => f(path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileHandler {
    pub id: &'static str,
    pub name: &'static str,
    pub detector: Detector,
    pub patterns: Vec<VersionPattern>,
    pub validator: Option<StructuralFormat>,
}

impl FileHandler {
    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.detector.matches(path)
    }
}

/// One changed line: (1-based line number, before, after).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PreviewChange {
    pub line: usize,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileUpdate {
    pub path: Utf8PathBuf,
    pub changed: bool,
    pub preview: Vec<PreviewChange>,
    #[serde(skip)]
    pub new_content: String,
}

/// Ordered collection of handlers. `find` returns the first handler whose
/// detector accepts the path, in registration order; custom handlers are
/// appended after the built-ins.
#[derive(Debug, Clone)]
pub struct FileHandlerRegistry {
    handlers: Vec<FileHandler>,
    max_occurrences: usize,
}

impl Default for FileHandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FileHandlerRegistry {
    pub fn with_builtins() -> Self {
        Self {
            handlers: builtin_handlers(),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }

    pub fn register(&mut self, handler: FileHandler) {
        self.handlers.push(handler);
    }

    pub fn with_max_occurrences(mut self, max_occurrences: usize) -> Self {
        self.max_occurrences = max_occurrences.max(1);
        self
    }

    pub fn find(&self, path: &Utf8Path) -> Option<&FileHandler> {
        self.handlers.iter().find(|handler| handler.matches(path))
    }

    fn resolve<'a>(
        &'a self,
        spec: &'a FileUpdateSpec,
    ) -> Result<(&'a [VersionPattern], Option<StructuralFormat>)> {
        if !spec.patterns.is_empty() {
            return Ok((&spec.patterns, StructuralFormat::from_path(&spec.path)));
        }
        match self.find(&spec.path) {
            Some(handler) => Ok((&handler.patterns, handler.validator)),
            None => Err(Error::FileHandlerNotFound {
                path: spec.path.clone(),
            }),
        }
    }

    /// Apply a spec to in-memory content. Never touches disk.
    pub fn preview(
        &self,
        spec: &FileUpdateSpec,
        content: &str,
        data: &TemplateData,
    ) -> Result<FileUpdate> {
        let (updated, preview, validator) = if let Some(update_fn) = &spec.update_fn {
            let updated = update_fn(content, data)?;
            (updated, vec![], StructuralFormat::from_path(&spec.path))
        } else {
            let (patterns, validator) = self.resolve(spec)?;
            let mut current = content.to_string();
            let mut previews = vec![];
            for pattern in patterns {
                let (next, change) =
                    pattern.apply(&current, &data.version, &spec.path, self.max_occurrences)?;
                if change.before != change.after {
                    previews.push(change);
                }
                current = next;
            }
            (current, previews, validator)
        };
        if let Some(format) = validator {
            format.validate(&updated, &spec.path)?;
        }
        Ok(FileUpdate {
            path: spec.path.clone(),
            changed: updated != content,
            preview,
            new_content: updated,
        })
    }

    /// Read the file, apply the spec, and write the result atomically.
    /// `absolute_path` must already be validated against the project root.
    pub fn update(
        &self,
        spec: &FileUpdateSpec,
        absolute_path: &Utf8Path,
        data: &TemplateData,
    ) -> Result<FileUpdate> {
        if !absolute_path.exists() {
            return Err(Error::FileNotFound {
                path: spec.path.clone(),
            });
        }
        let content = fs_utils::read_to_string(absolute_path)?;
        let update = self.preview(spec, &content, data)?;
        if update.changed {
            fs_utils::atomic_write(absolute_path, &update.new_content)?;
        }
        Ok(update)
    }
}
