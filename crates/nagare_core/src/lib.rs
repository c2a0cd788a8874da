//! Release automation driven by conventional commits.
//!
//! The pipeline reads git history, derives the next semantic version,
//! rewrites a configurable set of files (version manifest, changelog,
//! badges), commits and tags the result, and optionally publishes a
//! remote release. Every side-effect is recorded so a failure can be
//! unwound.
//!
//! The CLI in the `nagare` crate is a thin layer over this one; library
//! embedders build a [`ReleaseRequest`] directly.

pub mod backup;
pub mod changelog;
pub mod changelog_parser;
mod command;
pub mod commit;
pub mod config;
pub mod error;
pub mod file_handler;
pub mod forge;
pub mod fs_utils;
pub mod release_state;
pub mod repo_versions;
pub mod security;
pub mod template;
pub mod version_file;

pub use command::release::{
    CheckResult, PreflightReport, RELEASE_COMMIT_PREFIX, ReleaseOutcome, ReleaseRequest, Stage,
    release,
};
pub use command::retry::{RetryOutcome, RetryRequest, retry};
pub use command::rollback::{RollbackOutcome, RollbackRequest, rollback};
pub use command::{CancelToken, ToolOutput};
pub use config::{Config, parse_config};
pub use error::{Error, ErrorCode, Result};
pub use next_version::VersionIncrement;
