//! Next semantic version from conventional-commit history.
//!
//! The decision rules follow the
//! [conventional commits](https://www.conventionalcommits.org/) and
//! [semantic versioning](https://semver.org/) specifications, including the
//! semver 0.x rule: while the major version is 0, a breaking change
//! advances the minor version instead of the major one.

mod version_increment;

pub use version_increment::{NextVersionError, VersionIncrement};
