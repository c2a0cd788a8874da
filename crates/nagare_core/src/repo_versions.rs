//! Reading release versions from git tags.
//!
//! Tags are the source of truth for the current version: the version file
//! may be stale if a previous release failed after generation.

use git_cmd::Repo;
use regex::Regex;
use semver::Version;

use crate::error::Result;

/// Newest tag matching `<prefix><semver>`, together with its parsed
/// version. `None` when the repository has no release tag yet.
pub fn current_tag_version(repo: &Repo, prefix: &str) -> Result<Option<(String, Version)>> {
    let pattern = format!(r"^{}\d+\.\d+\.\d+", regex::escape(prefix));
    let regex = Regex::new(&pattern).map_err(anyhow::Error::from)?;
    for tag in repo.tags_by_recency()? {
        if !regex.is_match(&tag) {
            continue;
        }
        let bare = &tag[prefix.len()..];
        if let Ok(version) = Version::parse(bare) {
            return Ok(Some((tag, version)));
        }
    }
    Ok(None)
}

/// Tag name for a version under the configured prefix.
pub fn tag_for(prefix: &str, version: &Version) -> String {
    format!("{prefix}{version}")
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;

    #[test]
    fn newest_matching_tag_wins_and_prefix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let repo = Repo::init(root);
        repo.git(&["tag", "-a", "v0.1.0", "-m", "v0.1.0"]).unwrap();
        repo.commit_empty("feat: more");
        repo.git(&["tag", "-a", "v0.2.0", "-m", "v0.2.0"]).unwrap();
        repo.commit_empty("chore: noise tag target");
        // non-release tags are skipped
        repo.git(&["tag", "deploy-marker"]).unwrap();

        let (tag, version) = current_tag_version(&repo, "v").unwrap().unwrap();
        assert_eq!(tag, "v0.2.0");
        assert_eq!(version, Version::new(0, 2, 0));
    }

    #[test]
    fn no_release_tag_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let repo = Repo::init(root);
        assert_eq!(current_tag_version(&repo, "v").unwrap(), None);
    }

    #[test]
    fn tag_name_is_prefix_plus_version() {
        assert_eq!(tag_for("v", &Version::new(1, 2, 3)), "v1.2.3");
    }
}
