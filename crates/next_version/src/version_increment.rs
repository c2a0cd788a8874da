use git_conventional::{Commit, Type};
use semver::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionIncrement {
    Major,
    Minor,
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NextVersionError {
    /// The commit set contains a breaking change, so only a major bump
    /// (or the semver 0.x minor demotion) is semantically correct.
    #[error("the commits since the last release contain a breaking change: a non-major bump is not allowed")]
    BreakingRequiresMajor,
}

impl VersionIncrement {
    /// Analyze commits and determine which part of the version to increment.
    ///
    /// - If no commits are present, [`Option::None`] is returned, because the
    ///   version should not be incremented.
    /// - Any breaking commit selects a major bump, demoted to minor while
    ///   `current_version.major == 0`.
    /// - Any `feat` commit selects a minor bump.
    /// - Everything else (including commits that don't follow the
    ///   conventional grammar) selects a patch bump.
    pub fn from_commits<I>(current_version: &Version, commits: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut commits = commits.into_iter().peekable();
        commits.peek()?;

        let commits: Vec<String> = commits.map(|c| c.as_ref().to_string()).collect();
        let parsed: Vec<Commit<'_>> = commits
            .iter()
            .filter_map(|c| Commit::parse(c.as_ref()).ok())
            .collect();

        let has_breaking = parsed.iter().any(Commit::breaking);
        let has_feature = parsed.iter().any(|c| c.type_() == Type::FEAT);

        let increment = if has_breaking {
            if current_version.major == 0 {
                Self::Minor
            } else {
                Self::Major
            }
        } else if has_feature {
            Self::Minor
        } else {
            Self::Patch
        };
        Some(increment)
    }

    /// True if any commit is a breaking change (`!` marker or
    /// `BREAKING CHANGE:` footer).
    pub fn has_breaking<I>(commits: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        commits
            .into_iter()
            .filter_map(|c| Commit::parse(c.as_ref()).ok().map(|c| c.breaking()))
            .any(|breaking| breaking)
    }

    /// Check a user-requested bump against the commit set.
    ///
    /// A commit set containing a breaking change requires the requested bump
    /// to be major. Under major version 0 the request is demoted to minor
    /// instead, mirroring the automatic decision. An explicit major request
    /// is always honored: it is the only way to leave 0.x.
    pub fn validate_forced<I>(
        current_version: &Version,
        requested: Self,
        commits: I,
    ) -> Result<Self, NextVersionError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if requested == Self::Major {
            return Ok(Self::Major);
        }
        if Self::has_breaking(commits) {
            if current_version.major == 0 {
                return Ok(Self::Minor);
            }
            return Err(NextVersionError::BreakingRequiresMajor);
        }
        Ok(requested)
    }

    /// Whether the automatic decision for this commit set was demoted from
    /// major to minor by the semver 0.x rule.
    pub fn is_zero_major_demotion<I>(current_version: &Version, commits: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        current_version.major == 0 && Self::has_breaking(commits)
    }

    /// Apply the increment. Pre-release and build metadata never carry
    /// over into the bumped version.
    pub fn bump(&self, version: &Version) -> Version {
        let (major, minor, patch) = match self {
            Self::Major => (version.major + 1, 0, 0),
            Self::Minor => (version.major, version.minor + 1, 0),
            Self::Patch => (version.major, version.minor, version.patch + 1),
        };
        Version::new(major, minor, patch)
    }
}

impl std::fmt::Display for VersionIncrement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        };
        f.write_str(name)
    }
}
