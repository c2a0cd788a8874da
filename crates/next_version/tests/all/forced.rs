use next_version::{NextVersionError, VersionIncrement};
use semver::Version;

#[test]
fn forced_minor_with_breaking_commit_is_rejected() {
    let version = Version::new(2, 0, 0);
    let result =
        VersionIncrement::validate_forced(&version, VersionIncrement::Minor, ["feat!: X"]);
    assert_eq!(result, Err(NextVersionError::BreakingRequiresMajor));
}

#[test]
fn forced_patch_with_breaking_commit_is_rejected() {
    let version = Version::new(1, 4, 0);
    let result = VersionIncrement::validate_forced(
        &version,
        VersionIncrement::Patch,
        ["fix: x\n\nBREAKING CHANGE: y"],
    );
    assert_eq!(result, Err(NextVersionError::BreakingRequiresMajor));
}

#[test]
fn forced_minor_with_breaking_commit_is_demoted_under_major_zero() {
    let version = Version::new(0, 7, 0);
    let result =
        VersionIncrement::validate_forced(&version, VersionIncrement::Minor, ["feat!: X"]);
    assert_eq!(result, Ok(VersionIncrement::Minor));
}

#[test]
fn forced_major_is_always_honored() {
    let version = Version::new(0, 7, 0);
    let result =
        VersionIncrement::validate_forced(&version, VersionIncrement::Major, ["chore: tidy"]);
    assert_eq!(result, Ok(VersionIncrement::Major));
}

#[test]
fn forced_patch_without_breaking_commit_is_accepted() {
    let version = Version::new(1, 2, 3);
    let result =
        VersionIncrement::validate_forced(&version, VersionIncrement::Patch, ["feat: new"]);
    assert_eq!(result, Ok(VersionIncrement::Patch));
}
