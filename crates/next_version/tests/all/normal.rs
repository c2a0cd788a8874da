use next_version::VersionIncrement;
use semver::Version;

fn next(version: Version, commits: &[&str]) -> Version {
    VersionIncrement::from_commits(&version, commits)
        .expect("commit set is not empty")
        .bump(&version)
}

#[test]
fn empty_commit_set_does_not_increment_version() {
    let commits: [&str; 0] = [];
    let version = Version::new(1, 2, 3);
    assert_eq!(VersionIncrement::from_commits(&version, commits), None);
}

#[test]
fn commit_without_conventional_prefix_increments_patch_version() {
    let commits = ["my change"];
    assert_eq!(next(Version::new(1, 2, 3), &commits), Version::new(1, 2, 4));
}

#[test]
fn commit_with_fix_prefix_increments_patch_version() {
    let commits = ["my change", "fix: serious bug"];
    assert_eq!(next(Version::new(1, 2, 3), &commits), Version::new(1, 2, 4));
}

#[test]
fn commit_with_feat_prefix_increments_minor_version() {
    let commits = ["feat: make coffee"];
    assert_eq!(next(Version::new(1, 3, 3), &commits), Version::new(1, 4, 0));
}

#[test]
fn commit_with_feat_prefix_increments_minor_version_when_major_is_zero() {
    let commits = ["feat: make coffee"];
    assert_eq!(next(Version::new(0, 2, 3), &commits), Version::new(0, 3, 0));
}

#[test]
fn commit_with_breaking_change_increments_major_version() {
    let commits = ["feat!: break user"];
    assert_eq!(next(Version::new(1, 2, 3), &commits), Version::new(2, 0, 0));
}

#[test]
fn commit_with_breaking_change_increments_minor_version_when_major_is_zero() {
    let commits = ["feat!: break user"];
    assert_eq!(next(Version::new(0, 7, 0), &commits), Version::new(0, 8, 0));
}

#[test]
fn breaking_change_footer_increments_major_version() {
    let commits = ["fix: redesign\n\nBREAKING CHANGE: old API removed"];
    assert_eq!(next(Version::new(2, 0, 0), &commits), Version::new(3, 0, 0));
}

#[test]
fn commit_with_scope_and_bang() {
    let commits = ["feat(my_scope)!: this is a test commit"];
    assert_eq!(next(Version::new(1, 0, 0), &commits), Version::new(2, 0, 0));
}

#[test]
fn commit_with_scope_minor() {
    let commits = ["feat(my_scope): this is a test commit"];
    assert_eq!(next(Version::new(1, 0, 0), &commits), Version::new(1, 1, 0));
}

#[test]
fn chore_commits_increment_patch_version() {
    let commits = ["chore: update dependencies", "docs: update README"];
    assert_eq!(next(Version::new(1, 2, 3), &commits), Version::new(1, 2, 4));
}

#[test]
fn prerelease_is_cleared_on_bump() {
    let version = Version::parse("1.2.3-rc.1").unwrap();
    let commits = ["fix: something"];
    let incremented = VersionIncrement::from_commits(&version, commits)
        .unwrap()
        .bump(&version);
    assert_eq!(incremented, Version::new(1, 2, 4));
}

#[test]
fn zero_major_demotion_is_reported() {
    let version = Version::new(0, 7, 0);
    assert!(VersionIncrement::is_zero_major_demotion(
        &version,
        ["feat!: redesign API"]
    ));
    assert!(!VersionIncrement::is_zero_major_demotion(
        &version,
        ["feat: add stuff"]
    ));
}
