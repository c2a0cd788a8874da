use nagare_core::{ReleaseRequest, RollbackRequest, release, rollback};
use pretty_assertions::assert_eq;
use semver::Version;

use crate::helpers::TestContext;

fn rollback_request(context: &TestContext, version: &str) -> RollbackRequest {
    RollbackRequest::new(
        context.root.clone(),
        context.config(),
        Version::parse(version).unwrap(),
    )
}

#[tokio::test]
async fn rollback_after_release_restores_the_previous_state() {
    let context = TestContext::new();
    context.commit("feat: add pagination");
    let head_before = context.head();
    let version_file_before = context.read("version.ts");
    let manifest_before = context.read("package.json");
    let changelog_before = context.read("CHANGELOG.md");

    let outcome = release(&ReleaseRequest::new(context.root.clone(), context.config()))
        .await
        .unwrap();
    assert_eq!(outcome.version, "1.3.0");
    assert!(context.tag_exists("v1.3.0"));

    let undone = rollback(&rollback_request(&context, "1.3.0")).await.unwrap();
    assert!(!undone.nothing_to_do);
    assert!(undone.tag_deleted);
    assert!(undone.commit_reset);

    // observationally equal to the pre-release state
    assert!(!context.tag_exists("v1.3.0"));
    assert_eq!(context.head(), head_before);
    assert_eq!(context.read("version.ts"), version_file_before);
    assert_eq!(context.read("package.json"), manifest_before);
    assert_eq!(context.read("CHANGELOG.md"), changelog_before);
    assert!(context.repo.is_clean().unwrap());
}

#[tokio::test]
async fn rollback_twice_is_a_no_op_the_second_time() {
    let context = TestContext::new();
    context.commit("feat: add pagination");
    release(&ReleaseRequest::new(context.root.clone(), context.config()))
        .await
        .unwrap();

    let first = rollback(&rollback_request(&context, "1.3.0")).await.unwrap();
    assert!(first.tag_deleted);

    let second = rollback(&rollback_request(&context, "1.3.0")).await.unwrap();
    assert!(second.nothing_to_do);
    assert!(!second.tag_deleted);
}

#[tokio::test]
async fn rollback_of_an_unknown_version_is_a_no_op() {
    let context = TestContext::new();
    let outcome = rollback(&rollback_request(&context, "9.9.9")).await.unwrap();
    assert!(outcome.nothing_to_do);
    assert_eq!(outcome.tag, "v9.9.9");
}

#[tokio::test]
async fn rollback_with_newer_commits_restores_files_without_rewriting_history() {
    let context = TestContext::new();
    context.commit("feat: add pagination");
    release(&ReleaseRequest::new(context.root.clone(), context.config()))
        .await
        .unwrap();

    // work landed after the release
    context.commit_file("extra.txt", "later work\n", "chore: unrelated follow-up");
    let head_after_follow_up = context.head();

    let undone = rollback(&rollback_request(&context, "1.3.0")).await.unwrap();
    assert!(undone.tag_deleted);
    assert!(!undone.commit_reset);
    assert!(undone.files_restored > 0);

    // history is untouched, but the released files carry the old version
    assert_eq!(context.head(), head_after_follow_up);
    assert!(context.read("version.ts").contains("1.2.3"));
    assert!(context.root.join("extra.txt").exists());
}
