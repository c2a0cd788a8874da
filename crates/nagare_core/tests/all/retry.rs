use camino::Utf8PathBuf;
use nagare_core::error::ErrorCode;
use nagare_core::{Error, ReleaseRequest, RetryOutcome, RetryRequest, release, retry};
use semver::Version;

use crate::helpers::TestContext;

const PUSH_CONFIG: &str = r#"
[project]
name = "demo"
repository = "https://github.com/acme/demo"

[version_file]
path = "version.ts"
format = "typescript"

[release]
push = true

[[update_files]]
path = "package.json"
"#;

#[tokio::test]
async fn publish_failure_keeps_local_state_and_retry_finishes_it() {
    let context = TestContext::new();
    context.commit("feat: add pagination");

    // no `origin` remote yet: the push fails after commit and tag succeed
    let err = release(&ReleaseRequest::new(
        context.root.clone(),
        context.config_from(PUSH_CONFIG),
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, Error::PublishFailed { .. }));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(err.code(), ErrorCode::GitRemoteError);
    // local release is intact
    assert!(context.tag_exists("v1.3.0"));
    assert!(context.read("version.ts").contains("1.3.0"));
    assert!(context.root.join(".nagare/state/1.3.0.json").exists());

    // now give the repository a working remote and retry
    let bare = tempfile::tempdir().unwrap();
    let bare_path = Utf8PathBuf::try_from(bare.path().to_path_buf()).unwrap();
    context
        .repo
        .git(&["init", "--bare", bare_path.as_str()])
        .unwrap();
    context
        .repo
        .git(&["remote", "add", "origin", bare_path.as_str()])
        .unwrap();

    let outcome = retry(&RetryRequest::new(
        context.root.clone(),
        context.config_from(PUSH_CONFIG),
        Version::parse("1.3.0").unwrap(),
    ))
    .await
    .unwrap();

    match outcome {
        RetryOutcome::Republished { version, tag, .. } => {
            assert_eq!(version, "1.3.0");
            assert_eq!(tag, "v1.3.0");
        }
        RetryOutcome::StateCleared { .. } => panic!("expected a publish re-run"),
    }
    // the tag reached the remote and the failed state is gone
    let remote_tags = context.repo.git(&["ls-remote", "--tags", "origin"]).unwrap();
    assert!(remote_tags.contains("refs/tags/v1.3.0"));
    assert!(!context.root.join(".nagare/state/1.3.0.json").exists());
}

#[tokio::test]
async fn retry_without_recorded_publish_failure_clears_state() {
    let context = TestContext::new();
    let outcome = retry(&RetryRequest::new(
        context.root.clone(),
        context.config(),
        Version::parse("1.2.3").unwrap(),
    ))
    .await
    .unwrap();
    assert!(matches!(outcome, RetryOutcome::StateCleared { .. }));
}
