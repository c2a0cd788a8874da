use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nagare_core::error::ErrorCode;
use nagare_core::{Error, ReleaseRequest, VersionIncrement, release};

use crate::helpers::{TestContext, package_json_content, write};

fn request(context: &TestContext) -> ReleaseRequest {
    ReleaseRequest::new(context.root.clone(), context.config())
}

#[tokio::test]
async fn feature_commit_bumps_minor_and_rewrites_files() {
    let context = TestContext::new();
    context.commit("feat(api): add pagination");
    context.commit("chore: tidy");

    let outcome = release(&request(&context)).await.unwrap();

    assert_eq!(outcome.version, "1.3.0");
    assert_eq!(outcome.previous_version.as_deref(), Some("1.2.3"));
    assert_eq!(outcome.tag, "v1.3.0");
    assert!(context.tag_exists("v1.3.0"));

    // single release commit with the exact message
    assert_eq!(
        context.repo.commit_subject("HEAD").unwrap(),
        "chore(release): bump version to 1.3.0"
    );

    // version file and manifest were rewritten
    assert!(context.read("version.ts").contains("export const VERSION = \"1.3.0\";"));
    assert!(context.read("package.json").contains("\"version\": \"1.3.0\""));

    // changelog got a Keep-a-Changelog section with the short hash
    let changelog = context.read("CHANGELOG.md");
    assert!(changelog.contains("## [1.3.0]"));
    assert!(changelog.contains("### Added"));
    assert!(changelog.contains("- feat(api): add pagination ("));

    // the working tree is clean again: re-running preflight would pass
    assert!(context.repo.is_clean().unwrap());
    // backups and state are gone
    assert!(!context.root.join("package.json.bak").exists());
    assert!(!context.root.join(".nagare/state/1.3.0.json").exists());
}

#[tokio::test]
async fn breaking_commit_on_zero_major_bumps_minor_with_warning() {
    let context = TestContext::with_version("0.7.0");
    context.commit("feat!: redesign API");

    let outcome = release(&request(&context)).await.unwrap();

    assert_eq!(outcome.version, "0.8.0");
    assert!(context.tag_exists("v0.8.0"));
    assert!(!context.tag_exists("v1.0.0"));
    assert!(!outcome.warnings.is_empty());
    assert!(context.read("CHANGELOG.md").contains("- feat!: redesign API ("));
}

#[tokio::test]
async fn forced_minor_with_breaking_commit_is_rejected_without_side_effects() {
    let context = TestContext::with_version("2.0.0");
    context.commit("feat!: X");
    let head = context.head();

    let request = request(&context).with_forced_bump(Some(VersionIncrement::Minor));
    let err = release(&request).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::BreakingRequiresMajor);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(context.head(), head);
    assert!(!context.tag_exists("v2.1.0"));
    assert!(context.read("version.ts").contains("2.0.0"));
}

#[tokio::test]
async fn dry_run_reports_effects_but_mutates_nothing() {
    let context = TestContext::new();
    context.commit("fix: race in writer");
    let head = context.head();
    let version_file_before = context.read("version.ts");

    let outcome = release(&request(&context).with_dry_run(true)).await.unwrap();

    assert!(outcome.dry_run);
    assert_eq!(outcome.version, "1.2.4");
    assert!(outcome.commit.is_none());
    assert!(!outcome.files.is_empty());
    // nothing on disk, in refs, or in history changed
    assert_eq!(context.read("version.ts"), version_file_before);
    assert_eq!(context.head(), head);
    assert!(!context.tag_exists("v1.2.4"));
    assert!(context.repo.is_clean().unwrap());
}

#[tokio::test]
async fn structural_failure_during_mutate_rolls_everything_back() {
    let context = TestContext::new();
    write(&context.root, "deno.json", &package_json_content("1.2.3"));
    write(&context.root, "manifest.json", &package_json_content("1.2.3"));
    context.repo.add_all_and_commit("chore: add manifests");
    context.commit("feat: something new");
    let head = context.head();

    let config = context.config_from(&format!(
        "{}\n[[update_files]]\npath = \"deno.json\"\n\n[[update_files]]\npath = \"manifest.json\"\n",
        crate::helpers::BASE_CONFIG
    ));

    // The update function behaves in the preview pass and corrupts the
    // file in the mutate pass, so the post-write validator trips after
    // earlier files were already written.
    let calls = Arc::new(AtomicUsize::new(0));
    let update_fn: nagare_core::file_handler::UpdateFn = Arc::new(
        move |old: &str, _data: &nagare_core::template::TemplateData| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(old.to_string())
            } else {
                Ok("{ not json".to_string())
            }
        },
    );
    let request = ReleaseRequest::new(context.root.clone(), config)
        .with_update_fn("manifest.json", update_fn);

    let err = release(&request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::FileJsonInvalid);
    assert_eq!(err.exit_code(), 4);
    assert!(matches!(err, Error::RolledBack { .. }));

    // everything the release touched was restored
    assert!(context.read("version.ts").contains("1.2.3"));
    assert!(context.read("package.json").contains("\"version\": \"1.2.3\""));
    assert!(context.read("deno.json").contains("\"version\": \"1.2.3\""));
    assert_eq!(context.head(), head);
    assert!(!context.tag_exists("v1.3.0"));
    assert!(!context.root.join("package.json.bak").exists());
    assert!(context.repo.is_clean().unwrap());
}

#[tokio::test]
async fn no_commits_since_the_last_tag_is_an_error() {
    let context = TestContext::new();
    let err = release(&request(&context)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GitNoCommits);
}

#[tokio::test]
async fn existing_target_tag_is_an_error() {
    let context = TestContext::new();
    // a stale v1.3.0 exists from some manual tagging, while v1.2.3 stays
    // the most recently created release tag
    context.repo.git(&["tag", "v1.3.0"]).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    context.repo.git(&["tag", "-d", "v1.2.3"]).unwrap();
    context
        .repo
        .git(&["tag", "-a", "v1.2.3", "-m", "Release 1.2.3"])
        .unwrap();
    context.commit("feat: something");

    let err = release(&request(&context)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GitTagExists);
}

#[tokio::test]
async fn dirty_working_directory_fails_preflight() {
    let context = TestContext::new();
    context.commit("feat: something");
    write(&context.root, "version.ts", "// uncommitted local edit\n");

    let err = release(&request(&context)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GitNotClean);
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn version_file_drift_is_rejected_unless_sync_is_opted_in() {
    let context = TestContext::new();
    context.commit_file(
        "version.ts",
        "export const VERSION = \"9.9.9\";\n",
        "chore: desync version file",
    );
    context.commit("feat: something");

    let err = release(&request(&context)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PreflightCheckFailed);

    let config = context.config_from(
        r#"
[project]
name = "demo"
repository = "https://github.com/acme/demo"

[version_file]
path = "version.ts"
format = "typescript"

[release]
push = false
sync_on_mismatch = true

[[update_files]]
path = "package.json"
"#,
    );
    let outcome = release(&ReleaseRequest::new(context.root.clone(), config))
        .await
        .unwrap();
    // the tag is authoritative, not the version file
    assert_eq!(outcome.version, "1.3.0");
}

#[tokio::test]
async fn failing_pre_release_hook_aborts_with_no_side_effects() {
    let context = TestContext::new();
    context.commit("feat: something");
    let head = context.head();

    let config = context.config_from(&format!(
        "{}\n[[release.pre_release_hooks]]\nname = \"guard\"\ncommand = [\"false\"]\n",
        crate::helpers::BASE_CONFIG
    ));
    let err = release(&ReleaseRequest::new(context.root.clone(), config))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("pre-release hook"));
    assert_eq!(context.head(), head);
    assert!(!context.tag_exists("v1.3.0"));
    assert!(context.read("version.ts").contains("1.2.3"));
}

#[tokio::test]
async fn failing_post_release_hook_does_not_fail_the_release() {
    let context = TestContext::new();
    context.commit("feat: something");

    let config = context.config_from(&format!(
        "{}\n[[release.post_release_hooks]]\nname = \"notify\"\ncommand = [\"false\"]\n",
        crate::helpers::BASE_CONFIG
    ));
    let outcome = release(&ReleaseRequest::new(context.root.clone(), config))
        .await
        .unwrap();

    assert_eq!(outcome.version, "1.3.0");
    assert!(context.tag_exists("v1.3.0"));
    assert!(outcome.warnings.iter().any(|w| w.contains("notify")));
}

#[tokio::test]
async fn fixable_preflight_check_is_repaired_and_rerun() {
    let context = TestContext::new();
    context.commit("feat: something");

    let config = context.config_from(&format!(
        "{}\n[[release.checks]]\nname = \"marker\"\ncommand = [\"test\", \"-f\", \"fixed.marker\"]\nfix_command = [\"touch\", \"fixed.marker\"]\n",
        crate::helpers::BASE_CONFIG
    ));
    // the marker file created by the fix makes the work tree dirty only
    // if tracked; it is untracked, so preflight stays green
    let outcome = release(&ReleaseRequest::new(context.root.clone(), config))
        .await
        .unwrap();

    assert_eq!(outcome.version, "1.3.0");
    assert!(context.root.join("fixed.marker").exists());
    let check = outcome
        .preflight
        .checks
        .iter()
        .find(|check| check.name == "marker")
        .unwrap();
    assert!(check.passed);
    assert!(check.fixable);
}

#[tokio::test]
async fn failing_preflight_check_stops_the_release() {
    let context = TestContext::new();
    context.commit("feat: something");

    let config = context.config_from(&format!(
        "{}\n[[release.checks]]\nname = \"lint\"\ncommand = [\"false\"]\n",
        crate::helpers::BASE_CONFIG
    ));
    let err = release(&ReleaseRequest::new(context.root.clone(), config))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PreflightCheckFailed);
    assert_eq!(err.exit_code(), 3);
    assert!(!context.tag_exists("v1.3.0"));
}

#[tokio::test]
async fn cancellation_before_mutate_leaves_no_side_effects() {
    let context = TestContext::new();
    context.commit("feat: something");
    let head = context.head();

    let cancel = nagare_core::CancelToken::new();
    cancel.cancel();
    let err = release(&request(&context).with_cancel_token(cancel))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::OpCancelled);
    assert_eq!(context.head(), head);
    assert!(!context.tag_exists("v1.3.0"));
    assert!(context.read("version.ts").contains("1.2.3"));
}

#[tokio::test]
async fn first_release_without_any_tag_starts_from_zero() {
    let context = TestContext::new();
    context.repo.git(&["tag", "-d", "v1.2.3"]).unwrap();
    context.commit("feat: first feature");

    let outcome = release(&request(&context)).await.unwrap();
    // 0.0.0 + feat = 0.1.0
    assert_eq!(outcome.version, "0.1.0");
    assert_eq!(outcome.previous_version, None);
    assert!(context.tag_exists("v0.1.0"));
}
