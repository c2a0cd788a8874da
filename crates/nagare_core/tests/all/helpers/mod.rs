use camino::{Utf8Path, Utf8PathBuf};
use git_cmd::Repo;
use nagare_core::{Config, parse_config};

pub const BASE_CONFIG: &str = r#"
[project]
name = "demo"
repository = "https://github.com/acme/demo"

[version_file]
path = "version.ts"
format = "typescript"

[release]
push = false

[[update_files]]
path = "package.json"
"#;

/// A throwaway repository seeded with a released 1.2.3: version file,
/// package manifest, changelog, and the `v1.2.3` tag.
pub struct TestContext {
    _dir: tempfile::TempDir,
    pub root: Utf8PathBuf,
    pub repo: Repo,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_version("1.2.3")
    }

    pub fn with_version(version: &str) -> Self {
        test_logs::init();
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let repo = Repo::init(&root);

        write(&root, "version.ts", &version_file_content(version));
        write(&root, "package.json", &package_json_content(version));
        write(
            &root,
            "CHANGELOG.md",
            nagare_core::changelog::CHANGELOG_HEADER,
        );
        repo.add_all_and_commit(&format!("chore(release): bump version to {version}"));
        repo.git(&["tag", "-a", &format!("v{version}"), "-m", &format!("Release {version}")])
            .unwrap();

        Self {
            _dir: dir,
            root,
            repo,
        }
    }

    pub fn config(&self) -> Config {
        self.config_from(BASE_CONFIG)
    }

    pub fn config_from(&self, toml: &str) -> Config {
        let mut config = parse_config(toml, "toml").unwrap();
        config.validate().unwrap();
        config
    }

    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) {
        write(&self.root, rel, contents);
        self.repo.add_all_and_commit(message);
    }

    pub fn commit(&self, message: &str) {
        self.repo.commit_empty(message);
    }

    pub fn read(&self, rel: &str) -> String {
        fs_err::read_to_string(self.root.join(rel).as_std_path()).unwrap()
    }

    pub fn head(&self) -> String {
        self.repo.current_commit_hash().unwrap()
    }

    pub fn tag_exists(&self, tag: &str) -> bool {
        self.repo.tag_exists(tag).unwrap()
    }
}

pub fn write(root: &Utf8Path, rel: &str, contents: &str) {
    fs_err::write(root.join(rel).as_std_path(), contents).unwrap();
}

pub fn version_file_content(version: &str) -> String {
    format!("export const VERSION = \"{version}\";\n")
}

pub fn package_json_content(version: &str) -> String {
    format!("{{\n  \"name\": \"demo\",\n  \"version\": \"{version}\"\n}}\n")
}
