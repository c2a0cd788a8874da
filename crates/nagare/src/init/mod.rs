//! `nagare init`: scaffold the configuration file and changelog.

use camino::Utf8Path;
use nagare_core::changelog::{CHANGELOG_FILENAME, CHANGELOG_HEADER};
use nagare_core::error::Result;
use tracing::info;

pub const CONFIG_FILENAME: &str = "nagare.config.toml";

const CONFIG_TEMPLATE: &str = r#"# nagare configuration.
# Run `nagare release` to cut a release driven by your conventional commits.

[project]
name = "my-project"
repository = "https://github.com/owner/my-project"

[version_file]
path = "version.ts"
# One of: typescript, json, yaml, custom.
# With `custom`, also set `template`.
format = "typescript"

[release]
# tag_prefix = "v"
# remote = "origin"
# push = true

# Pre-flight checks run before anything is written. Checks with a
# fix_command are auto-repaired once and re-run.
# [[release.checks]]
# name = "fmt"
# command = ["cargo", "fmt", "--check"]
# fix_command = ["cargo", "fmt"]

# Extra files whose version fields are rewritten, in order. Files with a
# known shape (package.json, Cargo.toml, *.yaml, README badges, ...) need
# no patterns.
# [[update_files]]
# path = "README.md"

[changelog]
# path = "CHANGELOG.md"

[forge]
# Create a release on the forge (needs the `gh` tool and GITHUB_TOKEN).
enabled = false
"#;

pub fn init(root: &Utf8Path) -> Result<()> {
    let config_path = root.join(CONFIG_FILENAME);
    if config_path.exists() {
        info!("{CONFIG_FILENAME} already exists, leaving it untouched");
    } else {
        fs_err::write(config_path.as_std_path(), CONFIG_TEMPLATE)
            .map_err(|e| anyhow::anyhow!("cannot write {config_path}: {e}"))?;
        println!("created {CONFIG_FILENAME}");
    }

    let changelog_path = root.join(CHANGELOG_FILENAME);
    if changelog_path.exists() {
        info!("{CHANGELOG_FILENAME} already exists, leaving it untouched");
    } else {
        fs_err::write(changelog_path.as_std_path(), CHANGELOG_HEADER)
            .map_err(|e| anyhow::anyhow!("cannot write {changelog_path}: {e}"))?;
        println!("created {CHANGELOG_FILENAME}");
    }

    println!("edit {CONFIG_FILENAME}, then run `nagare release --dry-run`");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffolded_config_parses_and_validates() {
        let mut config = nagare_core::parse_config(CONFIG_TEMPLATE, "toml").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.project.name, "my-project");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs_err::write(root.join(CONFIG_FILENAME).as_std_path(), "custom = true").unwrap();

        init(root).unwrap();
        let contents = fs_err::read_to_string(root.join(CONFIG_FILENAME).as_std_path()).unwrap();
        assert_eq!(contents, "custom = true");
        assert!(root.join(CHANGELOG_FILENAME).exists());
    }
}
