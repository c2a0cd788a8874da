use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::Result;

pub fn current_directory() -> Result<Utf8PathBuf> {
    let current = std::env::current_dir().context("cannot determine current directory")?;
    let current = Utf8PathBuf::try_from(current).context("current directory is not valid utf-8")?;
    Ok(current)
}

/// Write `contents` to `path` atomically: write a sibling temporary file,
/// then rename it over the destination.
pub fn atomic_write(path: &Utf8Path, contents: &str) -> Result<()> {
    let parent = path.parent().unwrap_or(Utf8Path::new("."));
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or("nagare-write")
    ));
    fs_err::write(tmp.as_std_path(), contents)
        .with_context(|| format!("cannot write temporary file for {path}"))?;
    fs_err::rename(tmp.as_std_path(), path.as_std_path())
        .with_context(|| format!("cannot replace {path}"))?;
    Ok(())
}

pub fn read_to_string(path: &Utf8Path) -> Result<String> {
    let contents =
        fs_err::read_to_string(path.as_std_path()).with_context(|| format!("cannot read {path}"))?;
    Ok(contents)
}
