//! File snapshots for rollback.
//!
//! Original bytes are captured in memory before the first write and
//! mirrored to a `.bak` sibling so an interrupted process can still be
//! unwound by hand. On success the siblings are deleted; on failure
//! `restore_all` writes the originals back in reverse capture order.
//! Files that didn't exist before the release are deleted on restore.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::Result;

#[derive(Debug)]
struct BackupEntry {
    path: Utf8PathBuf,
    /// `None` when the file didn't exist before the release.
    original: Option<Vec<u8>>,
    bak_path: Utf8PathBuf,
}

#[derive(Debug, Default)]
pub struct BackupManager {
    entries: Vec<BackupEntry>,
}

impl BackupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a file before its first mutation. Capturing the same path
    /// twice is a no-op: one entry per modified file.
    ///
    /// Returns the backup reference recorded in the release state, `None`
    /// for files that are about to be created.
    pub fn capture(&mut self, path: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        if let Some(entry) = self.entries.iter().find(|e| e.path == path) {
            return Ok(entry.original.as_ref().map(|_| entry.bak_path.clone()));
        }
        let bak_path = Utf8PathBuf::from(format!("{path}.bak"));
        let original = if path.exists() {
            let bytes = fs_err::read(path.as_std_path())
                .map_err(|e| anyhow::anyhow!("cannot snapshot {path}: {e}"))?;
            fs_err::write(bak_path.as_std_path(), &bytes)
                .map_err(|e| anyhow::anyhow!("cannot write backup {bak_path}: {e}"))?;
            Some(bytes)
        } else {
            None
        };
        let backup_ref = original.as_ref().map(|_| bak_path.clone());
        self.entries.push(BackupEntry {
            path: path.to_path_buf(),
            original,
            bak_path,
        });
        Ok(backup_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put every captured file back, newest capture first. Idempotent:
    /// restoring twice leaves the same state.
    pub fn restore_all(&mut self) -> Result<()> {
        for entry in self.entries.iter().rev() {
            match &entry.original {
                Some(bytes) => {
                    fs_err::write(entry.path.as_std_path(), bytes)
                        .map_err(|e| anyhow::anyhow!("cannot restore {}: {e}", entry.path))?;
                    debug!("restored {}", entry.path);
                }
                None => {
                    if entry.path.exists() {
                        fs_err::remove_file(entry.path.as_std_path())
                            .map_err(|e| anyhow::anyhow!("cannot remove {}: {e}", entry.path))?;
                        debug!("removed created file {}", entry.path);
                    }
                }
            }
            remove_if_exists(&entry.bak_path);
        }
        self.entries.clear();
        Ok(())
    }

    /// Successful completion: forget the snapshots and delete the `.bak`
    /// siblings.
    pub fn drop_all(&mut self) {
        for entry in &self.entries {
            remove_if_exists(&entry.bak_path);
        }
        self.entries.clear();
    }
}

fn remove_if_exists(path: &Utf8Path) {
    if path.exists()
        && let Err(e) = fs_err::remove_file(path.as_std_path())
    {
        debug!("cannot remove backup file {path}: {e}");
    }
}
