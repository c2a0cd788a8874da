//! Append-only log of release side-effects.
//!
//! Each entry carries enough information to reverse it. An entry is
//! recorded only after its side-effect succeeded, and the log is
//! persisted after every record, so a crash between side-effect and
//! record is treated as "side-effect did not happen" and rollback
//! tolerates missing preconditions.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fs_utils;

pub const STATE_DIR: &str = ".nagare/state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    FileWritten {
        path: Utf8PathBuf,
        backup: Option<Utf8PathBuf>,
    },
    FileCreated {
        path: Utf8PathBuf,
    },
    CommitMade {
        hash: String,
    },
    TagCreated {
        name: String,
        remote: Option<String>,
    },
    PushPerformed {
        refspec: String,
        remote: String,
    },
    RemoteReleaseCreated {
        id: String,
        url: String,
    },
}

/// Stage names recorded for `retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Mutate,
    Commit,
    Tag,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseState {
    pub release_id: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub failed_stage: Option<FailedStage>,
    pub effects: Vec<SideEffect>,
}

impl ReleaseState {
    pub fn new(version: &str) -> Self {
        let started_at = Utc::now();
        Self {
            release_id: format!("{version}-{}", started_at.format("%Y%m%d%H%M%S")),
            version: version.to_string(),
            started_at,
            failed_stage: None,
            effects: vec![],
        }
    }

    pub fn record(&mut self, effect: SideEffect) {
        self.effects.push(effect);
    }

    /// Effects in reverse order, the order rollback undoes them in.
    pub fn effects_reversed(&self) -> impl Iterator<Item = &SideEffect> {
        self.effects.iter().rev()
    }

    pub fn tag_created(&self) -> Option<&str> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::TagCreated { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn commit_made(&self) -> Option<&str> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::CommitMade { hash } => Some(hash.as_str()),
            _ => None,
        })
    }
}

/// On-disk store under `.nagare/state/<version>.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: Utf8PathBuf,
}

impl StateStore {
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            dir: root.join(STATE_DIR),
        }
    }

    fn path_for(&self, version: &str) -> Utf8PathBuf {
        self.dir.join(format!("{version}.json"))
    }

    pub fn save(&self, state: &ReleaseState) -> Result<()> {
        fs_err::create_dir_all(self.dir.as_std_path())
            .map_err(|e| anyhow::anyhow!("cannot create state directory {}: {e}", self.dir))?;
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| anyhow::anyhow!("cannot serialize release state: {e}"))?;
        fs_utils::atomic_write(&self.path_for(&state.version), &json)
    }

    pub fn load(&self, version: &str) -> Result<Option<ReleaseState>> {
        let path = self.path_for(version);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs_utils::read_to_string(&path)?;
        let state = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("corrupt release state {path}: {e}"))?;
        Ok(Some(state))
    }

    pub fn clear(&self, version: &str) -> Result<()> {
        let path = self.path_for(version);
        if path.exists() {
            fs_err::remove_file(path.as_std_path())
                .map_err(|e| anyhow::anyhow!("cannot remove release state {path}: {e}"))?;
        }
        Ok(())
    }
}
