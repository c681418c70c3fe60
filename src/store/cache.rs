//! Per-workspace snapshot of the last successful issue refresh.
//!
//! The snapshot only pre-populates the sidebar before the first live refresh
//! completes; it is overwritten after every successful refresh and never
//! consulted otherwise.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LookoutError, Result};
use crate::types::IssueGroups;

/// Overrides the platform cache directory (used by tests and packaging).
pub const ENV_CACHE_DIR: &str = "LOOKOUT_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub captured_at: Timestamp,
    pub groups: IssueGroups,
}

pub fn cache_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ENV_CACHE_DIR).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("", "", "lookout")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| LookoutError::Config("cannot determine cache directory".to_string()))
}

/// First 16 hex chars of the blake3 hash of the canonical workspace path.
pub fn workspace_hash(workspace: &Path) -> String {
    let canonical = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Snapshot file for one workspace.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn for_workspace(workspace: &Path) -> Result<Self> {
        let path = cache_dir()?.join(format!("snapshot-{}.json", workspace_hash(workspace)));
        Ok(Self { path })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. Missing, unreadable or corrupt files yield `None`.
    pub fn load(&self) -> Option<CachedSnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable cache: {e}");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring corrupt cache: {e}");
                None
            }
        }
    }

    /// Atomically replace the snapshot with `groups`, stamped now.
    pub fn save(&self, groups: &IssueGroups) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| LookoutError::Config("cache path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        let snapshot = CachedSnapshot {
            captured_at: Timestamp::now(),
            groups: groups.clone(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &snapshot)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| LookoutError::Io(e.error))?;
        debug!(path = %self.path.display(), issues = groups.total_issues(), "cache written");
        Ok(())
    }

    /// Delete the snapshot. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
