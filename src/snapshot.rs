// ABOUTME: Point-in-time snapshot of the whole coordination store.
// ABOUTME: Saved and loaded as pretty-printed JSON.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::changes::{FileChange, FileConflict};
use crate::context::ContextEntry;
use crate::error::{CoordError, Result};
use crate::lock::FileLock;
use crate::queue::Task;

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything the coordinator knows at one instant.
///
/// The change log is the source of truth for file history; the other
/// collections are rebuilt from the snapshot as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub locks: Vec<FileLock>,
    pub context: Vec<ContextEntry>,
    pub changes: Vec<FileChange>,
    pub conflicts: Vec<FileConflict>,
    /// Current file contents by path.
    pub files: BTreeMap<String, String>,
}

impl Snapshot {
    /// Write the snapshot to `path`, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Read a snapshot written by [`Snapshot::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;

        if snapshot.version > SNAPSHOT_VERSION {
            warn!(path = %path.display(), version = snapshot.version, supported = SNAPSHOT_VERSION, "Snapshot written by a newer version");
            return Err(CoordError::InvalidRequest(format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}
