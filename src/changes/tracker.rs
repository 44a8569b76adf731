// ABOUTME: ChangeTracker - applies file edits, keeps the append-only change
// ABOUTME: log, detects lost updates, and runs resolution and revert.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::change::{EditBase, FileChange, FileEdit, FileOperation};
use super::conflict::{FileConflict, Resolution, ResolutionRequest, ResolutionStrategy};
use super::detector::find_conflicting_pairs;
use super::store::FileStore;
use crate::clock::SharedClock;
use crate::error::{CoordError, Result};
use crate::model::{Actor, ChangeId, ConflictId};

#[derive(Default)]
struct TrackerState {
    changes: Vec<FileChange>,
    change_index: HashMap<ChangeId, usize>,
    /// Latest mutating change per path.
    heads: HashMap<String, usize>,
    conflicts: Vec<FileConflict>,
    conflict_index: HashMap<ConflictId, usize>,
    /// Every path this tracker has written or restored. Nothing else in the
    /// file store is ours to snapshot or wipe.
    owned: BTreeSet<String>,
}

impl TrackerState {
    fn append(&mut self, change: FileChange) -> FileChange {
        let idx = self.changes.len();
        self.change_index.insert(change.id, idx);
        if change.operation.is_mutation() {
            self.heads.insert(change.path.clone(), idx);
            self.owned.insert(change.path.clone());
        }
        self.changes.push(change.clone());
        change
    }

    fn add_conflict(&mut self, conflict: FileConflict) {
        self.conflict_index
            .insert(conflict.id, self.conflicts.len());
        self.conflicts.push(conflict);
    }

    fn change(&self, id: ChangeId) -> Option<&FileChange> {
        self.change_index.get(&id).map(|&idx| &self.changes[idx])
    }

    fn head(&self, path: &str) -> Option<&FileChange> {
        self.heads.get(path).map(|&idx| &self.changes[idx])
    }
}

/// Append-only log of file mutations with conflict detection and resolution.
///
/// Every mutation is applied to the [`FileStore`] and recorded while the
/// tracker's lock is held, so the log order is the order the store saw.
///
/// Paths are keys as given; the coordinator canonicalizes them first.
pub struct ChangeTracker {
    state: Mutex<TrackerState>,
    files: Arc<dyn FileStore>,
    clock: SharedClock,
    conflict_window: Option<Duration>,
}

impl ChangeTracker {
    /// Create a tracker writing through to `files`.
    pub fn new(
        files: Arc<dyn FileStore>,
        clock: SharedClock,
        conflict_window: Option<Duration>,
    ) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            files,
            clock,
            conflict_window,
        }
    }

    /// Read the current content of `path`, optionally logging the read.
    pub async fn read(&self, path: &str, actor: Actor, record: bool) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let content = self.files.read(path).await.map_err(CoordError::from_store)?;

        if record {
            state.append(FileChange {
                id: ChangeId::new(),
                path: path.to_string(),
                operation: FileOperation::Read,
                changed_by: actor,
                timestamp: self.clock.now(),
                previous_content: content.clone(),
                new_content: content.clone(),
                description: None,
            });
        }
        Ok(content)
    }

    /// Apply an edit to the file store and record it.
    pub async fn apply(&self, actor: Actor, edit: FileEdit) -> Result<FileChange> {
        if !edit.operation.is_mutation() {
            return Err(CoordError::InvalidRequest(
                "reads are not edits; use read()".to_string(),
            ));
        }

        let new_content = match edit.operation {
            FileOperation::Delete => None,
            _ => Some(edit.content.ok_or_else(|| {
                CoordError::InvalidRequest(format!("{} of '{}' has no content", edit.operation, edit.path))
            })?),
        };

        let mut state = self.state.lock().await;
        let current = self
            .files
            .read(&edit.path)
            .await
            .map_err(CoordError::from_store)?;

        let previous_content = match edit.base {
            EditBase::Current => {
                if edit.operation == FileOperation::Delete && current.is_none() {
                    return Err(CoordError::FileNotFound(edit.path));
                }
                current
            }
            EditBase::Known(base) => base,
        };

        self.store(&edit.path, new_content.as_deref()).await?;

        let change = state.append(FileChange {
            id: ChangeId::new(),
            path: edit.path,
            operation: edit.operation,
            changed_by: actor,
            timestamp: self.clock.now(),
            previous_content,
            new_content,
            description: edit.description,
        });

        debug!(change = %change.id, path = %change.path, actor = %actor, operation = %change.operation, "File change recorded");
        Ok(change)
    }

    /// Scan the log for lost updates and record each new one as a conflict.
    ///
    /// Returns only the conflicts created by this call.
    pub async fn detect_conflicts(&self) -> Vec<FileConflict> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let pairs = find_conflicting_pairs(&state.changes, &state.conflicts, self.conflict_window);

        let mut created = Vec::with_capacity(pairs.len());
        for (first, second) in pairs {
            let (c1, c2) = (&state.changes[first], &state.changes[second]);
            let conflict = FileConflict {
                id: ConflictId::new(),
                path: c2.path.clone(),
                change1: c1.id,
                change2: c2.id,
                detected_at: now,
                resolved: false,
                resolution: None,
            };

            info!(
                conflict = %conflict.id,
                path = %conflict.path,
                first = %c1.changed_by,
                second = %c2.changed_by,
                "Conflict detected"
            );
            state.add_conflict(conflict.clone());
            created.push(conflict);
        }

        created
    }

    /// Settle a conflict.
    ///
    /// When the conflict's later change is still the newest change on its
    /// path, the final content is written back and logged as a change by the
    /// resolver. Otherwise the file has moved on and only the resolution is
    /// recorded.
    pub async fn resolve(
        &self,
        conflict_id: ConflictId,
        request: ResolutionRequest,
    ) -> Result<FileConflict> {
        let mut state = self.state.lock().await;

        let idx = *state
            .conflict_index
            .get(&conflict_id)
            .ok_or(CoordError::ConflictNotFound(conflict_id))?;
        let conflict = state.conflicts[idx].clone();
        if conflict.resolved {
            return Err(CoordError::AlreadyResolved(conflict_id));
        }

        let final_content = match (request.final_content, request.strategy) {
            (Some(content), _) => Some(content),
            (None, ResolutionStrategy::AcceptChange1) => state
                .change(conflict.change1)
                .and_then(|c| c.new_content.clone()),
            (None, ResolutionStrategy::AcceptChange2) => state
                .change(conflict.change2)
                .and_then(|c| c.new_content.clone()),
            (None, strategy) => {
                return Err(CoordError::InvalidRequest(format!(
                    "{strategy} resolution needs final content"
                )));
            }
        };

        let still_head = state
            .head(&conflict.path)
            .is_some_and(|head| head.id == conflict.change2);
        let applied_change = if still_head {
            let description = format!("resolve conflict {conflict_id} ({})", request.strategy);
            self.overwrite(
                &mut state,
                &conflict.path,
                final_content.clone(),
                request.resolved_by,
                description,
                false,
            )
            .await?
        } else {
            None
        };

        let resolved = &mut state.conflicts[idx];
        resolved.resolved = true;
        resolved.resolution = Some(Resolution {
            strategy: request.strategy,
            resolved_by: request.resolved_by,
            resolved_at: self.clock.now(),
            final_content,
            applied_change,
        });

        info!(conflict = %conflict_id, strategy = %request.strategy, actor = %request.resolved_by, "Conflict resolved");
        Ok(resolved.clone())
    }

    /// Restore a file to the content it had before `change_id`.
    ///
    /// Only the newest change on a path can be reverted; anything older fails
    /// with `Superseded`. The revert is itself appended to the log.
    pub async fn revert(&self, change_id: ChangeId, actor: Actor) -> Result<FileChange> {
        let mut state = self.state.lock().await;

        let change = state
            .change(change_id)
            .cloned()
            .ok_or(CoordError::ChangeNotFound(change_id))?;
        if !change.operation.is_mutation() {
            return Err(CoordError::InvalidRequest(format!(
                "change {change_id} is a read and cannot be reverted"
            )));
        }
        let latest = state.head(&change.path).map(|head| head.id);
        if let Some(latest) = latest.filter(|&id| id != change_id) {
            return Err(CoordError::Superseded {
                change: change_id,
                latest,
                path: change.path,
            });
        }

        let revert_id = self
            .overwrite(
                &mut state,
                &change.path,
                change.previous_content.clone(),
                actor,
                format!("revert {change_id}"),
                true,
            )
            .await?
            .ok_or(CoordError::ChangeNotFound(change_id))?;

        info!(change = %change_id, revert = %revert_id, path = %change.path, actor = %actor, "Change reverted");
        state
            .change(revert_id)
            .cloned()
            .ok_or(CoordError::ChangeNotFound(revert_id))
    }

    /// Look up a change by id.
    pub async fn get_change(&self, change_id: ChangeId) -> Option<FileChange> {
        self.state.lock().await.change(change_id).cloned()
    }

    /// The whole log, oldest first.
    pub async fn list_changes(&self) -> Vec<FileChange> {
        self.state.lock().await.changes.clone()
    }

    /// Log entries for one path, oldest first.
    pub async fn changes_for_path(&self, path: &str) -> Vec<FileChange> {
        let state = self.state.lock().await;
        state
            .changes
            .iter()
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }

    pub async fn get_conflict(&self, conflict_id: ConflictId) -> Option<FileConflict> {
        let state = self.state.lock().await;
        state
            .conflict_index
            .get(&conflict_id)
            .map(|&idx| state.conflicts[idx].clone())
    }

    /// Every conflict ever detected, in detection order.
    pub async fn list_conflicts(&self) -> Vec<FileConflict> {
        self.state.lock().await.conflicts.clone()
    }

    /// Conflicts still awaiting resolution.
    pub async fn pending_conflicts(&self) -> Vec<FileConflict> {
        let state = self.state.lock().await;
        state
            .conflicts
            .iter()
            .filter(|c| !c.resolved)
            .cloned()
            .collect()
    }

    /// Current content of every file this tracker has written, by path.
    pub(crate) async fn file_contents(&self) -> Result<Vec<(String, String)>> {
        let state = self.state.lock().await;

        let mut contents = Vec::with_capacity(state.owned.len());
        for path in &state.owned {
            if let Some(content) = self.files.read(path).await.map_err(CoordError::from_store)? {
                contents.push((path.clone(), content));
            }
        }
        Ok(contents)
    }

    /// Replace log, conflicts, and file contents, e.g. from a snapshot.
    pub(crate) async fn replace(
        &self,
        changes: Vec<FileChange>,
        conflicts: Vec<FileConflict>,
        files: Vec<(String, String)>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        self.wipe_files(&state.owned).await?;
        *state = TrackerState::default();
        for (path, content) in &files {
            self.store(path, Some(content)).await?;
            state.owned.insert(path.clone());
        }

        for change in changes {
            state.append(change);
        }
        for conflict in conflicts {
            state.add_conflict(conflict);
        }
        Ok(())
    }

    /// Drop the log, the conflicts, and every file this tracker wrote.
    /// Files it never touched stay where they are.
    pub(crate) async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.wipe_files(&state.owned).await?;
        *state = TrackerState::default();
        Ok(())
    }

    /// Set `path` to `target` and log it. Unless `always_log` is set, a file
    /// already holding `target` is left alone and nothing is logged.
    /// Returns the id of the logged change.
    async fn overwrite(
        &self,
        state: &mut TrackerState,
        path: &str,
        target: Option<String>,
        actor: Actor,
        description: String,
        always_log: bool,
    ) -> Result<Option<ChangeId>> {
        let current = self.files.read(path).await.map_err(CoordError::from_store)?;
        if current == target && !always_log {
            return Ok(None);
        }

        self.store(path, target.as_deref()).await?;
        let change = state.append(FileChange {
            id: ChangeId::new(),
            path: path.to_string(),
            operation: FileOperation::between(current.as_deref(), target.as_deref()),
            changed_by: actor,
            timestamp: self.clock.now(),
            previous_content: current,
            new_content: target,
            description: Some(description),
        });
        Ok(Some(change.id))
    }

    async fn store(&self, path: &str, content: Option<&str>) -> Result<()> {
        match content {
            Some(content) => self.files.write(path, content).await,
            None => self.files.remove(path).await,
        }
        .map_err(CoordError::from_store)
    }

    async fn wipe_files(&self, paths: &BTreeSet<String>) -> Result<()> {
        for path in paths {
            self.files.remove(path).await.map_err(CoordError::from_store)?;
        }
        Ok(())
    }
}
