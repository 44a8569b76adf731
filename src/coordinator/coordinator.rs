// ABOUTME: Coordinator facade - the single entry point actors use to claim
// ABOUTME: tasks, lock files, share context, edit files, and settle conflicts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::changes::{
    ChangeTracker, FileChange, FileConflict, FileEdit, FileStore, MemoryFileStore,
    ResolutionRequest,
};
use crate::clock::{SharedClock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::context::{ContextEntry, ContextStore};
use crate::error::Result;
use crate::event::{CoordinationEvent, EventBus};
use crate::lock::{FileLock, LockManager};
use crate::model::{Actor, ChangeId, ConflictId, MetaValue, TaskId, normalize_path};
use crate::outcome::Outcome;
use crate::queue::{NewTask, Task, TaskQueue, TaskStatus};
use crate::snapshot::{SNAPSHOT_VERSION, Snapshot};

/// Canonicalize a path argument, or return its failure from the enclosing operation.
macro_rules! canonical_or_fail {
    ($path:expr) => {
        match normalize_path($path) {
            Ok(path) => path,
            Err(err) => return Outcome::fail(&err),
        }
    };
}

struct Inner {
    config: CoordinatorConfig,
    clock: SharedClock,
    tasks: TaskQueue,
    locks: LockManager,
    context: ContextStore,
    changes: ChangeTracker,
    events: EventBus,
}

/// Shared coordination store for agents and the human operator.
///
/// Cloning is cheap; every clone refers to the same store. Each component
/// (tasks, locks, context, change log) is serialized by its own lock, so
/// work on one never waits for another.
///
/// Every operation returns an [`Outcome`]. Expected contention is data, not
/// failure: a lost lock race is `Outcome::ok(false)` and an empty queue is
/// `Outcome::empty()`.
///
/// Paths are canonicalized with [`normalize_path`] before locks, the change
/// log, or the file store see them, so `/a.ts` and `a.ts` are one resource.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator with default configuration and in-memory files.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a coordinator with the given configuration.
    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a coordinator.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Receive every coordination event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: CoordinationEvent) {
        self.inner.events.emit(event);
    }

    // ---- Tasks ----

    /// Add a task to the queue.
    pub async fn enqueue_task(&self, task: NewTask) -> Outcome<Task> {
        let task = self.inner.tasks.enqueue(task).await;
        self.emit(CoordinationEvent::TaskEnqueued {
            task_id: task.id,
            priority: task.priority,
        });
        Outcome::ok(task)
    }

    /// Claim the most urgent pending task. Empty when nothing is pending.
    pub async fn dequeue_task(&self, actor: Actor) -> Outcome<Task> {
        let claimed = self.inner.tasks.dequeue(actor).await;
        if let Some(task) = &claimed {
            self.emit(CoordinationEvent::TaskClaimed {
                task_id: task.id,
                actor,
            });
        }
        claimed.into()
    }

    /// Move a task to a new status.
    pub async fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Outcome<Task> {
        let result = self.inner.tasks.transition(task_id, status).await;
        if let Ok((from, _)) = &result {
            self.emit(CoordinationEvent::TaskStatusChanged {
                task_id,
                from: *from,
                to: status,
            });
        }
        result.map(|(_, task)| task).into()
    }

    pub async fn get_task(&self, task_id: TaskId) -> Outcome<Task> {
        self.inner.tasks.get(task_id).await.into()
    }

    /// Every task, in enqueue order.
    pub async fn list_tasks(&self) -> Outcome<Vec<Task>> {
        Outcome::ok(self.inner.tasks.list_all().await)
    }

    pub async fn list_tasks_by_status(&self, status: TaskStatus) -> Outcome<Vec<Task>> {
        Outcome::ok(self.inner.tasks.list_by_status(status).await)
    }

    // ---- Locks ----

    /// Try to lock `path` for `actor`. `Outcome::ok(false)` means someone else holds it.
    pub async fn acquire_lock(
        &self,
        path: &str,
        actor: Actor,
        ttl: Option<Duration>,
    ) -> Outcome<bool> {
        let path = canonical_or_fail!(path);
        let acquired = self.inner.locks.acquire(&path, actor, ttl).await;
        if acquired {
            self.emit(CoordinationEvent::LockAcquired { path, actor });
        }
        Outcome::ok(acquired)
    }

    /// Release `actor`'s lock on `path`. `Outcome::ok(false)` if `actor` is not the owner.
    pub async fn release_lock(&self, path: &str, actor: Actor) -> Outcome<bool> {
        let path = canonical_or_fail!(path);
        let released = self.inner.locks.release(&path, actor).await;
        if released {
            self.emit(CoordinationEvent::LockReleased { path, actor });
        }
        Outcome::ok(released)
    }

    /// Extend `actor`'s lease on `path`.
    pub async fn renew_lock(&self, path: &str, actor: Actor, ttl: Option<Duration>) -> Outcome<bool> {
        let path = canonical_or_fail!(path);
        Outcome::ok(self.inner.locks.renew(&path, actor, ttl).await)
    }

    /// Release every lock `actor` holds, e.g. when an agent shuts down.
    pub async fn release_all_locks(&self, actor: Actor) -> Outcome<usize> {
        let released = self.inner.locks.release_all(actor).await;
        let count = released.len();
        for lock in released {
            self.emit(CoordinationEvent::LockReleased {
                path: lock.path,
                actor,
            });
        }
        Outcome::ok(count)
    }

    pub async fn is_locked(&self, path: &str) -> Outcome<bool> {
        let path = canonical_or_fail!(path);
        Outcome::ok(self.inner.locks.is_locked(&path).await)
    }

    pub async fn get_lock(&self, path: &str) -> Outcome<FileLock> {
        let path = canonical_or_fail!(path);
        self.inner.locks.get(&path).await.into()
    }

    /// Every live lock, sorted by path.
    pub async fn list_locks(&self) -> Outcome<Vec<FileLock>> {
        Outcome::ok(self.inner.locks.list_all().await)
    }

    /// Live locks whose path matches a glob pattern. A leading `/` is ignored,
    /// as it is for paths.
    pub async fn list_locks_matching(&self, pattern: &str) -> Outcome<Vec<FileLock>> {
        self.inner
            .locks
            .list_matching(pattern.trim_start_matches('/'))
            .await
            .into()
    }

    // ---- Context ----

    /// Store a value on the shared blackboard.
    pub async fn set_context(
        &self,
        key: &str,
        value: impl Into<MetaValue>,
        actor: Actor,
        persistent: bool,
    ) -> Outcome<ContextEntry> {
        let entry = self
            .inner
            .context
            .set(key, value.into(), actor, persistent)
            .await;
        self.emit(CoordinationEvent::ContextSet {
            key: key.to_string(),
            actor,
        });
        Outcome::ok(entry)
    }

    pub async fn get_context(&self, key: &str) -> Outcome<ContextEntry> {
        self.inner.context.get(key).await.into()
    }

    /// Remove a key. `Outcome::ok(false)` if it did not exist.
    pub async fn delete_context(&self, key: &str) -> Outcome<bool> {
        let deleted = self.inner.context.delete(key).await;
        if deleted {
            self.emit(CoordinationEvent::ContextDeleted {
                key: key.to_string(),
            });
        }
        Outcome::ok(deleted)
    }

    /// Every context entry, ordered by key.
    pub async fn list_context(&self) -> Outcome<Vec<ContextEntry>> {
        Outcome::ok(self.inner.context.list_all().await)
    }

    /// End the session: drop every non-persistent context entry.
    pub async fn clear_non_persistent_state(&self) -> Outcome<usize> {
        let removed = self.inner.context.clear_non_persistent().await;
        self.emit(CoordinationEvent::ContextCleared { removed });
        Outcome::ok(removed)
    }

    // ---- Files and changes ----

    /// Current content of `path`. Empty if the file does not exist.
    pub async fn read_file(&self, path: &str, actor: Actor) -> Outcome<String> {
        let path = canonical_or_fail!(path);
        Outcome::optional(
            self.inner
                .changes
                .read(&path, actor, self.inner.config.record_reads)
                .await,
        )
    }

    /// Apply an edit and record it in the change log.
    ///
    /// With `enforce_locks` set, fails with CONTENTION when another actor
    /// holds a live lock on the path. The lock table stays held until the
    /// edit is recorded, so no one can take the lock mid-write.
    pub async fn apply_edit(&self, actor: Actor, edit: FileEdit) -> Outcome<FileChange> {
        self.try_apply_edit(actor, edit).await.into()
    }

    async fn try_apply_edit(&self, actor: Actor, mut edit: FileEdit) -> Result<FileChange> {
        edit.path = normalize_path(&edit.path)?;

        let hold = if self.inner.config.enforce_locks {
            Some(self.inner.locks.hold_for_write(&edit.path, actor).await?)
        } else {
            None
        };
        let change = self.inner.changes.apply(actor, edit).await?;
        drop(hold);

        self.emit(CoordinationEvent::FileChanged {
            change_id: change.id,
            path: change.path.clone(),
            actor,
            operation: change.operation,
        });
        Ok(change)
    }

    /// Overwrite `path` based on its current content.
    pub async fn write_file(&self, actor: Actor, path: &str, content: &str) -> Outcome<FileChange> {
        self.apply_edit(actor, FileEdit::write(path, content)).await
    }

    /// Create `path`.
    pub async fn create_file(&self, actor: Actor, path: &str, content: &str) -> Outcome<FileChange> {
        self.apply_edit(actor, FileEdit::create(path, content)).await
    }

    /// Delete `path`.
    pub async fn delete_file(&self, actor: Actor, path: &str) -> Outcome<FileChange> {
        self.apply_edit(actor, FileEdit::delete(path)).await
    }

    pub async fn get_change(&self, change_id: ChangeId) -> Outcome<FileChange> {
        self.inner.changes.get_change(change_id).await.into()
    }

    /// The whole change log, oldest first.
    pub async fn list_changes(&self) -> Outcome<Vec<FileChange>> {
        Outcome::ok(self.inner.changes.list_changes().await)
    }

    pub async fn changes_for_path(&self, path: &str) -> Outcome<Vec<FileChange>> {
        let path = canonical_or_fail!(path);
        Outcome::ok(self.inner.changes.changes_for_path(&path).await)
    }

    /// Restore a file to its content before `change_id`.
    pub async fn revert_change(&self, change_id: ChangeId, actor: Actor) -> Outcome<FileChange> {
        let result = self.inner.changes.revert(change_id, actor).await;
        if let Ok(revert) = &result {
            self.emit(CoordinationEvent::FileChanged {
                change_id: revert.id,
                path: revert.path.clone(),
                actor,
                operation: revert.operation,
            });
            self.emit(CoordinationEvent::ChangeReverted {
                reverted: change_id,
                revert: revert.id,
            });
        }
        result.into()
    }

    // ---- Conflicts ----

    /// Scan the change log and return the conflicts found by this scan.
    pub async fn detect_conflicts(&self) -> Outcome<Vec<FileConflict>> {
        let created = self.inner.changes.detect_conflicts().await;
        for conflict in &created {
            self.emit(CoordinationEvent::ConflictDetected {
                conflict_id: conflict.id,
                path: conflict.path.clone(),
            });
        }
        Outcome::ok(created)
    }

    /// Settle a conflict.
    pub async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        request: ResolutionRequest,
    ) -> Outcome<FileConflict> {
        let strategy = request.strategy;
        let actor = request.resolved_by;
        let result = self.inner.changes.resolve(conflict_id, request).await;
        if let Ok(conflict) = &result {
            let applied = conflict.resolution.as_ref().and_then(|r| r.applied_change);
            if let Some(change_id) = applied {
                if let Some(change) = self.inner.changes.get_change(change_id).await {
                    self.emit(CoordinationEvent::FileChanged {
                        change_id,
                        path: change.path,
                        actor,
                        operation: change.operation,
                    });
                }
            }
            self.emit(CoordinationEvent::ConflictResolved {
                conflict_id,
                strategy,
                actor,
            });
        }
        result.into()
    }

    /// Unresolved conflicts.
    pub async fn pending_conflicts(&self) -> Outcome<Vec<FileConflict>> {
        Outcome::ok(self.inner.changes.pending_conflicts().await)
    }

    /// Every conflict, resolved or not.
    pub async fn list_conflicts(&self) -> Outcome<Vec<FileConflict>> {
        Outcome::ok(self.inner.changes.list_conflicts().await)
    }

    pub async fn get_conflict(&self, conflict_id: ConflictId) -> Outcome<FileConflict> {
        self.inner.changes.get_conflict(conflict_id).await.into()
    }

    // ---- Whole-store operations ----

    /// Clear every component: tasks, locks, context, change log, conflicts, files.
    pub async fn reset(&self) -> Outcome<()> {
        self.inner.tasks.clear().await;
        self.inner.locks.clear().await;
        self.inner.context.clear().await;
        let result = self.inner.changes.clear().await;
        if result.is_ok() {
            info!("Coordination store reset");
            self.emit(CoordinationEvent::Reset);
        }
        result.into()
    }

    /// Capture the whole store.
    pub async fn snapshot(&self) -> Outcome<Snapshot> {
        self.try_snapshot().await.into()
    }

    async fn try_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            taken_at: self.inner.clock.now(),
            tasks: self.inner.tasks.list_all().await,
            locks: self.inner.locks.list_all().await,
            context: self.inner.context.list_all().await,
            changes: self.inner.changes.list_changes().await,
            conflicts: self.inner.changes.list_conflicts().await,
            files: self.inner.changes.file_contents().await?.into_iter().collect(),
        })
    }

    /// Replace the whole store with a snapshot.
    pub async fn restore(&self, snapshot: Snapshot) -> Outcome<()> {
        self.try_restore(snapshot).await.into()
    }

    async fn try_restore(&self, snapshot: Snapshot) -> Result<()> {
        let counts = (snapshot.tasks.len(), snapshot.changes.len());
        self.inner
            .changes
            .replace(
                snapshot.changes,
                snapshot.conflicts,
                snapshot.files.into_iter().collect(),
            )
            .await?;
        self.inner.tasks.replace(snapshot.tasks).await;
        self.inner.locks.replace(snapshot.locks).await;
        self.inner.context.replace(snapshot.context).await;

        info!(tasks = counts.0, changes = counts.1, "Coordination store restored");
        Ok(())
    }

    /// Write a snapshot of the store to `path` as JSON.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Outcome<()> {
        let path = path.as_ref();
        let result = match self.try_snapshot().await {
            Ok(snapshot) => snapshot.save(path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "Failed to save snapshot");
        }
        result.into()
    }

    /// Replace the store with the snapshot stored at `path`.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Outcome<()> {
        let path = path.as_ref();
        let result = match Snapshot::load(path).await {
            Ok(snapshot) => self.try_restore(snapshot).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "Failed to load snapshot");
        }
        result.into()
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    clock: SharedClock,
    files: Arc<dyn FileStore>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorBuilder {
    /// Default configuration, wall-clock time, in-memory files.
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            clock: Arc::new(SystemClock),
            files: MemoryFileStore::shared(),
        }
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom time source.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Back file content with a custom store.
    pub fn file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn build(self) -> Coordinator {
        let CoordinatorBuilder {
            config,
            clock,
            files,
        } = self;

        Coordinator {
            inner: Arc::new(Inner {
                tasks: TaskQueue::new(clock.clone()),
                locks: LockManager::new(clock.clone(), config.default_lock_ttl),
                context: ContextStore::new(clock.clone()),
                changes: ChangeTracker::new(files, clock.clone(), config.conflict_window),
                events: EventBus::new(config.event_capacity),
                clock,
                config,
            }),
        }
    }
}
