// ABOUTME: Priority task queue for multi-agent work distribution.
// ABOUTME: Selection and ownership transfer happen under one lock.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::task::{NewTask, Priority, Task, TaskStatus};
use crate::clock::SharedClock;
use crate::error::{CoordError, Result};
use crate::model::{Actor, TaskId};

/// Ordering key for pending tasks: highest priority first, then oldest,
/// then earliest inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    rank: Reverse<Priority>,
    created_at: DateTime<Utc>,
    slot: usize,
}

impl PendingKey {
    fn of(task: &Task, slot: usize) -> Self {
        Self {
            rank: Reverse(task.priority),
            created_at: task.created_at,
            slot,
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Every task ever enqueued, in insertion order. Tasks are never removed.
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    pending: BTreeSet<PendingKey>,
}

impl QueueState {
    fn insert(&mut self, task: Task) {
        let slot = self.tasks.len();
        if task.status == TaskStatus::Pending {
            self.pending.insert(PendingKey::of(&task, slot));
        }
        self.index.insert(task.id, slot);
        self.tasks.push(task);
    }
}

/// Priority-ordered work queue shared by all actors.
///
/// # Ownership
///
/// - **Exclusive claim:** `dequeue()` picks and claims a task in one step, so
///   two concurrent callers never receive the same task.
/// - **Explicit requeue:** moving a task back to `Pending` clears its owner
///   and makes it claimable again.
/// - **Audit trail:** tasks are never deleted, only transitioned.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    clock: SharedClock,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            clock,
        }
    }

    /// Add a task. Status defaults to `Pending`.
    pub async fn enqueue(&self, new_task: NewTask) -> Task {
        let now = self.clock.now();
        let task = Task {
            id: TaskId::new(),
            description: new_task.description,
            priority: new_task.priority,
            status: new_task.status.unwrap_or_default(),
            assigned_actor: new_task.assigned_actor,
            created_at: now,
            updated_at: now,
            metadata: new_task.metadata,
        };

        let mut state = self.state.lock().await;
        state.insert(task.clone());
        debug!(task = %task.id, priority = %task.priority, status = %task.status, "Task enqueued");
        task
    }

    /// Claim the most urgent pending task for `actor`.
    ///
    /// Returns `None` when nothing is pending.
    pub async fn dequeue(&self, actor: Actor) -> Option<Task> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let key = state.pending.pop_first()?;
        let task = &mut state.tasks[key.slot];
        task.status = TaskStatus::InProgress;
        task.assigned_actor = Some(actor);
        task.updated_at = now;

        debug!(task = %task.id, actor = %actor, "Task claimed");
        Some(task.clone())
    }

    /// Set a task's status.
    ///
    /// Returns `Err(CoordError::TaskNotFound)` for unknown ids.
    pub async fn update_status(&self, task_id: TaskId, status: TaskStatus) -> Result<Task> {
        self.transition(task_id, status).await.map(|(_, task)| task)
    }

    /// Set a task's status, also reporting the status it had before.
    pub(crate) async fn transition(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<(TaskStatus, Task)> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let slot = *state
            .index
            .get(&task_id)
            .ok_or(CoordError::TaskNotFound(task_id))?;

        let from = state.tasks[slot].status;
        let key = PendingKey::of(&state.tasks[slot], slot);
        if from == TaskStatus::Pending && status != TaskStatus::Pending {
            state.pending.remove(&key);
        } else if from != TaskStatus::Pending && status == TaskStatus::Pending {
            state.pending.insert(key);
        }

        let task = &mut state.tasks[slot];
        task.status = status;
        task.updated_at = now;
        if status == TaskStatus::Pending {
            task.assigned_actor = None;
        }

        debug!(task = %task_id, from = %from, to = %status, "Task status updated");
        Ok((from, task.clone()))
    }

    /// Look up a task by id.
    pub async fn get(&self, task_id: TaskId) -> Option<Task> {
        let state = self.state.lock().await;
        state.index.get(&task_id).map(|&slot| state.tasks[slot].clone())
    }

    /// All tasks, in the order they were enqueued.
    pub async fn list_all(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    /// Tasks with the given status, in the order they were enqueued.
    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let state = self.state.lock().await;
        state
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Number of tasks waiting to be claimed.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Replace the queue contents, e.g. from a snapshot.
    pub(crate) async fn replace(&self, tasks: Vec<Task>) {
        let mut state = self.state.lock().await;
        *state = QueueState::default();
        for task in tasks {
            state.insert(task);
        }
    }

    /// Drop every task.
    pub(crate) async fn clear(&self) {
        *self.state.lock().await = QueueState::default();
    }
}
