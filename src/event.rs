// ABOUTME: Coordination events broadcast to observers (reporting layers, UIs).
// ABOUTME: Every state change on the coordinator emits exactly one event.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::changes::{FileOperation, ResolutionStrategy};
use crate::model::{Actor, ChangeId, ConflictId, TaskId};
use crate::queue::{Priority, TaskStatus};

/// Something that changed in the shared store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    TaskEnqueued {
        task_id: TaskId,
        priority: Priority,
    },
    TaskClaimed {
        task_id: TaskId,
        actor: Actor,
    },
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    LockAcquired {
        path: String,
        actor: Actor,
    },
    LockReleased {
        path: String,
        actor: Actor,
    },
    ContextSet {
        key: String,
        actor: Actor,
    },
    ContextDeleted {
        key: String,
    },
    ContextCleared {
        removed: usize,
    },
    FileChanged {
        change_id: ChangeId,
        path: String,
        actor: Actor,
        operation: FileOperation,
    },
    ConflictDetected {
        conflict_id: ConflictId,
        path: String,
    },
    ConflictResolved {
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        actor: Actor,
    },
    ChangeReverted {
        reverted: ChangeId,
        revert: ChangeId,
    },
    Reset,
}

/// Fan-out of coordination events. Sending with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<CoordinationEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn emit(&self, event: CoordinationEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }
}
