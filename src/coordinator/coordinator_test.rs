// ABOUTME: Tests for the coordinator facade: envelopes, cross-component flows,
// ABOUTME: events, lock enforcement, and snapshot save/load.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_test::{assert_err, assert_ok};

use super::coordinator::Coordinator;
use crate::changes::{
    DirFileStore, FileEdit, FileStore, MemoryFileStore, ResolutionRequest, ResolutionStrategy,
};
use crate::clock::ManualClock;
use crate::config::CoordinatorConfig;
use crate::error::ErrorCode;
use crate::event::CoordinationEvent;
use crate::model::{Actor, ChangeId, ConflictId, MetaValue, TaskId};
use crate::queue::{NewTask, Priority, TaskStatus};

/// Memory store whose writes wait until the test lets them through.
#[derive(Default)]
struct GatedStore {
    inner: MemoryFileStore,
    entered: Notify,
    proceed: Notify,
}

#[async_trait]
impl FileStore for GatedStore {
    async fn read(&self, path: &str) -> Result<Option<String>, anyhow::Error> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), anyhow::Error> {
        self.entered.notify_one();
        self.proceed.notified().await;
        self.inner.write(path, content).await
    }

    async fn remove(&self, path: &str) -> Result<(), anyhow::Error> {
        self.inner.remove(path).await
    }

    async fn list(&self) -> Result<Vec<String>, anyhow::Error> {
        self.inner.list().await
    }
}

fn with_clock(clock: &ManualClock) -> Coordinator {
    Coordinator::builder()
        .clock(Arc::new(clock.clone()))
        .build()
}

#[tokio::test]
async fn test_dequeue_follows_priority() {
    let coordinator = Coordinator::new();
    for (description, priority) in [
        ("tidy docs", Priority::Low),
        ("fix prod", Priority::Urgent),
        ("add test", Priority::Medium),
    ] {
        let enqueued = coordinator
            .enqueue_task(NewTask::new(description).priority(priority))
            .await;
        assert!(enqueued.success);
    }

    let mut order = Vec::new();
    for _ in 0..3 {
        let task = coordinator.dequeue_task(Actor::Claude).await.data.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_actor, Some(Actor::Claude));
        order.push(task.priority);
    }
    assert_eq!(order, vec![Priority::Urgent, Priority::Medium, Priority::Low]);
}

#[tokio::test]
async fn test_empty_queue_is_success_without_data() {
    let coordinator = Coordinator::new();
    let outcome = coordinator.dequeue_task(Actor::Copilot).await;
    assert!(outcome.success);
    assert!(outcome.data.is_none());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let coordinator = Coordinator::new();
    let outcome = coordinator
        .update_task_status(TaskId::new(), TaskStatus::Completed)
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.code(), Some(ErrorCode::NotFound));
    assert!(!outcome.is_retryable());
}

#[tokio::test]
async fn test_task_lifecycle_through_facade() {
    let coordinator = Coordinator::new();
    let task = coordinator
        .enqueue_task(NewTask::new("regenerate card 1").meta("card", 1u32))
        .await
        .data
        .unwrap();

    let claimed = coordinator.dequeue_task(Actor::Copilot).await.data.unwrap();
    assert_eq!(claimed.id, task.id);

    let done = coordinator
        .update_task_status(task.id, TaskStatus::Completed)
        .await
        .data
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    let completed = coordinator
        .list_tasks_by_status(TaskStatus::Completed)
        .await
        .data
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0].metadata.get("card").and_then(MetaValue::as_f64),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_lock_expires_after_ttl() {
    let clock = ManualClock::default();
    let coordinator = with_clock(&clock);

    let acquired = coordinator
        .acquire_lock("/a.ts", Actor::Claude, Some(Duration::from_millis(100)))
        .await;
    assert_eq!(acquired.data, Some(true));

    clock.advance(Duration::from_millis(150));

    assert_eq!(coordinator.is_locked("/a.ts").await.data, Some(false));
    assert_eq!(
        coordinator.acquire_lock("/a.ts", Actor::Copilot, None).await.data,
        Some(true)
    );
    assert_eq!(
        coordinator.get_lock("/a.ts").await.data.map(|l| l.owner),
        Some(Actor::Copilot)
    );
}

#[tokio::test]
async fn test_lock_contention_is_data_not_error() {
    let coordinator = Coordinator::new();
    assert_eq!(
        coordinator.acquire_lock("/a.ts", Actor::Claude, None).await.data,
        Some(true)
    );

    let lost = coordinator.acquire_lock("/a.ts", Actor::Copilot, None).await;
    assert!(lost.success);
    assert_eq!(lost.data, Some(false));

    let not_owner = coordinator.release_lock("/a.ts", Actor::Copilot).await;
    assert!(not_owner.success);
    assert_eq!(not_owner.data, Some(false));
    assert_eq!(coordinator.is_locked("/a.ts").await.data, Some(true));
}

#[tokio::test]
async fn test_concurrent_acquire_through_clones() {
    let coordinator = Coordinator::new();
    let handles: Vec<_> = (0..12)
        .map(|i| {
            let coordinator = coordinator.clone();
            let actor = Actor::ALL[i % Actor::ALL.len()];
            tokio::spawn(async move {
                coordinator
                    .acquire_lock("/hot.rs", actor, None)
                    .await
                    .data
                    .unwrap_or(false)
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_release_all_locks_counts_and_frees() {
    let coordinator = Coordinator::new();
    for path in ["cards/card-1.json", "cards/card-2.json"] {
        coordinator.acquire_lock(path, Actor::Claude, None).await;
    }
    coordinator
        .acquire_lock("cards/card-3.json", Actor::Copilot, None)
        .await;

    assert_eq!(
        coordinator.release_all_locks(Actor::Claude).await.data,
        Some(2)
    );
    let remaining = coordinator
        .list_locks_matching("cards/*.json")
        .await
        .data
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].owner, Actor::Copilot);
}

#[tokio::test]
async fn test_bad_glob_is_invalid_input() {
    let coordinator = Coordinator::new();
    let outcome = coordinator.list_locks_matching("cards/[").await;
    assert_eq!(outcome.code(), Some(ErrorCode::InvalidInput));
}

#[tokio::test]
async fn test_context_set_get_delete() {
    let coordinator = Coordinator::new();
    let set = coordinator
        .set_context("theme", "dark", Actor::User, false)
        .await
        .data
        .unwrap();

    let got = coordinator.get_context("theme").await.data.unwrap();
    assert_eq!(got.value, MetaValue::from("dark"));
    assert_eq!(got.set_by, Actor::User);
    assert_eq!(got.timestamp, set.timestamp);

    assert_eq!(coordinator.delete_context("theme").await.data, Some(true));
    let gone = coordinator.get_context("theme").await;
    assert!(gone.success);
    assert!(gone.data.is_none());
    assert_eq!(coordinator.delete_context("theme").await.data, Some(false));
}

#[tokio::test]
async fn test_clear_non_persistent_is_idempotent() {
    let coordinator = Coordinator::new();
    coordinator
        .set_context("draft", "wip", Actor::Claude, false)
        .await;
    coordinator
        .set_context("deck", "major-arcana", Actor::User, true)
        .await;

    assert_eq!(
        coordinator.clear_non_persistent_state().await.data,
        Some(1)
    );
    let after_once = coordinator.list_context().await.data.unwrap();

    assert_eq!(
        coordinator.clear_non_persistent_state().await.data,
        Some(0)
    );
    let after_twice = coordinator.list_context().await.data.unwrap();

    assert_eq!(after_once, after_twice);
    assert_eq!(after_twice.len(), 1);
    assert_eq!(after_twice[0].key, "deck");
}

#[tokio::test]
async fn test_lost_update_detected_and_merged() {
    let coordinator = Coordinator::new();
    assert_ok!(
        coordinator
            .apply_edit(Actor::Claude, FileEdit::write("/shared.ts", "v1").based_on(""))
            .await
            .into_result()
    );
    assert_ok!(
        coordinator
            .apply_edit(Actor::Copilot, FileEdit::write("/shared.ts", "v2").based_on(""))
            .await
            .into_result()
    );

    let detected = coordinator.detect_conflicts().await.data.unwrap();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].path, "shared.ts");
    assert!(!detected[0].resolved);

    // A second scan finds nothing new.
    assert!(coordinator.detect_conflicts().await.data.unwrap().is_empty());

    let pending = coordinator.pending_conflicts().await.data.unwrap();
    assert_eq!(pending.len(), 1);

    let resolved = coordinator
        .resolve_conflict(
            pending[0].id,
            ResolutionRequest::new(ResolutionStrategy::Merge, Actor::User).final_content("v1+v2"),
        )
        .await
        .data
        .unwrap();
    assert!(resolved.resolved);
    let resolution = resolved.resolution.unwrap();
    assert_eq!(resolution.resolved_by, Actor::User);
    assert_eq!(resolution.final_content.as_deref(), Some("v1+v2"));

    assert_eq!(
        coordinator.read_file("/shared.ts", Actor::User).await.data.as_deref(),
        Some("v1+v2")
    );
    assert!(coordinator.pending_conflicts().await.data.unwrap().is_empty());
}

#[tokio::test]
async fn test_resolve_twice_is_already_resolved() {
    let coordinator = Coordinator::new();
    coordinator
        .apply_edit(Actor::Claude, FileEdit::write("/s.ts", "a").based_on(""))
        .await;
    coordinator
        .apply_edit(Actor::Copilot, FileEdit::write("/s.ts", "b").based_on(""))
        .await;
    let conflict = coordinator.detect_conflicts().await.data.unwrap().remove(0);

    let first = coordinator
        .resolve_conflict(
            conflict.id,
            ResolutionRequest::new(ResolutionStrategy::AcceptChange1, Actor::User),
        )
        .await;
    assert!(first.success);

    let second = coordinator
        .resolve_conflict(
            conflict.id,
            ResolutionRequest::new(ResolutionStrategy::AcceptChange2, Actor::User),
        )
        .await;
    assert_eq!(second.code(), Some(ErrorCode::AlreadyResolved));
    assert!(!second.is_retryable());
}

#[tokio::test]
async fn test_resolve_unknown_conflict_is_not_found() {
    let coordinator = Coordinator::new();
    let outcome = coordinator
        .resolve_conflict(
            ConflictId::new(),
            ResolutionRequest::new(ResolutionStrategy::AcceptChange1, Actor::User),
        )
        .await;
    assert_eq!(outcome.code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn test_revert_restores_previous_content() {
    let coordinator = Coordinator::new();
    coordinator
        .create_file(Actor::User, "/notes.md", "first")
        .await;
    let edit = coordinator
        .write_file(Actor::Claude, "/notes.md", "second")
        .await
        .data
        .unwrap();

    let revert = coordinator
        .revert_change(edit.id, Actor::User)
        .await
        .data
        .unwrap();
    assert_eq!(revert.new_content.as_deref(), Some("first"));
    assert_eq!(
        coordinator.read_file("/notes.md", Actor::User).await.data.as_deref(),
        Some("first")
    );
    assert_eq!(coordinator.list_changes().await.data.unwrap().len(), 3);
}

#[tokio::test]
async fn test_revert_of_older_change_is_superseded() {
    let coordinator = Coordinator::new();
    let first = coordinator
        .create_file(Actor::User, "/x.rs", "1")
        .await
        .data
        .unwrap();
    coordinator.write_file(Actor::Claude, "/x.rs", "2").await;

    let outcome = coordinator.revert_change(first.id, Actor::User).await;
    assert_eq!(outcome.code(), Some(ErrorCode::Superseded));
    assert_eq!(
        coordinator.read_file("/x.rs", Actor::User).await.data.as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn test_enforced_locks_block_other_writers() {
    let coordinator = Coordinator::with_config(CoordinatorConfig::new().enforce_locks(true));
    coordinator
        .acquire_lock("cards/card-1.json", Actor::Claude, None)
        .await;

    let blocked = coordinator
        .write_file(Actor::Copilot, "cards/card-1.json", "{}")
        .await;
    assert_eq!(blocked.code(), Some(ErrorCode::Contention));
    assert!(blocked.is_retryable());

    let owner = coordinator
        .write_file(Actor::Claude, "cards/card-1.json", "{\"front\":\"hola\"}")
        .await;
    assert!(owner.success);
}

#[tokio::test]
async fn test_advisory_locks_by_default() {
    let coordinator = Coordinator::new();
    coordinator
        .acquire_lock("cards/card-1.json", Actor::Claude, None)
        .await;
    let outcome = coordinator
        .write_file(Actor::Copilot, "cards/card-1.json", "{}")
        .await;
    assert!(outcome.success);
}

#[tokio::test]
async fn test_events_follow_operations() {
    let coordinator = Coordinator::new();
    let mut events = coordinator.subscribe();

    let task = coordinator
        .enqueue_task(NewTask::new("write card").priority(Priority::High))
        .await
        .data
        .unwrap();
    coordinator.dequeue_task(Actor::Claude).await;
    coordinator
        .acquire_lock("cards/card-1.json", Actor::Claude, None)
        .await;
    // A lost race emits nothing.
    coordinator
        .acquire_lock("cards/card-1.json", Actor::Copilot, None)
        .await;
    coordinator
        .release_lock("cards/card-1.json", Actor::Claude)
        .await;

    assert_eq!(
        events.try_recv().unwrap(),
        CoordinationEvent::TaskEnqueued {
            task_id: task.id,
            priority: Priority::High,
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        CoordinationEvent::TaskClaimed {
            task_id: task.id,
            actor: Actor::Claude,
        }
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        CoordinationEvent::LockAcquired { actor: Actor::Claude, .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        CoordinationEvent::LockReleased { actor: Actor::Claude, .. }
    ));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_snapshot_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("huddle.json");

    let source = Coordinator::new();
    source
        .enqueue_task(NewTask::new("regenerate card 2").priority(Priority::Urgent))
        .await;
    source.set_context("deck", "major-arcana", Actor::User, true).await;
    source.create_file(Actor::Claude, "cards/card-2.json", "{}").await;
    source.acquire_lock("cards/card-2.json", Actor::Claude, None).await;
    assert!(source.save_snapshot(&path).await.success);

    let restored = Coordinator::new();
    assert!(restored.load_snapshot(&path).await.success);

    let tasks = restored.list_tasks().await.data.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority, Priority::Urgent);
    assert_eq!(
        restored.get_context("deck").await.data.map(|e| e.value),
        Some(MetaValue::from("major-arcana"))
    );
    assert_eq!(
        restored
            .read_file("cards/card-2.json", Actor::User)
            .await
            .data
            .as_deref(),
        Some("{}")
    );
    assert_eq!(
        restored.get_lock("cards/card-2.json").await.data.map(|l| l.owner),
        Some(Actor::Claude)
    );
    assert_eq!(restored.list_changes().await.data.unwrap().len(), 1);

    // The restored queue is live.
    let next = restored.dequeue_task(Actor::Copilot).await.data.unwrap();
    assert_eq!(next.id, tasks[0].id);
}

#[tokio::test]
async fn test_load_missing_snapshot_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = Coordinator::new()
        .load_snapshot(dir.path().join("absent.json"))
        .await;
    assert_eq!(outcome.code(), Some(ErrorCode::Storage));
    assert_err!(outcome.into_result());
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let coordinator = Coordinator::new();
    coordinator.enqueue_task(NewTask::new("t")).await;
    coordinator.acquire_lock("/a", Actor::Claude, None).await;
    coordinator.set_context("k", true, Actor::User, true).await;
    coordinator.create_file(Actor::User, "/a", "x").await;

    let mut events = coordinator.subscribe();
    assert!(coordinator.reset().await.success);
    assert_eq!(events.try_recv().unwrap(), CoordinationEvent::Reset);

    assert!(coordinator.list_tasks().await.data.unwrap().is_empty());
    assert!(coordinator.list_locks().await.data.unwrap().is_empty());
    assert!(coordinator.list_context().await.data.unwrap().is_empty());
    assert!(coordinator.list_changes().await.data.unwrap().is_empty());
    assert!(coordinator.read_file("/a", Actor::User).await.data.is_none());
}

#[test]
fn test_outcome_serializes_with_code() {
    let coordinator = Coordinator::new();
    let outcome =
        tokio_test::block_on(coordinator.revert_change(ChangeId::new(), Actor::User));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["retryable"], false);
}

#[tokio::test]
async fn test_enforced_write_holds_lock_table_until_recorded() {
    let files = Arc::new(GatedStore::default());
    let coordinator = Coordinator::builder()
        .config(CoordinatorConfig::new().enforce_locks(true))
        .file_store(files.clone())
        .build();

    let writer = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .write_file(Actor::Copilot, "cards/card-1.json", "copilot")
                .await
        }
    });
    files.entered.notified().await;

    // Claude cannot take the lock while Copilot's write is in flight.
    let acquire = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .acquire_lock("cards/card-1.json", Actor::Claude, None)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!acquire.is_finished());

    files.proceed.notify_one();
    assert!(writer.await.unwrap().success);
    assert_eq!(acquire.await.unwrap().data, Some(true));

    let blocked = coordinator
        .write_file(Actor::Copilot, "cards/card-1.json", "again")
        .await;
    assert_eq!(blocked.code(), Some(ErrorCode::Contention));
}

#[tokio::test]
async fn test_path_aliases_share_locks_and_history() {
    let coordinator = Coordinator::with_config(CoordinatorConfig::new().enforce_locks(true));
    assert_eq!(
        coordinator.acquire_lock("/a.ts", Actor::Claude, None).await.data,
        Some(true)
    );

    let blocked = coordinator.write_file(Actor::Copilot, "a.ts", "v2").await;
    assert_eq!(blocked.code(), Some(ErrorCode::Contention));
    assert_eq!(
        coordinator.acquire_lock("./a.ts", Actor::Copilot, None).await.data,
        Some(false)
    );
    assert_eq!(
        coordinator.get_lock("a.ts").await.data.map(|l| l.path),
        Some("a.ts".to_string())
    );

    coordinator
        .apply_edit(Actor::Claude, FileEdit::write("/a.ts", "v1").based_on(""))
        .await;
    assert_eq!(
        coordinator.release_lock("a.ts", Actor::Claude).await.data,
        Some(true)
    );
    coordinator
        .apply_edit(Actor::Copilot, FileEdit::write("a.ts", "v2").based_on(""))
        .await;

    let conflicts = coordinator.detect_conflicts().await.data.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "a.ts");
    assert_eq!(
        coordinator.changes_for_path("/a.ts").await.data.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_escaping_paths_are_invalid_input() {
    let coordinator = Coordinator::new();

    let write = coordinator
        .write_file(Actor::Claude, "../outside.txt", "x")
        .await;
    assert_eq!(write.code(), Some(ErrorCode::InvalidInput));

    let lock = coordinator.acquire_lock("/", Actor::Claude, None).await;
    assert_eq!(lock.code(), Some(ErrorCode::InvalidInput));
    assert!(coordinator.list_changes().await.data.unwrap().is_empty());
}

#[tokio::test]
async fn test_reset_and_restore_leave_foreign_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let readme = dir.path().join("README.md");
    std::fs::write(&readme, "hands off").unwrap();

    let coordinator = Coordinator::builder()
        .file_store(Arc::new(DirFileStore::new(dir.path())))
        .build();
    coordinator.write_file(Actor::Claude, "/a.ts", "v1").await;

    let snapshot = coordinator.snapshot().await.data.unwrap();
    assert_eq!(snapshot.files.keys().collect::<Vec<_>>(), vec!["a.ts"]);

    assert!(coordinator.reset().await.success);
    assert_eq!(std::fs::read_to_string(&readme).unwrap(), "hands off");
    assert!(!dir.path().join("a.ts").exists());

    coordinator.write_file(Actor::Copilot, "b.ts", "scratch").await;
    assert!(coordinator.restore(snapshot).await.success);
    assert_eq!(std::fs::read_to_string(&readme).unwrap(), "hands off");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.ts")).unwrap(),
        "v1"
    );
    assert!(!dir.path().join("b.ts").exists());

    // Restored files are ours to clear again.
    assert!(coordinator.reset().await.success);
    assert!(!dir.path().join("a.ts").exists());
    assert!(readme.exists());
}
