// ABOUTME: Tests for the task queue ordering and ownership semantics.
// ABOUTME: Covers priority order, FIFO ties, status updates, and contention.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::clock::{ManualClock, SharedClock, SystemClock};
use crate::error::ErrorCode;
use crate::model::{Actor, TaskId};

fn queue() -> TaskQueue {
    TaskQueue::new(Arc::new(SystemClock))
}

#[tokio::test]
async fn test_enqueue_assigns_id_and_timestamps() {
    let queue = queue();
    let task = queue
        .enqueue(NewTask::new("regenerate card 13").meta("card", 13_i64))
        .await;

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.created_at, task.updated_at);
    assert!(task.assigned_actor.is_none());
    assert_eq!(task.metadata["card"].as_f64(), Some(13.0));
}

#[tokio::test]
async fn test_enqueue_respects_explicit_status() {
    let queue = queue();
    let task = queue
        .enqueue(NewTask::new("already done").status(TaskStatus::Completed))
        .await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(queue.pending_count().await, 0);
    assert!(queue.dequeue(Actor::Claude).await.is_none());
}

#[tokio::test]
async fn test_dequeue_orders_by_priority() {
    let queue = queue();
    queue.enqueue(NewTask::new("low").priority(Priority::Low)).await;
    queue.enqueue(NewTask::new("urgent").priority(Priority::Urgent)).await;
    queue.enqueue(NewTask::new("medium").priority(Priority::Medium)).await;

    let first = queue.dequeue(Actor::Claude).await.unwrap();
    let second = queue.dequeue(Actor::Claude).await.unwrap();
    let third = queue.dequeue(Actor::Claude).await.unwrap();

    assert_eq!(first.description, "urgent");
    assert_eq!(second.description, "medium");
    assert_eq!(third.description, "low");
}

#[tokio::test]
async fn test_dequeue_is_fifo_within_priority() {
    let clock = ManualClock::default();
    let queue = TaskQueue::new(Arc::new(clock.clone()));

    queue.enqueue(NewTask::new("first").priority(Priority::High)).await;
    clock.advance(Duration::from_millis(1));
    queue.enqueue(NewTask::new("second").priority(Priority::High)).await;
    // Same timestamp as "second"; insertion order breaks the tie.
    queue.enqueue(NewTask::new("third").priority(Priority::High)).await;

    let order: Vec<_> = [
        queue.dequeue(Actor::Copilot).await.unwrap(),
        queue.dequeue(Actor::Copilot).await.unwrap(),
        queue.dequeue(Actor::Copilot).await.unwrap(),
    ]
    .into_iter()
    .map(|t| t.description)
    .collect();

    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_dequeue_claims_for_actor() {
    let clock = ManualClock::default();
    let queue = TaskQueue::new(Arc::new(clock.clone()));
    let task = queue.enqueue(NewTask::new("work")).await;

    clock.advance(Duration::from_secs(2));
    let claimed = queue.dequeue(Actor::Copilot).await.unwrap();

    assert_eq!(claimed.id, task.id);
    assert_eq!(claimed.status, TaskStatus::InProgress);
    assert_eq!(claimed.assigned_actor, Some(Actor::Copilot));
    assert!(claimed.updated_at > claimed.created_at);
}

#[tokio::test]
async fn test_dequeue_empty_returns_none() {
    let queue = queue();
    assert!(queue.dequeue(Actor::User).await.is_none());
}

#[tokio::test]
async fn test_update_status_unknown_task() {
    let queue = queue();
    let err = queue
        .update_status(TaskId::new(), TaskStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_update_status_to_completed() {
    let queue = queue();
    queue.enqueue(NewTask::new("work")).await;
    let claimed = queue.dequeue(Actor::Claude).await.unwrap();

    let done = queue
        .update_status(claimed.id, TaskStatus::Completed)
        .await
        .unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.assigned_actor, Some(Actor::Claude));
    assert_eq!(queue.list_by_status(TaskStatus::Completed).await.len(), 1);
}

#[tokio::test]
async fn test_requeue_makes_task_claimable_again() {
    let queue = queue();
    queue.enqueue(NewTask::new("flaky")).await;
    let claimed = queue.dequeue(Actor::Claude).await.unwrap();

    let requeued = queue
        .update_status(claimed.id, TaskStatus::Pending)
        .await
        .unwrap();
    assert!(requeued.assigned_actor.is_none());

    let reclaimed = queue.dequeue(Actor::Copilot).await.unwrap();
    assert_eq!(reclaimed.id, claimed.id);
    assert_eq!(reclaimed.assigned_actor, Some(Actor::Copilot));
}

#[tokio::test]
async fn test_cancelling_pending_task_removes_it_from_queue() {
    let queue = queue();
    let task = queue.enqueue(NewTask::new("never mind")).await;

    queue.update_status(task.id, TaskStatus::Failed).await.unwrap();

    assert_eq!(queue.pending_count().await, 0);
    assert!(queue.dequeue(Actor::Claude).await.is_none());
    assert_eq!(queue.get(task.id).await.unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_list_all_keeps_enqueue_order() {
    let queue = queue();
    queue.enqueue(NewTask::new("a").priority(Priority::Low)).await;
    queue.enqueue(NewTask::new("b").priority(Priority::Urgent)).await;
    queue.dequeue(Actor::Claude).await;

    let all: Vec<_> = queue
        .list_all()
        .await
        .into_iter()
        .map(|t| t.description)
        .collect();
    assert_eq!(all, vec!["a", "b"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_never_duplicates() {
    let clock: SharedClock = Arc::new(SystemClock);
    let queue = Arc::new(TaskQueue::new(clock));
    for i in 0..50 {
        queue.enqueue(NewTask::new(format!("task {i}"))).await;
    }

    let mut handles = Vec::new();
    for worker in 0..8 {
        let queue = Arc::clone(&queue);
        let actor = Actor::ALL[worker % Actor::ALL.len()];
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(task) = queue.dequeue(actor).await {
                claimed.push(task.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for result in futures::future::join_all(handles).await {
        for id in result.unwrap() {
            assert!(seen.insert(id), "task {id} handed out twice");
        }
    }
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_priority_parse() {
    assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
    assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    assert!("soon".parse::<Priority>().is_err());
    assert!(Priority::Low < Priority::Medium && Priority::High < Priority::Urgent);
}

#[test]
fn test_terminal_statuses() {
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(!TaskStatus::Pending.is_terminal());
    assert!(!TaskStatus::InProgress.is_terminal());
}
