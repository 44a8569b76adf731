// ABOUTME: Task queue module - priority-ordered work items claimed by actors.
// ABOUTME: The queue is the single authority granting task ownership.

mod queue;
mod task;

pub use queue::TaskQueue;
pub use task::{NewTask, Priority, Task, TaskStatus};

#[cfg(test)]
mod queue_test;
