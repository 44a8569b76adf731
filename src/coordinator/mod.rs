// ABOUTME: Coordinator module - the facade over tasks, locks, context, and changes.
// ABOUTME: Owns one instance of each component and broadcasts their events.

mod coordinator;

pub use coordinator::{Coordinator, CoordinatorBuilder};

#[cfg(test)]
mod coordinator_test;
