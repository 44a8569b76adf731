// ABOUTME: Context module - the shared key/value blackboard between actors.
// ABOUTME: Entries are session-scoped unless marked persistent.

mod store;

pub use store::{ContextEntry, ContextStore};
