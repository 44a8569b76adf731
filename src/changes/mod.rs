// ABOUTME: Change tracking module - the append-only file change log, conflict
// ABOUTME: detection over it, the resolution workflow, and file storage.

mod change;
mod conflict;
mod detector;
mod store;
mod tracker;

pub use change::{EditBase, FileChange, FileEdit, FileOperation};
pub use conflict::{FileConflict, Resolution, ResolutionRequest, ResolutionStrategy};
pub use store::{DirFileStore, FileStore, MemoryFileStore};
pub use tracker::ChangeTracker;
