// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use huddle::prelude::*;` to get started quickly.

pub use crate::changes::{
    DirFileStore, EditBase, FileChange, FileConflict, FileEdit, FileOperation, FileStore,
    MemoryFileStore, Resolution, ResolutionRequest, ResolutionStrategy,
};
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::CoordinatorConfig;
pub use crate::context::ContextEntry;
pub use crate::coordinator::{Coordinator, CoordinatorBuilder};
pub use crate::error::{CoordError, ErrorCode};
pub use crate::event::CoordinationEvent;
pub use crate::lock::FileLock;
pub use crate::model::{Actor, ChangeId, ConflictId, LockToken, MetaValue, Metadata, TaskId};
pub use crate::outcome::{ErrorInfo, Outcome};
pub use crate::queue::{NewTask, Priority, Task, TaskStatus};
pub use crate::snapshot::{SNAPSHOT_VERSION, Snapshot};
