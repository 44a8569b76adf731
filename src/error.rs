// ABOUTME: Defines the error type for the huddle library using thiserror.
// ABOUTME: Every failure maps to a stable ErrorCode with a retryable flag.

use serde::{Deserialize, Serialize};

use crate::model::{Actor, ChangeId, ConflictId, TaskId};

/// Stable, machine-readable error codes surfaced in every failed [`Outcome`](crate::Outcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A task, conflict, or change id is unknown.
    NotFound,
    /// The path is locked by another actor.
    Contention,
    /// The conflict has already been resolved.
    AlreadyResolved,
    /// The resolution strategy is not one of the four known strategies.
    InvalidStrategy,
    /// The change has been followed by later changes on the same path.
    Superseded,
    /// The request itself is malformed.
    InvalidInput,
    /// The file store or snapshot file failed.
    Storage,
}

impl ErrorCode {
    /// Whether repeating the same call later might succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::Contention | ErrorCode::Storage)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Contention => "CONTENTION",
            ErrorCode::AlreadyResolved => "ALREADY_RESOLVED",
            ErrorCode::InvalidStrategy => "INVALID_STRATEGY",
            ErrorCode::Superseded => "SUPERSEDED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Storage => "STORAGE",
        };
        f.write_str(code)
    }
}

/// Top-level error type for the huddle library.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("Change not found: {0}")]
    ChangeNotFound(ChangeId),

    #[error("No content at path '{0}'")]
    FileNotFound(String),

    #[error("Path '{path}' is locked by {owner}")]
    Contention { path: String, owner: Actor },

    #[error("Conflict {0} is already resolved")]
    AlreadyResolved(ConflictId),

    #[error("Unknown resolution strategy '{0}'")]
    InvalidStrategy(String),

    #[error("Change {change} on '{path}' was superseded by change {latest}")]
    Superseded {
        change: ChangeId,
        latest: ChangeId,
        path: String,
    },

    #[error("Unknown actor '{0}'")]
    InvalidActor(String),

    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File store error: {0}")]
    FileStore(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoordError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordError::TaskNotFound(_)
            | CoordError::ConflictNotFound(_)
            | CoordError::ChangeNotFound(_)
            | CoordError::FileNotFound(_) => ErrorCode::NotFound,
            CoordError::Contention { .. } => ErrorCode::Contention,
            CoordError::AlreadyResolved(_) => ErrorCode::AlreadyResolved,
            CoordError::InvalidStrategy(_) => ErrorCode::InvalidStrategy,
            CoordError::Superseded { .. } => ErrorCode::Superseded,
            CoordError::InvalidActor(_)
            | CoordError::InvalidPath(_)
            | CoordError::InvalidRequest(_)
            | CoordError::Json(_) => ErrorCode::InvalidInput,
            CoordError::FileStore(_) | CoordError::Io(_) => ErrorCode::Storage,
        }
    }

    /// Whether repeating the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Unwrap a file store failure, keeping typed errors a backend raised itself.
    pub(crate) fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<CoordError>() {
            Ok(typed) => typed,
            Err(other) => CoordError::FileStore(other),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CoordError> = std::result::Result<T, E>;
