// ABOUTME: Change log records and the edit requests that produce them.
// ABOUTME: A FileChange captures content before and after, and who did it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Actor, ChangeId};

/// Kind of file operation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Modify,
}

impl FileOperation {
    /// Whether this operation changes file content.
    pub fn is_mutation(self) -> bool {
        !matches!(self, FileOperation::Read)
    }

    /// The operation that takes a file from `current` to `target`.
    pub(crate) fn between(current: Option<&str>, target: Option<&str>) -> Self {
        match (current, target) {
            (_, None) => FileOperation::Delete,
            (None, Some(_)) => FileOperation::Create,
            (Some(_), Some(_)) => FileOperation::Modify,
        }
    }
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Create => "create",
            FileOperation::Delete => "delete",
            FileOperation::Modify => "modify",
        };
        f.write_str(name)
    }
}

/// One entry in the append-only change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub id: ChangeId,
    pub path: String,
    pub operation: FileOperation,
    pub changed_by: Actor,
    pub timestamp: DateTime<Utc>,
    /// Content the actor based the change on. None = file did not exist.
    pub previous_content: Option<String>,
    /// Content after the change. None = file removed.
    pub new_content: Option<String>,
    pub description: Option<String>,
}

/// What an edit was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "content")]
pub enum EditBase {
    /// Whatever the file holds when the edit lands.
    #[default]
    Current,
    /// Content the actor read earlier. None = the file did not exist.
    Known(Option<String>),
}

/// A mutation an actor asks the coordinator to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub operation: FileOperation,
    /// New content. None only for deletes.
    pub content: Option<String>,
    #[serde(default)]
    pub base: EditBase,
    #[serde(default)]
    pub description: Option<String>,
}

impl FileEdit {
    fn new(path: impl Into<String>, operation: FileOperation, content: Option<String>) -> Self {
        Self {
            path: path.into(),
            operation,
            content,
            base: EditBase::Current,
            description: None,
        }
    }

    /// Overwrite a file.
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(path, FileOperation::Write, Some(content.into()))
    }

    /// Create a new file.
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(path, FileOperation::Create, Some(content.into()))
    }

    /// Change part of an existing file.
    pub fn modify(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(path, FileOperation::Modify, Some(content.into()))
    }

    /// Remove a file.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(path, FileOperation::Delete, None)
    }

    /// Declare the content this edit was computed from.
    pub fn based_on(mut self, content: impl Into<String>) -> Self {
        self.base = EditBase::Known(Some(content.into()));
        self
    }

    /// Declare that this edit was computed when the file did not exist.
    pub fn based_on_missing(mut self) -> Self {
        self.base = EditBase::Known(None);
        self
    }

    /// Attach a human-readable description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
