// ABOUTME: Defines Outcome - the uniform envelope returned by every
// ABOUTME: coordinator operation: success flag, payload, structured error.

use serde::{Deserialize, Serialize};

use crate::error::{CoordError, ErrorCode};

/// Structured description of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether repeating the same call later might succeed.
    pub retryable: bool,
}

impl From<&CoordError> for ErrorInfo {
    fn from(err: &CoordError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result of a coordinator operation.
///
/// An absent result (nothing to dequeue, no such key) is a success with no
/// data; only genuine failures carry an [`ErrorInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    /// Whether the operation succeeded.
    pub success: bool,

    /// The payload, when there is one.
    pub data: Option<T>,

    /// The failure, when `success` is false.
    pub error: Option<ErrorInfo>,
}

impl<T> Outcome<T> {
    /// A successful outcome carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A successful outcome with nothing to return.
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// A failed outcome.
    pub fn fail(err: &CoordError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorInfo::from(err)),
        }
    }

    /// Build from a fallible lookup where `Ok(None)` means "absent".
    pub fn optional(result: Result<Option<T>, CoordError>) -> Self {
        match result {
            Ok(Some(data)) => Outcome::ok(data),
            Ok(None) => Outcome::empty(),
            Err(err) => Outcome::fail(&err),
        }
    }

    /// The error code, if this outcome failed.
    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Whether the caller may retry; false for successes.
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }

    /// Convert into a plain `Result`, losing the distinction of the envelope.
    pub fn into_result(self) -> Result<Option<T>, ErrorInfo> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }

    /// Map the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl<T> From<Result<T, CoordError>> for Outcome<T> {
    fn from(result: Result<T, CoordError>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(err) => Outcome::fail(&err),
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(data) => Outcome::ok(data),
            None => Outcome::empty(),
        }
    }
}
