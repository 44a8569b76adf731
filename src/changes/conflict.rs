// ABOUTME: Conflict records and the resolution workflow types.
// ABOUTME: A conflict moves from unresolved to resolved exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoordError;
use crate::model::{Actor, ChangeId, ConflictId};

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the earlier change.
    #[serde(rename = "accept_change1")]
    AcceptChange1,
    /// Keep the later change.
    #[serde(rename = "accept_change2")]
    AcceptChange2,
    /// Combine both changes.
    Merge,
    /// Hand-written content replacing both.
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::AcceptChange1 => "accept_change1",
            ResolutionStrategy::AcceptChange2 => "accept_change2",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept_change1" => Ok(ResolutionStrategy::AcceptChange1),
            "accept_change2" => Ok(ResolutionStrategy::AcceptChange2),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(CoordError::InvalidStrategy(other.to_string())),
        }
    }
}

/// A request to settle a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub strategy: ResolutionStrategy,
    pub resolved_by: Actor,
    /// Required for merge and manual; the accept strategies default to the
    /// chosen change's content.
    #[serde(default)]
    pub final_content: Option<String>,
}

impl ResolutionRequest {
    pub fn new(strategy: ResolutionStrategy, resolved_by: Actor) -> Self {
        Self {
            strategy,
            resolved_by,
            final_content: None,
        }
    }

    /// Build a request from a strategy name, rejecting unknown names.
    pub fn parse(strategy: &str, resolved_by: Actor) -> Result<Self, CoordError> {
        Ok(Self::new(strategy.parse()?, resolved_by))
    }

    pub fn final_content(mut self, content: impl Into<String>) -> Self {
        self.final_content = Some(content.into());
        self
    }
}

/// The settled outcome of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    pub resolved_by: Actor,
    pub resolved_at: DateTime<Utc>,
    /// None = the file ends up deleted.
    pub final_content: Option<String>,
    /// Change that wrote the final content, when the file was still at the
    /// conflicting state and needed rewriting.
    pub applied_change: Option<ChangeId>,
}

/// Two changes to one path judged to be concurrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConflict {
    pub id: ConflictId,
    pub path: String,
    /// The earlier change.
    pub change1: ChangeId,
    /// The later change, computed from stale content.
    pub change2: ChangeId,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution: Option<Resolution>,
}

impl FileConflict {
    /// Whether this conflict records the pair `(change1, change2)`.
    pub fn covers(&self, change1: ChangeId, change2: ChangeId) -> bool {
        self.change1 == change1 && self.change2 == change2
    }
}
