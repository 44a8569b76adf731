// ABOUTME: Defines the Actor enum - the closed set of participants that
// ABOUTME: issue coordination operations (two agents and a human).

use serde::{Deserialize, Serialize};

use crate::error::CoordError;

/// A participant issuing coordination operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// The Claude coding agent.
    Claude,
    /// The Copilot coding agent.
    Copilot,
    /// The human operator.
    User,
}

impl Actor {
    /// Every known actor, in declaration order.
    pub const ALL: [Actor; 3] = [Actor::Claude, Actor::Copilot, Actor::User];

    /// The lowercase label used in logs and serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Claude => "claude",
            Actor::Copilot => "copilot",
            Actor::User => "user",
        }
    }

    /// Whether this actor is an automated agent rather than the human.
    pub fn is_agent(self) -> bool {
        !matches!(self, Actor::User)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Actor {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(Actor::Claude),
            "copilot" => Ok(Actor::Copilot),
            "user" | "human" => Ok(Actor::User),
            _ => Err(CoordError::InvalidActor(s.to_string())),
        }
    }
}
