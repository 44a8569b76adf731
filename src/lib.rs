// ABOUTME: Root module for huddle - a coordination substrate for agents and humans.
// ABOUTME: Re-exports the facade and the types callers need most.

pub mod changes;
pub mod clock;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod lock;
pub mod model;
pub mod outcome;
pub mod prelude;
pub mod queue;
pub mod snapshot;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{CoordError, ErrorCode};
pub use outcome::{ErrorInfo, Outcome};
