// ABOUTME: Model module - value types shared by every coordination component.
// ABOUTME: Actors, typed identifiers, resource paths, and metadata values.

mod actor;
mod ids;
mod path;
mod value;

pub use actor::*;
pub use ids::*;
pub use path::normalize_path;
pub use value::*;
