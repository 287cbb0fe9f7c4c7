//! Core shared types for the armory tool-orchestration runtime.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod error;
mod ids;
mod outcome;
mod schema;

/// Capability identifiers resolved against the runtime environment.
pub use capability::CapabilityId;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Unique identifier for subprocess tool-server sessions.
pub use ids::SessionId;
/// Result contract returned by every tool invocation.
pub use outcome::ToolOutcome;
/// JSON-Schema subset used to describe tool inputs.
pub use schema::JsonSchema;
