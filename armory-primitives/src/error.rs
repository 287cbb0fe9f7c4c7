//! Shared error definitions for runtime primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the tool runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided session identifier could not be parsed.
    #[error("invalid session id: {source}")]
    InvalidSessionId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Capability identifier failed validation.
    #[error("invalid capability id `{id}`: {reason}")]
    InvalidCapabilityId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
