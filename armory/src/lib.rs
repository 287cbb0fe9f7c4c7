//! Tool-orchestration core for LLM-agent platforms.
//!
//! Depend on this crate via `cargo add armory`. It bundles the internal
//! runtime crates behind feature flags so downstream users can enable or
//! disable components as needed for their agents.
//!
//! The shape of a typical integration: build a master
//! [`ToolRegistry`](registry::registry::ToolRegistry), apply a role's
//! [`ToolBundle`](registry::bundle::ToolBundle) to carve out a scoped
//! registry, filter it through an
//! [`EnvCapabilityChecker`](capabilities::EnvCapabilityChecker), and back
//! subprocess-hosted tools with a
//! [`ToolServerClient`](stdio::client::ToolServerClient).

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use armory_primitives as primitives;

/// Runtime capability probing (enabled by the `capabilities` feature).
#[cfg(feature = "capabilities")]
pub use armory_capabilities as capabilities;

/// Tool registry, bundles, and grammar export (enabled by the `registry`
/// feature).
#[cfg(feature = "registry")]
pub use armory_registry as registry;

/// Subprocess tool-server client (enabled by the `stdio` feature).
#[cfg(feature = "stdio")]
pub use armory_stdio as stdio;
