//! Runtime capability detection for armory tools.
//!
//! A capability is a named precondition a tool needs before it is usable: a
//! binary on the search path, a credential in the environment, or plain
//! network access. Checkers answer "is this satisfied right now" without
//! ever making a live network call, so registries can filter tools cheaply
//! at selection time.

#![warn(missing_docs, clippy::pedantic)]

mod checker;

pub use checker::{CapabilityChecker, CapabilityProbe, EnvCapabilityChecker};
