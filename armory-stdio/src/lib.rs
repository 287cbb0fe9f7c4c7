//! Line-protocol client for subprocess-hosted tool servers.
//!
//! An external tool server is a child process that speaks newline-delimited
//! JSON-RPC over its standard pipes. This crate owns the whole conversation:
//! spawning the process with its credential tucked into a private
//! environment variable, the `initialize` handshake, and the strict
//! write-then-read call cycle that makes request/response correlation a
//! structural guarantee rather than an id-matching protocol.

#![warn(missing_docs, clippy::pedantic)]

pub mod client;
pub mod protocol;
pub mod remote;
pub mod session;
