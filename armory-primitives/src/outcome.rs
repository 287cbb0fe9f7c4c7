//! Result contract shared by every tool invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single tool invocation.
///
/// Tools report failure through `success == false` plus a human-readable
/// `error` rather than by returning an `Err`, so an LLM-driven caller can
/// inspect the outcome inline and decide how to react. Transport-level
/// failures are the only errors surfaced outside this type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the invocation achieved its goal.
    pub success: bool,
    /// Primary textual output shown back to the caller.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Human-readable error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifiers of resources the invocation modified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_resources: Vec<String>,
    /// Optional structured payload accompanying the textual output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutcome {
    /// Creates a successful outcome carrying the supplied output text.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Self::default()
        }
    }

    /// Creates a failed outcome carrying the supplied error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Records resources modified by the invocation.
    #[must_use]
    pub fn with_modified_resources(mut self, resources: Vec<String>) -> Self {
        self.modified_resources = resources;
        self
    }
}
