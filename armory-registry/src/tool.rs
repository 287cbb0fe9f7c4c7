//! Tool traits, metadata, and the descriptor stored by the registry.

use std::fmt;
use std::sync::Arc;

use armory_primitives::{CapabilityId, JsonSchema, ToolOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// A merge would overwrite an existing registration.
    #[error("tool `{name}` already exists in the target registry")]
    MergeConflict {
        /// Name present on both sides of the merge.
        name: String,
    },

    /// Tool execution failed at the transport level.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

/// Minimal contract every tool satisfies.
///
/// Implementations report domain failures through
/// [`ToolOutcome::failure`](armory_primitives::ToolOutcome::failure); an
/// `Err` from `execute` means the invocation itself could not be carried
/// out (process gone, pipe broken), not that the tool declined the input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique tool name.
    fn name(&self) -> &str;

    /// Returns the human-readable tool description.
    fn description(&self) -> &str;

    /// Executes the tool with the given structured input.
    async fn execute(&self, input: Value) -> ToolResult<ToolOutcome>;
}

/// Broad grouping used to filter tools by purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Build, test, and packaging commands.
    Build,
    /// Source reading, editing, and navigation.
    Code,
    /// Information gathering from external sources.
    Research,
    /// Job control and miscellaneous helpers.
    Utility,
    /// Version control operations.
    Vcs,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Code => "code",
            Self::Research => "research",
            Self::Utility => "utility",
            Self::Vcs => "vcs",
        })
    }
}

/// How important a tool is to the role that carries it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOptionality {
    /// The role cannot function without this tool.
    Required,
    /// The role benefits from this tool when present.
    Optional,
    /// Usable only when its capability requirements hold.
    Conditional,
}

/// Example invocation attached to tool metadata for prompt assembly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolExample {
    /// What this example demonstrates.
    pub description: String,
    /// Arguments the example would pass to the tool.
    pub input: Value,
}

/// Rich metadata describing a registered tool.
///
/// Every field beyond category and optionality is optional; tools without
/// metadata at all are first-class citizens of the registry and simply
/// never match metadata-driven filters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    category: ToolCategory,
    optionality: ToolOptionality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    requires_capabilities: Vec<CapabilityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<JsonSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<ToolExample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    consumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    produces: Vec<String>,
}

impl ToolMetadata {
    /// Creates metadata with the supplied category and optionality.
    #[must_use]
    pub fn new(category: ToolCategory, optionality: ToolOptionality) -> Self {
        Self {
            category,
            optionality,
            requires_capabilities: Vec::new(),
            schema: None,
            usage_hint: None,
            examples: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// Attaches capability identifiers required for invocation.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<CapabilityId>) -> Self {
        self.requires_capabilities = capabilities;
        self
    }

    /// Attaches the JSON schema describing the tool's input.
    #[must_use]
    pub fn with_schema(mut self, schema: JsonSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets guidance shown to the model about when to pick this tool.
    #[must_use]
    pub fn with_usage_hint(mut self, hint: impl Into<String>) -> Self {
        self.usage_hint = Some(hint.into());
        self
    }

    /// Attaches example invocations.
    #[must_use]
    pub fn with_examples(mut self, examples: Vec<ToolExample>) -> Self {
        self.examples = examples;
        self
    }

    /// Records artifact tags the tool consumes.
    #[must_use]
    pub fn with_consumes(mut self, tags: Vec<String>) -> Self {
        self.consumes = tags;
        self
    }

    /// Records artifact tags the tool produces.
    #[must_use]
    pub fn with_produces(mut self, tags: Vec<String>) -> Self {
        self.produces = tags;
        self
    }

    /// Returns the tool category.
    #[must_use]
    pub const fn category(&self) -> ToolCategory {
        self.category
    }

    /// Returns the tool optionality.
    #[must_use]
    pub const fn optionality(&self) -> ToolOptionality {
        self.optionality
    }

    /// Returns the capability identifiers required for invocation.
    #[must_use]
    pub fn requires_capabilities(&self) -> &[CapabilityId] {
        &self.requires_capabilities
    }

    /// Returns the input schema if one was declared.
    #[must_use]
    pub fn schema(&self) -> Option<&JsonSchema> {
        self.schema.as_ref()
    }

    /// Returns the usage hint if one was declared.
    #[must_use]
    pub fn usage_hint(&self) -> Option<&str> {
        self.usage_hint.as_deref()
    }

    /// Returns the example invocations.
    #[must_use]
    pub fn examples(&self) -> &[ToolExample] {
        &self.examples
    }

    /// Returns the consumed artifact tags.
    #[must_use]
    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    /// Returns the produced artifact tags.
    #[must_use]
    pub fn produces(&self) -> &[String] {
        &self.produces
    }
}

/// Registry entry pairing a tool implementation with optional metadata.
///
/// The two-tier split keeps legacy tools cheap: anything implementing
/// [`Tool`] registers through [`ToolDescriptor::basic`] with no metadata,
/// while richer tools attach a [`ToolMetadata`] via
/// [`ToolDescriptor::extended`].
#[derive(Clone)]
pub struct ToolDescriptor {
    tool: Arc<dyn Tool>,
    metadata: Option<ToolMetadata>,
}

impl ToolDescriptor {
    /// Wraps a plain tool with no metadata.
    #[must_use]
    pub fn basic<T>(tool: T) -> Self
    where
        T: Tool + 'static,
    {
        Self {
            tool: Arc::new(tool),
            metadata: None,
        }
    }

    /// Wraps a tool together with its metadata.
    #[must_use]
    pub fn extended<T>(tool: T, metadata: ToolMetadata) -> Self
    where
        T: Tool + 'static,
    {
        Self {
            tool: Arc::new(tool),
            metadata: Some(metadata),
        }
    }

    /// Wraps an already shared tool, attaching optional metadata.
    #[must_use]
    pub fn from_arc(tool: Arc<dyn Tool>, metadata: Option<ToolMetadata>) -> Self {
        Self { tool, metadata }
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// Returns the human-readable tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.tool.description()
    }

    /// Returns the attached metadata, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&ToolMetadata> {
        self.metadata.as_ref()
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any [`ToolError::Execution`] returned by the underlying
    /// implementation.
    pub async fn execute(&self, input: Value) -> ToolResult<ToolOutcome> {
        self.tool.execute(input).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name())
            .field("has_metadata", &self.metadata.is_some())
            .finish()
    }
}
