//! Registry-facing tool backed by a subprocess tool server.

use std::sync::Arc;

use armory_primitives::ToolOutcome;
use armory_registry::tool::{Tool, ToolDescriptor, ToolMetadata, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client::ToolServerClient;

/// A tool whose implementation lives in an external tool-server process.
///
/// `execute` validates required input fields before any process
/// interaction, so invalid input never spawns a server. Availability,
/// transport, and protocol failures come back as unsuccessful
/// [`ToolOutcome`]s with a descriptive error string, never as panics: an
/// LLM-driven caller inspects the outcome and reacts inline.
pub struct RemoteTool {
    name: String,
    description: String,
    metadata: Option<ToolMetadata>,
    client: Arc<ToolServerClient>,
}

impl RemoteTool {
    /// Creates a remote tool served by the supplied client.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        client: Arc<ToolServerClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            metadata: None,
            client,
        }
    }

    /// Attaches metadata; its schema drives pre-dispatch validation.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Converts this tool into a registry descriptor.
    #[must_use]
    pub fn into_descriptor(self) -> ToolDescriptor {
        let metadata = self.metadata.clone();
        ToolDescriptor::from_arc(Arc::new(self), metadata)
    }

    /// Returns the first required field missing from `input`, if any.
    fn missing_required_field(&self, input: &Map<String, Value>) -> Option<String> {
        let schema = self.metadata.as_ref()?.schema()?;
        schema
            .required
            .iter()
            .find(|field| !input.contains_key(*field))
            .cloned()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutcome> {
        let arguments = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Ok(ToolOutcome::failure("arguments must be a JSON object"));
            }
        };

        if let Some(field) = self.missing_required_field(&arguments) {
            return Ok(ToolOutcome::failure(format!("{field} is required")));
        }

        match self
            .client
            .call_tool(&self.name, Value::Object(arguments))
            .await
        {
            Ok(result) => {
                let output = serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|_| result.to_string());
                Ok(ToolOutcome::success(output))
            }
            Err(err) => Ok(ToolOutcome::failure(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use armory_primitives::JsonSchema;
    use armory_registry::tool::{ToolCategory, ToolOptionality};

    use crate::client::ServerConfig;

    fn search_tool() -> RemoteTool {
        let client = Arc::new(ToolServerClient::new(ServerConfig {
            command: "definitely-not-a-real-binary".to_owned(),
            ..ServerConfig::default()
        }));

        RemoteTool::new("search", "Remote search", client).with_metadata(
            ToolMetadata::new(ToolCategory::Research, ToolOptionality::Optional).with_schema(
                JsonSchema::object()
                    .with_property("query", JsonSchema::string())
                    .with_required(["query"]),
            ),
        )
    }

    #[tokio::test]
    async fn non_object_arguments_fail_validation() {
        let outcome = search_tool()
            .execute(Value::String("query".to_owned()))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("arguments must be a JSON object")
        );
    }

    #[tokio::test]
    async fn missing_required_field_fails_before_dispatch() {
        let outcome = search_tool()
            .execute(serde_json::json!({"limit": 3}))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("query is required"));
    }

    #[test]
    fn descriptor_carries_metadata() {
        let descriptor = search_tool().into_descriptor();
        assert_eq!(descriptor.name(), "search");
        assert!(descriptor.metadata().is_some());
    }
}
