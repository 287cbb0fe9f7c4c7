//! JSON-Schema subset used to describe structured tool inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of JSON Schema the runtime understands.
///
/// Covers the shapes tool authors actually declare: typed objects with
/// required properties, arrays, enums, constants, and `oneOf`/`anyOf`
/// unions with local `$defs` references. Properties are kept in a
/// [`BTreeMap`] so exports and generated grammars are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Schema type keyword ("object", "string", "integer", ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Property schemas for object types.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonSchema>,
    /// Names of required properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Item schema for array types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    /// Allowed literal values.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    /// Exact literal value the instance must equal.
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    /// The instance must match exactly one of these schemas.
    #[serde(rename = "oneOf", default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<JsonSchema>,
    /// The instance must match at least one of these schemas.
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<JsonSchema>,
    /// Local reference into `$defs` (e.g. `#/$defs/Page`).
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Local schema definitions addressable via `$ref`.
    #[serde(rename = "$defs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defs: BTreeMap<String, JsonSchema>,
    /// Human-readable description surfaced in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Minimum number of array items.
    #[serde(rename = "minItems", default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
}

impl JsonSchema {
    fn typed(ty: &str) -> Self {
        Self {
            schema_type: Some(ty.to_owned()),
            ..Self::default()
        }
    }

    /// Creates an object schema with no properties.
    #[must_use]
    pub fn object() -> Self {
        Self::typed("object")
    }

    /// Creates a string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::typed("string")
    }

    /// Creates an integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::typed("integer")
    }

    /// Creates a number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::typed("number")
    }

    /// Creates a boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::typed("boolean")
    }

    /// Creates an array schema with the supplied item schema.
    #[must_use]
    pub fn array(items: JsonSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array")
        }
    }

    /// Creates a schema matching exactly the supplied literal.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self {
            const_value: Some(value),
            ..Self::default()
        }
    }

    /// Creates a `oneOf` union over the supplied schemas.
    #[must_use]
    pub fn one_of(schemas: Vec<JsonSchema>) -> Self {
        Self {
            one_of: schemas,
            ..Self::default()
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a named property schema.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Marks property names as required.
    #[must_use]
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }
}
