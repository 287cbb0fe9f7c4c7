//! Definition export and constrained-generation grammar compilation.
//!
//! Tool input schemas compile to GBNF text so a local model's sampler can be
//! constrained to emit only syntactically valid tool calls of the shape
//! `{"name": "<tool>", "args": {...}}`.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use armory_primitives::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result alias for grammar compilation.
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Errors produced while compiling schemas to grammars.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrammarError {
    /// No registered tool carries an input schema.
    #[error("no tools with schemas registered")]
    NoSchemas,

    /// The schema used a `$ref` format other than `#/$defs/...`.
    #[error("unsupported $ref format: {reference}")]
    UnsupportedRef {
        /// The offending reference string.
        reference: String,
    },

    /// The schema referenced a definition that does not exist.
    #[error("undefined $ref: {reference}")]
    UndefinedRef {
        /// The offending reference string.
        reference: String,
    },
}

/// Compiled GBNF grammar text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GbnfGrammar {
    text: String,
}

impl GbnfGrammar {
    /// Wraps compiled grammar text.
    #[must_use]
    pub fn new(text: String) -> Self {
        Self { text }
    }

    /// Returns the grammar text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for GbnfGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Flat (name, description, input schema) triple exported for prompting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool's unique identifier.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema for the tool's arguments, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonSchema>,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<JsonSchema>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Compiles the call grammar for this tool alone.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] when the parameter schema cannot be
    /// converted.
    pub fn grammar(&self) -> GrammarResult<GbnfGrammar> {
        let schema = tool_call_schema(&self.name, self.parameters.as_ref());
        Ok(GbnfGrammar::new(schema_to_gbnf(&schema)?))
    }
}

/// Builds the schema matching `{"name": "<tool>", "args": {...}}` for one
/// tool. Absent parameters permit any JSON value as `args`.
#[must_use]
pub fn tool_call_schema(name: &str, parameters: Option<&JsonSchema>) -> JsonSchema {
    JsonSchema::object()
        .with_property("name", JsonSchema::constant(Value::String(name.to_owned())))
        .with_property("args", parameters.cloned().unwrap_or_default())
        .with_required(["name", "args"])
}

/// Builds a schema accepting a call to any of the supplied tools.
#[must_use]
pub fn multi_tool_call_schema(tools: &BTreeMap<String, JsonSchema>) -> JsonSchema {
    JsonSchema::one_of(
        tools
            .iter()
            .map(|(name, schema)| tool_call_schema(name, Some(schema)))
            .collect(),
    )
}

/// Converts a JSON schema to GBNF grammar text.
///
/// Rule emission is deterministic: the root rule comes first, named rules
/// follow in sorted order, and shared primitive rules are appended only
/// when referenced.
///
/// # Errors
///
/// Returns a [`GrammarError`] for unsupported or dangling `$ref`s.
pub fn schema_to_gbnf(schema: &JsonSchema) -> GrammarResult<String> {
    let mut compiler = Compiler {
        rules: BTreeMap::new(),
        rule_count: 0,
        defs: &schema.defs,
        needs_ws: false,
        needs_string: false,
        needs_number: false,
        needs_integer: false,
        needs_boolean: false,
        needs_null: false,
    };

    let root = compiler.convert(schema, "root")?;

    let mut out = String::new();
    let _ = writeln!(out, "root ::= {root}");

    for (name, rule) in &compiler.rules {
        if name != "root" {
            let _ = writeln!(out, "{name} ::= {rule}");
        }
    }

    if compiler.needs_ws {
        out.push_str("ws ::= [ \\t\\n\\r]*\n");
    }
    if compiler.needs_string {
        out.push_str(
            "string ::= \"\\\"\" ([^\"\\\\] | \"\\\\\" [\"\\\\/bfnrt] | \"\\\\u\" [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F])* \"\\\"\"\n",
        );
    }
    if compiler.needs_number {
        out.push_str(
            "number ::= \"-\"? ([0-9] | [1-9] [0-9]*) (\".\" [0-9]+)? ([eE] [+-]? [0-9]+)?\n",
        );
    }
    if compiler.needs_integer {
        out.push_str("integer ::= \"-\"? ([0-9] | [1-9] [0-9]*)\n");
    }
    if compiler.needs_boolean {
        out.push_str("boolean ::= \"true\" | \"false\"\n");
    }
    if compiler.needs_null {
        out.push_str("null ::= \"null\"\n");
    }

    Ok(out)
}

struct Compiler<'a> {
    rules: BTreeMap<String, String>,
    rule_count: usize,
    defs: &'a BTreeMap<String, JsonSchema>,
    needs_ws: bool,
    needs_string: bool,
    needs_number: bool,
    needs_integer: bool,
    needs_boolean: bool,
    needs_null: bool,
}

impl Compiler<'_> {
    fn new_rule_name(&mut self, prefix: &str) -> String {
        self.rule_count += 1;
        format!("{prefix}_{}", self.rule_count)
    }

    fn convert(&mut self, schema: &JsonSchema, rule_name: &str) -> GrammarResult<String> {
        if let Some(reference) = &schema.reference {
            return self.convert_ref(reference);
        }

        if let Some(value) = &schema.const_value {
            return Ok(literal(value));
        }

        if !schema.enum_values.is_empty() {
            let parts: Vec<_> = schema.enum_values.iter().map(literal).collect();
            return Ok(parts.join(" | "));
        }

        if !schema.one_of.is_empty() {
            return self.convert_union(&schema.one_of, rule_name);
        }
        if !schema.any_of.is_empty() {
            return self.convert_union(&schema.any_of, rule_name);
        }

        match schema.schema_type.as_deref() {
            Some("object") => self.convert_object(schema, rule_name),
            Some("array") => self.convert_array(schema, rule_name),
            Some("string") => {
                self.needs_string = true;
                Ok("string".to_owned())
            }
            Some("number") => {
                self.needs_number = true;
                Ok("number".to_owned())
            }
            Some("integer") => {
                self.needs_integer = true;
                Ok("integer".to_owned())
            }
            Some("boolean") => {
                self.needs_boolean = true;
                Ok("boolean".to_owned())
            }
            Some("null") => {
                self.needs_null = true;
                Ok("null".to_owned())
            }
            // No type specified: allow any JSON value.
            _ => Ok(self.any_value()),
        }
    }

    fn convert_ref(&mut self, reference: &str) -> GrammarResult<String> {
        let Some(name) = reference.strip_prefix("#/$defs/") else {
            return Err(GrammarError::UnsupportedRef {
                reference: reference.to_owned(),
            });
        };

        let defs = self.defs;
        let Some(definition) = defs.get(name) else {
            return Err(GrammarError::UndefinedRef {
                reference: reference.to_owned(),
            });
        };

        let rule = format!("def_{name}");
        if !self.rules.contains_key(&rule) {
            // Reserve the name first so self-referential definitions
            // terminate instead of recursing forever.
            self.rules.insert(rule.clone(), String::new());
            let body = self.convert(definition, &rule)?;
            self.rules.insert(rule.clone(), body);
        }

        Ok(rule)
    }

    fn convert_union(
        &mut self,
        schemas: &[JsonSchema],
        rule_name: &str,
    ) -> GrammarResult<String> {
        let mut parts = Vec::with_capacity(schemas.len());
        for (index, schema) in schemas.iter().enumerate() {
            let sub_rule = format!("{rule_name}_opt{index}");
            parts.push(self.convert(schema, &sub_rule)?);
        }
        Ok(parts.join(" | "))
    }

    fn convert_object(&mut self, schema: &JsonSchema, rule_name: &str) -> GrammarResult<String> {
        self.needs_ws = true;

        if schema.properties.is_empty() {
            return Ok("\"{\" ws \"}\"".to_owned());
        }

        let mut parts = vec!["\"{\"".to_owned(), "ws".to_owned()];

        let mut first = true;
        for (prop_name, prop_schema) in &schema.properties {
            let is_required = schema.required.iter().any(|name| name == prop_name);

            let value_rule_name = self.new_rule_name(&format!("{rule_name}_{prop_name}"));
            let value_rule = self.convert(prop_schema, &value_rule_name)?;

            let mut prop_rule = format!(
                "\"\\\"{}\\\"\" ws \":\" ws {}",
                escape(prop_name),
                value_rule
            );

            if !first {
                prop_rule = format!("\",\" ws {prop_rule}");
            }

            if !is_required {
                prop_rule = format!("({prop_rule})?");
            }

            parts.push(prop_rule);
            first = false;
        }

        parts.push("ws".to_owned());
        parts.push("\"}\"".to_owned());

        Ok(parts.join(" "))
    }

    fn convert_array(&mut self, schema: &JsonSchema, rule_name: &str) -> GrammarResult<String> {
        self.needs_ws = true;

        let item_rule = match &schema.items {
            Some(items) => {
                let item_rule_name = self.new_rule_name(&format!("{rule_name}_item"));
                self.convert(items, &item_rule_name)?
            }
            None => self.any_value(),
        };

        let min_items = schema.min_items.unwrap_or(0);
        if min_items == 0 {
            return Ok(format!(
                "\"[\" ws ({item_rule} (ws \",\" ws {item_rule})*)? ws \"]\""
            ));
        }

        let mut item_parts = Vec::with_capacity(min_items + 1);
        for index in 0..min_items {
            if index == 0 {
                item_parts.push(item_rule.clone());
            } else {
                item_parts.push(format!("ws \",\" ws {item_rule}"));
            }
        }
        item_parts.push(format!("(ws \",\" ws {item_rule})*"));

        Ok(format!("\"[\" ws {} ws \"]\"", item_parts.join(" ")))
    }

    fn any_value(&mut self) -> String {
        self.needs_ws = true;
        self.needs_string = true;
        self.needs_number = true;
        self.needs_boolean = true;
        self.needs_null = true;

        if !self.rules.contains_key("value") {
            self.rules.insert(
                "value".to_owned(),
                "object | array | string | number | boolean | null".to_owned(),
            );
            self.rules.insert(
                "object".to_owned(),
                "\"{\" ws (string ws \":\" ws value (ws \",\" ws string ws \":\" ws value)*)? ws \"}\""
                    .to_owned(),
            );
            self.rules.insert(
                "array".to_owned(),
                "\"[\" ws (value (ws \",\" ws value)*)? ws \"]\"".to_owned(),
            );
        }

        "value".to_owned()
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(text) => format!("\"\\\"{}\\\"\"", escape(text)),
        Value::Bool(true) => "\"true\"".to_owned(),
        Value::Bool(false) => "\"false\"".to_owned(),
        Value::Null => "\"null\"".to_owned(),
        Value::Number(number) => format!("\"{number}\""),
        other => format!("\"{}\"", escape(&other.to_string())),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_schema() -> JsonSchema {
        JsonSchema::object()
            .with_property("query", JsonSchema::string())
            .with_property("limit", JsonSchema::integer())
            .with_required(["query"])
    }

    #[test]
    fn object_schema_compiles_to_gbnf() {
        let grammar = schema_to_gbnf(&search_schema()).unwrap();

        assert!(grammar.starts_with("root ::= \"{\" ws"));
        assert!(grammar.contains("\"\\\"query\\\"\" ws \":\" ws string"));
        // `limit` is optional, so its clause is wrapped.
        assert!(grammar.contains("(\"\\\"limit\\\"\" ws \":\" ws integer)?"));
        assert!(grammar.contains("string ::="));
        assert!(grammar.contains("integer ::="));
    }

    #[test]
    fn tool_call_schema_constrains_name_literal() {
        let schema = tool_call_schema("search", Some(&search_schema()));
        let grammar = schema_to_gbnf(&schema).unwrap();
        assert!(grammar.contains("\"\\\"search\\\"\""));
    }

    #[test]
    fn multi_tool_grammar_unions_all_tools() {
        let tools: BTreeMap<String, JsonSchema> = [
            ("file".to_owned(), JsonSchema::object()),
            ("search".to_owned(), search_schema()),
        ]
        .into();

        let grammar = schema_to_gbnf(&multi_tool_call_schema(&tools)).unwrap();
        let root = grammar.lines().next().unwrap();
        assert!(root.contains(" | "));
        assert!(grammar.contains("\"\\\"file\\\"\""));
        assert!(grammar.contains("\"\\\"search\\\"\""));
    }

    #[test]
    fn enum_compiles_to_alternation() {
        let mut schema = JsonSchema::string();
        schema.enum_values = vec![json!("asc"), json!("desc")];

        let grammar = schema_to_gbnf(&schema).unwrap();
        assert!(grammar.starts_with("root ::= \"\\\"asc\\\"\" | \"\\\"desc\\\"\""));
    }

    #[test]
    fn refs_resolve_against_defs() {
        let schema: JsonSchema = serde_json::from_value(json!({
            "type": "object",
            "properties": {"page": {"$ref": "#/$defs/Page"}},
            "required": ["page"],
            "$defs": {"Page": {"type": "string"}}
        }))
        .unwrap();

        let grammar = schema_to_gbnf(&schema).unwrap();
        assert!(grammar.contains("def_Page ::= string"));
    }

    #[test]
    fn dangling_ref_is_an_error() {
        let schema: JsonSchema = serde_json::from_value(json!({
            "type": "object",
            "properties": {"page": {"$ref": "#/$defs/Missing"}}
        }))
        .unwrap();

        let err = schema_to_gbnf(&schema).expect_err("dangling ref");
        assert!(matches!(err, GrammarError::UndefinedRef { .. }));
    }

    #[test]
    fn output_is_deterministic() {
        let schema = tool_call_schema("search", Some(&search_schema()));
        assert_eq!(
            schema_to_gbnf(&schema).unwrap(),
            schema_to_gbnf(&schema).unwrap()
        );
    }

    #[test]
    fn definition_grammar_allows_schema_less_tools() {
        let definition = ToolDefinition::new("file", "File operations", None);
        let grammar = definition.grammar().unwrap();
        assert!(grammar.as_str().contains("value ::="));
    }
}
