//! Schema inspection: node typing, defaults and composition preprocessing.
//!
//! The submodules turn a raw JSON Schema into the pieces the tree builder
//! consumes:
//!
//! - [`all_of`] -- intersect `allOf` members into one effective schema
//! - [`branch`] -- split an object schema into base / `oneOf` / `anyOf` child maps
//! - [`conditions`] -- flatten `if/then/else` into per-field required guards

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::renderer::RendererRegistry;

pub mod all_of;
pub mod branch;
pub mod conditions;

// ──────────────────────────────────────────────
// Node typing
// ──────────────────────────────────────────────

/// The kind of value a node holds. `integer` schemas map to [`NodeType::Number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
    Virtual,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Object => "object",
            NodeType::Array => "array",
            NodeType::String => "string",
            NodeType::Number => "number",
            NodeType::Boolean => "boolean",
            NodeType::Null => "null",
            NodeType::Virtual => "virtual",
        }
    }

    /// Whether the type can carry children.
    pub fn is_branch_capable(self) -> bool {
        matches!(self, NodeType::Object | NodeType::Array | NodeType::Virtual)
    }
}

/// Whether a node derives its value from children or holds it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeGroup {
    Branch,
    Terminal,
}

/// Read the declared type name, taking the first non-null entry of a type array.
pub fn declared_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => {
            let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .copied()
                .find(|t| *t != "null")
                .or_else(|| names.first().copied())
        }
        _ => None,
    }
}

/// Whether the declared type is `integer`.
pub fn is_integer(schema: &Value) -> bool {
    declared_type(schema) == Some("integer")
}

/// Determine the node type of a schema, inferring it when `type` is absent.
pub fn node_type(schema: &Value, value: Option<&Value>) -> NodeType {
    match declared_type(schema) {
        Some("object") => NodeType::Object,
        Some("array") => NodeType::Array,
        Some("string") => NodeType::String,
        Some("number") | Some("integer") => NodeType::Number,
        Some("boolean") => NodeType::Boolean,
        Some("null") => NodeType::Null,
        Some("virtual") => NodeType::Virtual,
        _ => infer_type(schema, value),
    }
}

fn infer_type(schema: &Value, value: Option<&Value>) -> NodeType {
    if schema.get("properties").is_some()
        || schema.get("oneOf").is_some()
        || schema.get("anyOf").is_some()
        || schema.get("virtual").is_some()
    {
        return NodeType::Object;
    }
    if schema.get("items").is_some() {
        return NodeType::Array;
    }
    let sample = schema
        .get("const")
        .or_else(|| schema.get("enum").and_then(|e| e.get(0)))
        .or(value);
    match sample {
        Some(Value::Object(_)) => NodeType::Object,
        Some(Value::Array(_)) => NodeType::Array,
        Some(Value::Number(_)) => NodeType::Number,
        Some(Value::Bool(_)) => NodeType::Boolean,
        Some(Value::Null) => NodeType::Null,
        _ => NodeType::String,
    }
}

/// Decide whether a node of `node_type` is a branch or a terminal.
///
/// An explicit `terminal` flag wins; otherwise a registered custom renderer
/// forces terminal treatment of a branch-capable schema.
pub fn node_group(schema: &Value, node_type: NodeType, renderers: &RendererRegistry) -> NodeGroup {
    if !node_type.is_branch_capable() {
        return NodeGroup::Terminal;
    }
    match schema.get("terminal").and_then(Value::as_bool) {
        Some(true) => NodeGroup::Terminal,
        Some(false) => NodeGroup::Branch,
        None if node_type != NodeType::Virtual && renderers.matches(schema) => {
            NodeGroup::Terminal
        }
        None => NodeGroup::Branch,
    }
}

// ──────────────────────────────────────────────
// Defaults
// ──────────────────────────────────────────────

/// The safe-empty value of a node type: `{}`/`[]` for containers, undefined otherwise.
pub fn empty_value(node_type: NodeType, group: NodeGroup) -> Option<Value> {
    match (node_type, group) {
        (NodeType::Object, NodeGroup::Branch) => Some(Value::Object(Map::new())),
        (NodeType::Array, NodeGroup::Branch) => Some(Value::Array(Vec::new())),
        _ => None,
    }
}

/// Pick the initial value of a node: input default, then schema `default`,
/// then the empty value for its type.
pub fn initial_value(
    input: Option<Value>,
    schema: &Value,
    node_type: NodeType,
    group: NodeGroup,
) -> Option<Value> {
    input
        .or_else(|| schema.get("default").cloned())
        .or_else(|| empty_value(node_type, group))
}

// ──────────────────────────────────────────────
// Small accessors
// ──────────────────────────────────────────────

/// `properties` of a schema, or an empty map.
pub fn properties(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// `required` of a schema as owned strings.
pub fn required(schema: &Value) -> Vec<String> {
    string_list(schema.get("required"))
}

/// A string or string array as an owned list.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Virtual field declarations: `virtual: { name: { fields: [...] } }`.
pub fn virtual_fields(schema: &Value) -> Vec<(String, Vec<String>, Value)> {
    let Some(decls) = schema.get("virtual").and_then(Value::as_object) else {
        return Vec::new();
    };
    decls
        .iter()
        .map(|(name, decl)| {
            let fields = string_list(decl.get("fields"));
            let mut node_schema = decl.as_object().cloned().unwrap_or_default();
            node_schema.insert("type".to_string(), Value::String("virtual".to_string()));
            (name.clone(), fields, Value::Object(node_schema))
        })
        .collect()
}
