//! Composition resolution for object schemas.
//!
//! An object schema is split into its base child map (`properties`), one
//! isolated child map per `oneOf` branch, and additive child maps for
//! `anyOf` branches. Conflicting redeclarations are rejected here, at
//! construction time.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::{Map, Value};

use super::{declared_type, properties, required};
use crate::error::BuildError;

/// Stable token identifying one `oneOf` branch of one object schema.
///
/// Derived from the owning schema path and branch index, so rebuilding the
/// same schema yields the same salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Salt(u64);

impl Salt {
    pub fn derive(path: &str, index: usize) -> Self {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        index.hash(&mut hasher);
        Salt(hasher.finish())
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut n = self.0;
        let mut digits = Vec::new();
        loop {
            let d = (n % 36) as u8;
            digits.push(if d < 10 { b'0' + d } else { b'a' + d - 10 });
            n /= 36;
            if n == 0 {
                break;
            }
        }
        digits.reverse();
        f.write_str(&String::from_utf8_lossy(&digits))
    }
}

/// One exclusive `oneOf` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct OneOfBranch {
    pub index: usize,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    /// Guard expression source (`computed.if` or `&if`); `None` means the
    /// branch matches whenever it is reached.
    pub guard: Option<String>,
    pub salt: Salt,
}

/// One additive `anyOf` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyOfBranch {
    pub index: usize,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

/// The resolved child maps of an object schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchStrategy {
    pub base: Map<String, Value>,
    pub one_of: Vec<OneOfBranch>,
    pub any_of: Vec<AnyOfBranch>,
}

impl BranchStrategy {
    pub fn has_one_of(&self) -> bool {
        !self.one_of.is_empty()
    }

    /// Base schema with `anyOf` folded in and `oneOf` branch `active` merged,
    /// composition keywords removed.
    pub fn effective_schema(&self, parent: &Value, active: Option<usize>) -> Value {
        let mut schema = parent.as_object().cloned().unwrap_or_default();
        schema.remove("oneOf");
        schema.remove("anyOf");

        let mut props = self.base.clone();
        let mut req = required(parent);
        for branch in &self.any_of {
            extend_properties(&mut props, &mut req, &branch.properties, &branch.required);
        }
        if let Some(branch) = active.and_then(|i| self.one_of.get(i)) {
            extend_properties(&mut props, &mut req, &branch.properties, &branch.required);
        }

        schema.insert("properties".to_string(), Value::Object(props));
        if !req.is_empty() {
            schema.insert(
                "required".to_string(),
                Value::Array(req.into_iter().map(Value::String).collect()),
            );
        }
        Value::Object(schema)
    }
}

fn extend_properties(
    props: &mut Map<String, Value>,
    req: &mut Vec<String>,
    extra: &Map<String, Value>,
    extra_required: &[String],
) {
    for (k, v) in extra {
        props.insert(k.clone(), v.clone());
    }
    for name in extra_required {
        if !req.contains(name) {
            req.push(name.clone());
        }
    }
}

/// Read the guard expression of a composition branch.
pub fn branch_guard(branch: &Value) -> Option<String> {
    branch
        .get("computed")
        .and_then(|c| c.get("if"))
        .or_else(|| branch.get("&if"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Split an object schema into base, `oneOf` and `anyOf` child maps.
pub fn resolve(schema: &Value, path: &str) -> Result<BranchStrategy, BuildError> {
    let base = properties(schema);
    let parent_type = declared_type(schema).unwrap_or("object");

    let one_of_members = schema.get("oneOf").and_then(Value::as_array);
    let any_of_members = schema.get("anyOf").and_then(Value::as_array);
    if one_of_members.is_some() && any_of_members.is_some() {
        return Err(BuildError::CompositionUnsupported {
            path: path.to_string(),
            message: "oneOf and anyOf cannot be declared on the same schema".to_string(),
        });
    }

    let mut one_of = Vec::new();
    for (index, member) in one_of_members.into_iter().flatten().enumerate() {
        let member_path = format!("{}/oneOf/{}", path, index);
        check_member_type(member, parent_type, &member_path)?;
        let member_props = properties(member);
        for name in member_props.keys() {
            if base.contains_key(name) {
                return Err(BuildError::CompositionPropertyRedefinition {
                    path: member_path,
                    property: name.clone(),
                });
            }
        }
        one_of.push(OneOfBranch {
            index,
            properties: member_props,
            required: required(member),
            guard: branch_guard(member),
            salt: Salt::derive(path, index),
        });
    }

    let mut any_of: Vec<AnyOfBranch> = Vec::new();
    for (index, member) in any_of_members.into_iter().flatten().enumerate() {
        let member_path = format!("{}/anyOf/{}", path, index);
        check_member_type(member, parent_type, &member_path)?;
        let member_props = properties(member);
        for name in member_props.keys() {
            if base.contains_key(name) {
                return Err(BuildError::CompositionPropertyRedefinition {
                    path: member_path,
                    property: name.clone(),
                });
            }
            if any_of.iter().any(|b| b.properties.contains_key(name)) {
                return Err(BuildError::CompositionExclusivenessRedefinition {
                    path: member_path,
                    property: name.clone(),
                });
            }
        }
        any_of.push(AnyOfBranch {
            index,
            properties: member_props,
            required: required(member),
        });
    }

    Ok(BranchStrategy {
        base,
        one_of,
        any_of,
    })
}

fn check_member_type(member: &Value, parent_type: &str, path: &str) -> Result<(), BuildError> {
    match declared_type(member) {
        Some(t) if t != parent_type => Err(BuildError::CompositionTypeRedefinition {
            path: path.to_string(),
            parent: parent_type.to_string(),
            member: t.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mode_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"mode": {"type": "string", "enum": ["A", "B"]}},
            "oneOf": [
                {"&if": "./mode === 'A'", "properties": {"fieldA": {"type": "string"}}},
                {"computed": {"if": "./mode === 'B'"}, "properties": {"fieldB": {"type": "string"}}, "required": ["fieldB"]}
            ]
        })
    }

    #[test]
    fn one_of_branches_get_isolated_maps() {
        let strategy = resolve(&mode_schema(), "").unwrap();
        assert_eq!(strategy.base.len(), 1);
        assert_eq!(strategy.one_of.len(), 2);
        assert!(strategy.one_of[0].properties.contains_key("fieldA"));
        assert!(strategy.one_of[1].properties.contains_key("fieldB"));
        assert_eq!(strategy.one_of[0].guard.as_deref(), Some("./mode === 'A'"));
        assert_eq!(strategy.one_of[1].guard.as_deref(), Some("./mode === 'B'"));
        assert_eq!(strategy.one_of[1].required, vec!["fieldB".to_string()]);
    }

    #[test]
    fn salts_are_stable_and_distinct() {
        let first = resolve(&mode_schema(), "/obj").unwrap();
        let again = resolve(&mode_schema(), "/obj").unwrap();
        assert_eq!(first.one_of[0].salt, again.one_of[0].salt);
        assert_ne!(first.one_of[0].salt, first.one_of[1].salt);
        assert!(!first.one_of[0].salt.to_string().is_empty());
    }

    #[test]
    fn type_redefinition_is_fatal() {
        let schema = json!({"type": "object", "oneOf": [{"type": "string"}]});
        let err = resolve(&schema, "").unwrap_err();
        assert_eq!(err.code(), "COMPOSITION_TYPE_REDEFINITION");
    }

    #[test]
    fn property_redefinition_is_fatal() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "oneOf": [{"properties": {"a": {"type": "number"}}}]
        });
        assert_eq!(
            resolve(&schema, "").unwrap_err().code(),
            "COMPOSITION_PROPERTY_REDEFINITION"
        );
    }

    #[test]
    fn any_of_exclusiveness_is_enforced() {
        let schema = json!({
            "type": "object",
            "anyOf": [
                {"properties": {"x": {"type": "string"}}},
                {"properties": {"x": {"type": "string"}}}
            ]
        });
        assert_eq!(
            resolve(&schema, "").unwrap_err().code(),
            "COMPOSITION_EXCLUSIVENESS_REDEFINITION"
        );
    }

    #[test]
    fn one_of_with_any_of_is_rejected() {
        let schema = json!({"type": "object", "oneOf": [{}], "anyOf": [{}]});
        assert_eq!(
            resolve(&schema, "").unwrap_err().code(),
            "COMPOSITION_UNSUPPORTED"
        );
    }

    #[test]
    fn effective_schema_merges_active_branch() {
        let schema = mode_schema();
        let strategy = resolve(&schema, "").unwrap();
        let effective = strategy.effective_schema(&schema, Some(1));
        assert!(effective.get("oneOf").is_none());
        assert!(effective["properties"].get("fieldB").is_some());
        assert!(effective["properties"].get("fieldA").is_none());
        assert_eq!(effective["required"], json!(["fieldB"]));
    }
}
