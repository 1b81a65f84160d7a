//! `allOf` intersection.
//!
//! All members are folded field-by-field into a single effective schema
//! before any other composition is resolved. Conditionals (`if/then/else`)
//! found on members cannot be intersected; they are collected into a fresh
//! `allOf` list of conditional-only schemas so both the validator and the
//! condition flattener still see them.

use serde_json::{Map, Value};

use super::declared_type;
use crate::error::BuildError;

const LOWER_BOUNDS: &[&str] = &[
    "minimum",
    "exclusiveMinimum",
    "minLength",
    "minItems",
    "minProperties",
];
const UPPER_BOUNDS: &[&str] = &[
    "maximum",
    "exclusiveMaximum",
    "maxLength",
    "maxItems",
    "maxProperties",
];
const RANGE_PAIRS: &[(&str, &str, bool)] = &[
    ("minimum", "maximum", false),
    ("exclusiveMinimum", "maximum", true),
    ("minimum", "exclusiveMaximum", true),
    ("exclusiveMinimum", "exclusiveMaximum", true),
    ("minLength", "maxLength", false),
    ("minItems", "maxItems", false),
    ("minProperties", "maxProperties", false),
];
const CONDITIONAL_KEYS: &[&str] = &["if", "then", "else"];

/// Fold the `allOf` members of `schema` into one schema.
///
/// Returns the schema unchanged when it has no `allOf`.
pub fn merge_all_of(schema: &Value, path: &str) -> Result<Value, BuildError> {
    let Some(obj) = schema.as_object() else {
        return Ok(schema.clone());
    };
    let Some(members) = obj.get("allOf").and_then(Value::as_array) else {
        return Ok(schema.clone());
    };

    let parent_type = declared_type(schema).map(str::to_owned);
    let mut acc = obj.clone();
    acc.remove("allOf");
    let mut conditionals = Vec::new();

    for (index, member) in members.iter().enumerate() {
        let member_path = format!("{}/allOf/{}", path, index);
        let merged = merge_all_of(member, &member_path)?;
        let Value::Object(mut member_obj) = merged else {
            continue;
        };

        if let (Some(parent), Some(member_type)) =
            (parent_type.as_deref(), declared_type(&Value::Object(member_obj.clone())))
        {
            if !types_compatible(parent, member_type) {
                return Err(BuildError::CompositionTypeRedefinition {
                    path: member_path,
                    parent: parent.to_string(),
                    member: member_type.to_string(),
                });
            }
        }

        let mut conditional = Map::new();
        for key in CONDITIONAL_KEYS {
            if let Some(v) = member_obj.remove(*key) {
                conditional.insert((*key).to_string(), v);
            }
        }
        if conditional.contains_key("if") {
            conditionals.push(Value::Object(conditional));
        }
        if let Some(Value::Array(nested)) = member_obj.remove("allOf") {
            conditionals.extend(nested);
        }

        intersect(&mut acc, &member_obj, &member_path)?;
    }

    if !conditionals.is_empty() {
        acc.insert("allOf".to_string(), Value::Array(conditionals));
    }
    check_ranges(&acc, path)?;
    Ok(Value::Object(acc))
}

fn types_compatible(a: &str, b: &str) -> bool {
    a == b || matches!((a, b), ("number", "integer") | ("integer", "number"))
}

/// Intersect `other` into `acc`.
fn intersect(acc: &mut Map<String, Value>, other: &Map<String, Value>, path: &str) -> Result<(), BuildError> {
    for (key, value) in other {
        match key.as_str() {
            "type" => {
                let merged = match acc.get("type") {
                    Some(existing) => intersect_types(existing, value, path)?,
                    None => value.clone(),
                };
                acc.insert(key.clone(), merged);
            }
            "const" => {
                if let Some(existing) = acc.get("const") {
                    if existing != value {
                        return Err(BuildError::AllOfConstConflict {
                            path: path.to_string(),
                            left: existing.clone(),
                            right: value.clone(),
                        });
                    }
                }
                if let Some(Value::Array(variants)) = acc.get("enum") {
                    if !variants.contains(value) {
                        return Err(BuildError::AllOfConstConflict {
                            path: path.to_string(),
                            left: Value::Array(variants.clone()),
                            right: value.clone(),
                        });
                    }
                }
                acc.insert(key.clone(), value.clone());
            }
            "enum" => {
                let Some(incoming) = value.as_array() else {
                    continue;
                };
                let merged: Vec<Value> = match acc.get("enum").and_then(Value::as_array) {
                    Some(existing) => existing
                        .iter()
                        .filter(|v| incoming.contains(v))
                        .cloned()
                        .collect(),
                    None => incoming.clone(),
                };
                if merged.is_empty() {
                    return Err(BuildError::AllOfEmptyEnum {
                        path: path.to_string(),
                    });
                }
                if let Some(constant) = acc.get("const") {
                    if !merged.contains(constant) {
                        return Err(BuildError::AllOfConstConflict {
                            path: path.to_string(),
                            left: constant.clone(),
                            right: Value::Array(merged),
                        });
                    }
                }
                acc.insert(key.clone(), Value::Array(merged));
            }
            "required" => {
                let mut merged = acc
                    .get("required")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for name in value.as_array().into_iter().flatten() {
                    if !merged.contains(name) {
                        merged.push(name.clone());
                    }
                }
                acc.insert(key.clone(), Value::Array(merged));
            }
            "properties" => {
                let Some(incoming) = value.as_object() else {
                    continue;
                };
                let mut merged = acc
                    .get("properties")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                for (name, prop) in incoming {
                    let prop_path = format!("{}/properties/{}", path, name);
                    match (merged.get_mut(name), prop.as_object()) {
                        (Some(Value::Object(existing)), Some(prop_obj)) => {
                            intersect(existing, prop_obj, &prop_path)?;
                            check_ranges(existing, &prop_path)?;
                        }
                        (Some(_), _) => {}
                        (None, _) => {
                            merged.insert(name.clone(), prop.clone());
                        }
                    }
                }
                acc.insert(key.clone(), Value::Object(merged));
            }
            k if LOWER_BOUNDS.contains(&k) => tighten(acc, key, value, f64::max),
            k if UPPER_BOUNDS.contains(&k) => tighten(acc, key, value, f64::min),
            // First declaration wins for descriptive and unknown keywords.
            _ => {
                acc.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    Ok(())
}

fn tighten(acc: &mut Map<String, Value>, key: &str, value: &Value, pick: fn(f64, f64) -> f64) {
    let merged = match (acc.get(key).and_then(Value::as_f64), value.as_f64()) {
        (Some(a), Some(b)) => {
            let chosen = pick(a, b);
            if chosen == a {
                acc[key].clone()
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    };
    acc.insert(key.to_string(), merged);
}

fn type_set(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn intersect_types(left: &Value, right: &Value, path: &str) -> Result<Value, BuildError> {
    let a = type_set(left);
    let b = type_set(right);
    let mut common = Vec::new();
    for ta in &a {
        for tb in &b {
            let meet = if ta == tb {
                Some(ta.clone())
            } else if types_compatible(ta, tb) {
                Some("integer".to_string())
            } else {
                None
            };
            if let Some(t) = meet {
                if !common.contains(&t) {
                    common.push(t);
                }
            }
        }
    }
    match common.len() {
        0 => Err(BuildError::AllOfTypeConflict {
            path: path.to_string(),
            left: a.join("|"),
            right: b.join("|"),
        }),
        1 => Ok(Value::String(common.remove(0))),
        _ => Ok(Value::Array(common.into_iter().map(Value::String).collect())),
    }
}

fn check_ranges(schema: &Map<String, Value>, path: &str) -> Result<(), BuildError> {
    for (lower_key, upper_key, exclusive) in RANGE_PAIRS {
        let (Some(lower), Some(upper)) = (
            schema.get(*lower_key).and_then(Value::as_f64),
            schema.get(*upper_key).and_then(Value::as_f64),
        ) else {
            continue;
        };
        let empty = if *exclusive {
            lower >= upper
        } else {
            lower > upper
        };
        if empty {
            return Err(BuildError::AllOfInvalidRange {
                path: path.to_string(),
                lower: format!("{}={}", lower_key, schema[*lower_key]),
                upper: format!("{}={}", upper_key, schema[*upper_key]),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_without_all_of_is_untouched() {
        let schema = json!({"type": "string", "title": "A"});
        assert_eq!(merge_all_of(&schema, "").unwrap(), schema);
    }

    #[test]
    fn members_are_intersected() {
        let schema = json!({
            "type": "object",
            "title": "Parent",
            "required": ["a"],
            "allOf": [
                {"title": "Ignored", "required": ["b"], "properties": {"a": {"type": "number", "minimum": 1}}},
                {"required": ["a", "c"], "properties": {"a": {"type": "integer", "minimum": 3, "maximum": 9}, "b": {"type": "string"}}}
            ]
        });
        let merged = merge_all_of(&schema, "").unwrap();
        assert_eq!(merged["title"], "Parent");
        assert_eq!(merged["required"], json!(["a", "b", "c"]));
        assert_eq!(merged["properties"]["a"]["type"], "integer");
        assert_eq!(merged["properties"]["a"]["minimum"], 3);
        assert_eq!(merged["properties"]["a"]["maximum"], 9);
        assert_eq!(merged["properties"]["b"]["type"], "string");
        assert!(merged.get("allOf").is_none());
    }

    #[test]
    fn member_type_must_match_parent() {
        let schema = json!({"type": "object", "allOf": [{"type": "string"}]});
        let err = merge_all_of(&schema, "").unwrap_err();
        assert_eq!(err.code(), "COMPOSITION_TYPE_REDEFINITION");
        assert_eq!(err.path(), "/allOf/0");
    }

    #[test]
    fn members_with_conflicting_types_fail() {
        let schema = json!({"allOf": [{"type": "string"}, {"type": "boolean"}]});
        assert_eq!(
            merge_all_of(&schema, "").unwrap_err().code(),
            "ALL_OF_TYPE_CONFLICT"
        );
    }

    #[test]
    fn conflicting_consts_fail() {
        let schema = json!({"allOf": [{"const": "a"}, {"const": "b"}]});
        assert_eq!(
            merge_all_of(&schema, "").unwrap_err().code(),
            "ALL_OF_CONST_CONFLICT"
        );
    }

    #[test]
    fn disjoint_enums_fail() {
        let schema = json!({"allOf": [{"enum": ["a", "b"]}, {"enum": ["c"]}]});
        assert_eq!(
            merge_all_of(&schema, "").unwrap_err().code(),
            "ALL_OF_EMPTY_ENUM"
        );
        let schema = json!({"allOf": [{"enum": ["a", "b"]}, {"enum": ["b", "c"]}]});
        assert_eq!(merge_all_of(&schema, "").unwrap()["enum"], json!(["b"]));
    }

    #[test]
    fn empty_numeric_range_fails() {
        let schema = json!({"allOf": [{"minimum": 10}, {"maximum": 5}]});
        assert_eq!(
            merge_all_of(&schema, "").unwrap_err().code(),
            "ALL_OF_INVALID_RANGE"
        );
    }

    #[test]
    fn conditionals_are_preserved() {
        let schema = json!({
            "type": "object",
            "allOf": [
                {"if": {"properties": {"t": {"const": "x"}}}, "then": {"required": ["a"]}},
                {"properties": {"t": {"type": "string"}}}
            ]
        });
        let merged = merge_all_of(&schema, "").unwrap();
        let kept = merged["allOf"].as_array().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["then"]["required"], json!(["a"]));
        assert!(merged.get("if").is_none());
    }
}
