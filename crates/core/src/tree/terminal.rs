//! Value coercion for terminal nodes.

use serde_json::Value;

use crate::expression::parser::number;
use crate::schema::NodeType;

/// Normalize a value written to a terminal of `node_type`.
///
/// `null` always passes through. Values that cannot be read as the node's
/// type become undefined.
pub(crate) fn coerce(node_type: NodeType, integer: bool, value: Option<Value>) -> Option<Value> {
    let value = value?;
    if value.is_null() {
        return Some(value);
    }
    match node_type {
        NodeType::String => match value {
            Value::String(_) => Some(value),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        NodeType::Number => {
            let n = match &value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite())?,
                _ => return None,
            };
            if integer {
                Some(number(n.trunc()))
            } else if matches!(value, Value::Number(_)) {
                Some(value)
            } else {
                Some(number(n))
            }
        }
        NodeType::Boolean => match value {
            Value::Bool(_) => Some(value),
            Value::String(s) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        NodeType::Null => None,
        NodeType::Object => value.is_object().then_some(value),
        NodeType::Array => value.is_array().then_some(value),
        NodeType::Virtual => Some(value),
    }
}
