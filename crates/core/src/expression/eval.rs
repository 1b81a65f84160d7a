//! Expression interpreter.
//!
//! Evaluates an [`Expr`] against the dependency-value array of its owner.
//! Evaluation is total: missing dependencies, out-of-range indexes and
//! type mismatches all produce `undefined` (`None`) or `false` rather than
//! an error.

use serde_json::Value;

use super::parser::{number, CompareOp, Expr};

/// JavaScript-style truthiness.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Strict equality: numbers compare numerically, `undefined` only equals `undefined`.
pub fn strict_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn loose_equals(left: Option<&Value>, right: Option<&Value>) -> bool {
    let nullish = |v: Option<&Value>| matches!(v, None | Some(Value::Null));
    if nullish(left) || nullish(right) {
        return nullish(left) && nullish(right);
    }
    strict_equals(left, right)
}

pub fn evaluate(expr: &Expr, deps: &[Option<Value>]) -> Option<Value> {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| evaluate(item, deps).unwrap_or(Value::Null))
                .collect(),
        )),
        Expr::Dependency(slot) => deps.get(*slot).cloned().flatten(),
        Expr::Member { object, property } => {
            let target = evaluate(object, deps)?;
            member(&target, property)
        }
        Expr::Index { object, index } => {
            let target = evaluate(object, deps)?;
            match (target, evaluate(index, deps)?) {
                (Value::Array(items), Value::Number(n)) => {
                    let i = n.as_f64()?;
                    if i < 0.0 || i.fract() != 0.0 {
                        return None;
                    }
                    items.get(i as usize).cloned()
                }
                (Value::Object(map), Value::String(key)) => map.get(&key).cloned(),
                (target, Value::String(key)) => member(&target, &key),
                _ => None,
            }
        }
        Expr::Call {
            object,
            method,
            args,
        } => {
            let arg = args.first().and_then(|a| evaluate(a, deps));
            // Array literals keep `undefined` elements for membership tests;
            // materialized arrays hold them as `null`.
            if let (Expr::Array(items), "includes") = (object.as_ref(), method.as_str()) {
                let found = items
                    .iter()
                    .any(|item| strict_equals(evaluate(item, deps).as_ref(), arg.as_ref()));
                return Some(Value::Bool(found));
            }
            let target = evaluate(object, deps)?;
            call(&target, method, arg.as_ref())
        }
        Expr::Not(inner) => Some(Value::Bool(!truthy(evaluate(inner, deps).as_ref()))),
        Expr::Negate(inner) => {
            let n = evaluate(inner, deps)?.as_f64()?;
            Some(number(-n))
        }
        Expr::Compare { op, left, right } => {
            let l = evaluate(left, deps);
            let r = evaluate(right, deps);
            Some(Value::Bool(compare(*op, l.as_ref(), r.as_ref())))
        }
        Expr::And(left, right) => {
            let l = evaluate(left, deps);
            if !truthy(l.as_ref()) {
                return l;
            }
            evaluate(right, deps)
        }
        Expr::Or(left, right) => {
            let l = evaluate(left, deps);
            if truthy(l.as_ref()) {
                return l;
            }
            evaluate(right, deps)
        }
    }
}

fn member(target: &Value, property: &str) -> Option<Value> {
    match (target, property) {
        (Value::Array(items), "length") => Some(Value::from(items.len())),
        (Value::String(s), "length") => Some(Value::from(s.chars().count())),
        (Value::Object(map), key) => map.get(key).cloned(),
        _ => None,
    }
}

fn call(target: &Value, method: &str, arg: Option<&Value>) -> Option<Value> {
    let result = match (target, method) {
        (Value::Array(items), "includes") => items.iter().any(|item| strict_equals(Some(item), arg)),
        (Value::String(s), "includes") => arg.and_then(Value::as_str).is_some_and(|a| s.contains(a)),
        (Value::String(s), "startsWith") => {
            arg.and_then(Value::as_str).is_some_and(|a| s.starts_with(a))
        }
        (Value::String(s), "endsWith") => arg.and_then(Value::as_str).is_some_and(|a| s.ends_with(a)),
        _ => return None,
    };
    Some(Value::Bool(result))
}

fn compare(op: CompareOp, left: Option<&Value>, right: Option<&Value>) -> bool {
    match op {
        CompareOp::StrictEq => strict_equals(left, right),
        CompareOp::StrictNe => !strict_equals(left, right),
        CompareOp::LooseEq => loose_equals(left, right),
        CompareOp::LooseNe => !loose_equals(left, right),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let ordering = match (left, right) {
                (Some(Value::Number(a)), Some(Value::Number(b))) => {
                    a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b))
                }
                (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Lte => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
    }
}
