//! `if/then/else` flattening.
//!
//! Nested conditionals become a flat list of guards. Each guard names the
//! fields it makes required, the field values that must all match, and the
//! earlier `if`s of its `else` chain that must not hold. Guards compile
//! straight to expressions over the object's children, so property names
//! never pass through the expression lexer.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::required;
use crate::expression::{CompareOp, CompiledExpression, DependencyRegistry, Expr};
use crate::pointer::escape_segment;

/// Keywords of an `if` (or of one of its properties) that constrain nothing.
const ANNOTATIONS: [&str; 3] = ["title", "description", "$comment"];

/// What one field must satisfy inside a guard.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// Listed in the `if`'s `required`: the field must be defined.
    Present,
    /// `const`: the field must equal the value.
    Equals(Value),
    /// `enum`: the field must be one of the values.
    OneOf(Vec<Value>),
}

impl Expected {
    /// Both expectations at once, or `None` when no value satisfies them.
    fn intersect(&self, other: &Expected) -> Option<Expected> {
        let values: Vec<Value> = match (self, other) {
            (Expected::Present, e) | (e, Expected::Present) => return Some(e.clone()),
            (a, b) => {
                let theirs = b.values();
                a.values().into_iter().filter(|v| theirs.contains(v)).collect()
            }
        };
        match values.len() {
            0 => None,
            1 => values.into_iter().next().map(Expected::Equals),
            _ => Some(Expected::OneOf(values)),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Expected::Present => Vec::new(),
            Expected::Equals(v) => vec![v.clone()],
            Expected::OneOf(vs) => vs.clone(),
        }
    }
}

/// Field expectations that must all hold.
pub type Condition = BTreeMap<String, Expected>;

/// One flattened guard: `condition` holds and no `excluded` condition
/// holds in full. `inverse` marks guards taken from an `else`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedCondition {
    pub condition: Condition,
    pub excluded: Vec<Condition>,
    pub required: Vec<String>,
    pub inverse: bool,
}

impl FlattenedCondition {
    /// Readable form of the guard, e.g. `./type === "company"`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.condition.is_empty() {
            parts.push(describe_condition(&self.condition));
        }
        for excluded in &self.excluded {
            parts.push(format!("!({})", describe_condition(excluded)));
        }
        if parts.is_empty() {
            return "true".to_string();
        }
        parts.join(" && ")
    }

    /// Build the guard over the owning object's children, registering one
    /// `./<field>` dependency per tested field.
    pub fn compile(&self, registry: &mut DependencyRegistry) -> CompiledExpression {
        let mut expr = conjunction(&self.condition, registry);
        for excluded in &self.excluded {
            let negated = Expr::Not(Box::new(conjunction(excluded, registry)));
            expr = and(expr, negated);
        }
        CompiledExpression::from_expr(self.describe(), expr)
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    all: Condition,
    none: Vec<Condition>,
}

/// Flatten the conditionals of `schema`, including conditional-only
/// members of `allOf`.
pub fn flatten_conditions(schema: &Value) -> Vec<FlattenedCondition> {
    let mut out = Vec::new();
    let root = Scope::default();
    walk(schema, &root, &mut out);
    for member in schema.get("allOf").and_then(Value::as_array).into_iter().flatten() {
        walk(member, &root, &mut out);
    }
    out
}

fn walk(schema: &Value, scope: &Scope, out: &mut Vec<FlattenedCondition>) {
    let mut excluded = scope.none.clone();
    let mut current = schema;

    while let Some(if_schema) = current.get("if") {
        let Some(condition) = extract_condition(if_schema) else {
            // Neither branch of this `if`, nor any later `else`, can be guarded.
            debug!("skipping conditional whose `if` tests more than const, enum and required");
            return;
        };

        match conjoin(&scope.all, &condition) {
            Some(all) => {
                let guard = Scope {
                    all,
                    none: excluded.clone(),
                };
                if let Some(then) = current.get("then") {
                    push(out, &guard, required(then), false);
                    walk(then, &guard, out);
                }
            }
            None => debug!("skipping `then` whose guard contradicts an enclosing `if`"),
        }

        let Some(otherwise) = current.get("else") else {
            return;
        };
        excluded.push(condition);
        let guard = Scope {
            all: scope.all.clone(),
            none: excluded.clone(),
        };
        push(out, &guard, required(otherwise), true);
        current = otherwise;
    }
}

fn push(out: &mut Vec<FlattenedCondition>, guard: &Scope, required: Vec<String>, inverse: bool) {
    if required.is_empty() {
        return;
    }
    out.push(FlattenedCondition {
        condition: guard.all.clone(),
        excluded: guard.none.clone(),
        required,
        inverse,
    });
}

/// Read an `if` made of per-property `const`/`enum` tests and a `required`
/// list. Anything else yields `None`.
fn extract_condition(if_schema: &Value) -> Option<Condition> {
    let map = match if_schema {
        Value::Bool(true) => return Some(Condition::new()),
        Value::Object(map) => map,
        _ => return None,
    };
    let mut condition = Condition::new();
    for (keyword, value) in map {
        match keyword.as_str() {
            "properties" => {
                for (field, constraint) in value.as_object()? {
                    if let Some(expected) = field_expectation(constraint)? {
                        condition.insert(field.clone(), expected);
                    }
                }
            }
            "required" | "type" => {}
            k if ANNOTATIONS.contains(&k) => {}
            _ => return None,
        }
    }
    for field in required(if_schema) {
        condition.entry(field).or_insert(Expected::Present);
    }
    Some(condition)
}

/// `Some(None)` for a property the `if` leaves unconstrained, `None` for
/// one it constrains in a way guards cannot express.
fn field_expectation(constraint: &Value) -> Option<Option<Expected>> {
    let map = match constraint {
        Value::Bool(true) => return Some(None),
        Value::Object(map) => map,
        _ => return None,
    };
    let mut equals = None;
    let mut one_of = None;
    let mut typed = false;
    for (keyword, value) in map {
        match keyword.as_str() {
            "const" => equals = Some(value.clone()),
            "enum" => one_of = Some(value.as_array()?.clone()),
            "type" => typed = true,
            k if ANNOTATIONS.contains(&k) => {}
            _ => return None,
        }
    }
    match (equals, one_of) {
        (Some(v), _) => Some(Some(Expected::Equals(v))),
        (None, Some(vs)) => Some(Some(Expected::OneOf(vs))),
        // A bare `type` test rejects present values of other types.
        (None, None) if typed => None,
        (None, None) => Some(None),
    }
}

/// Conjoin an enclosing guard with a nested `if`. `None` when a field is
/// asked to take values from disjoint sets.
fn conjoin(outer: &Condition, inner: &Condition) -> Option<Condition> {
    let mut merged = outer.clone();
    for (field, expected) in inner {
        let next = match merged.get(field) {
            Some(existing) => existing.intersect(expected)?,
            None => expected.clone(),
        };
        merged.insert(field.clone(), next);
    }
    Some(merged)
}

/// Per-field guard expressions in readable form. A field is required when
/// any of its guards holds.
pub fn conditions_map(conditions: &[FlattenedCondition]) -> BTreeMap<String, Vec<String>> {
    guards_by_field(conditions)
        .into_iter()
        .map(|(field, guards)| {
            let mut sources: Vec<String> = Vec::new();
            for source in guards.iter().map(FlattenedCondition::describe) {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
            (field, sources)
        })
        .collect()
}

/// Group guards by the field they make required.
pub fn guards_by_field(conditions: &[FlattenedCondition]) -> BTreeMap<String, Vec<FlattenedCondition>> {
    let mut map: BTreeMap<String, Vec<FlattenedCondition>> = BTreeMap::new();
    for flattened in conditions {
        for field in &flattened.required {
            let entry = map.entry(field.clone()).or_default();
            if !entry.contains(flattened) {
                entry.push(flattened.clone());
            }
        }
    }
    map
}

fn target_path(field: &str) -> String {
    format!("./{}", escape_segment(field))
}

fn conjunction(condition: &Condition, registry: &mut DependencyRegistry) -> Expr {
    let mut expr = Expr::Literal(Some(Value::Bool(true)));
    for (field, expected) in condition {
        let term = term(field, expected, registry);
        expr = and(expr, term);
    }
    expr
}

fn and(left: Expr, right: Expr) -> Expr {
    if left == Expr::Literal(Some(Value::Bool(true))) {
        return right;
    }
    Expr::And(Box::new(left), Box::new(right))
}

fn term(field: &str, expected: &Expected, registry: &mut DependencyRegistry) -> Expr {
    let slot = registry.register(&target_path(field));
    let compare = |op, value: Option<Value>| Expr::Compare {
        op,
        left: Box::new(Expr::Dependency(slot)),
        right: Box::new(Expr::Literal(value)),
    };
    match expected {
        Expected::Present => compare(CompareOp::StrictNe, None),
        Expected::Equals(v) => compare(CompareOp::StrictEq, Some(v.clone())),
        Expected::OneOf(values) => Expr::Call {
            object: Box::new(Expr::Array(
                values.iter().map(|v| Expr::Literal(Some(v.clone()))).collect(),
            )),
            method: "includes".to_string(),
            args: vec![Expr::Dependency(slot)],
        },
    }
}

fn describe_condition(condition: &Condition) -> String {
    if condition.is_empty() {
        return "true".to_string();
    }
    let literal = |v: &Value| v.to_string();
    condition
        .iter()
        .map(|(field, expected)| {
            let target = target_path(field);
            match expected {
                Expected::Present => format!("{} !== undefined", target),
                Expected::Equals(v) => format!("{} === {}", target, literal(v)),
                Expected::OneOf(values) => {
                    let items: Vec<String> = values.iter().map(literal).collect();
                    format!("[{}].includes({})", items.join(", "), target)
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" && ")
}
