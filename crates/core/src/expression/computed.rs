//! Computed node properties: `visible`, `active`, `readOnly`, `disabled`
//! and `watch`, all compiled from one schema into one registry.

use serde::Serialize;
use serde_json::Value;

use super::{compile_at, CompiledExpression, DependencyRegistry};
use crate::error::BuildError;
use crate::schema::string_list;

/// Where a boolean property comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedSource {
    Constant(bool),
    Expression(CompiledExpression),
}

impl ComputedSource {
    fn evaluate(&self, deps: &[Option<Value>]) -> bool {
        match self {
            ComputedSource::Constant(b) => *b,
            ComputedSource::Expression(expr) => expr.test(deps),
        }
    }
}

/// Current values of the boolean gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputedState {
    pub visible: bool,
    pub active: bool,
    pub read_only: bool,
    pub disabled: bool,
}

impl Default for ComputedState {
    fn default() -> Self {
        ComputedState {
            visible: true,
            active: true,
            read_only: false,
            disabled: false,
        }
    }
}

impl ComputedState {
    /// Whether the node takes part in its parent's value.
    pub fn is_shown(&self) -> bool {
        self.visible && self.active
    }
}

/// Compiled computed properties of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedProperties {
    pub visible: Option<ComputedSource>,
    pub active: Option<ComputedSource>,
    pub read_only: Option<ComputedSource>,
    pub disabled: Option<ComputedSource>,
    pub watch: Vec<CompiledExpression>,
}

impl ComputedProperties {
    /// Compile every computed property declared on `schema`.
    pub fn compile(
        schema: &Value,
        registry: &mut DependencyRegistry,
        path: &str,
    ) -> Result<Self, BuildError> {
        let computed = schema.get("computed");
        let mut source = |name: &str, legacy: &str, plain: Option<&str>| {
            let raw = computed
                .and_then(|c| c.get(name))
                .or_else(|| schema.get(legacy))
                .or_else(|| plain.and_then(|p| schema.get(p)));
            match raw {
                Some(Value::Bool(b)) => Ok(Some(ComputedSource::Constant(*b))),
                Some(Value::String(src)) => {
                    let at = format!("{}/computed/{}", path, name);
                    compile_at(src, registry, &at).map(|e| Some(ComputedSource::Expression(e)))
                }
                _ => Ok(None),
            }
        };

        let visible = source("visible", "&visible", None)?;
        let active = source("active", "&active", None)?;
        let read_only = source("readOnly", "&readOnly", Some("readOnly"))?;
        let disabled = source("disabled", "&disabled", Some("disabled"))?;

        let watch_sources = string_list(
            computed
                .and_then(|c| c.get("watch"))
                .or_else(|| schema.get("options").and_then(|o| o.get("watch"))),
        );
        let mut watch = Vec::with_capacity(watch_sources.len());
        for (i, src) in watch_sources.iter().enumerate() {
            let at = format!("{}/computed/watch/{}", path, i);
            watch.push(compile_at(src, registry, &at)?);
        }

        Ok(ComputedProperties {
            visible,
            active,
            read_only,
            disabled,
            watch,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_none()
            && self.active.is_none()
            && self.read_only.is_none()
            && self.disabled.is_none()
            && self.watch.is_empty()
    }

    /// Evaluate the boolean gates.
    pub fn evaluate(&self, deps: &[Option<Value>]) -> ComputedState {
        let gate = |source: &Option<ComputedSource>, default: bool| {
            source.as_ref().map_or(default, |s| s.evaluate(deps))
        };
        ComputedState {
            visible: gate(&self.visible, true),
            active: gate(&self.active, true),
            read_only: gate(&self.read_only, false),
            disabled: gate(&self.disabled, false),
        }
    }

    /// Raw values of the watched expressions.
    pub fn watch_values(&self, deps: &[Option<Value>]) -> Vec<Option<Value>> {
        self.watch.iter().map(|w| w.evaluate(deps)).collect()
    }
}
