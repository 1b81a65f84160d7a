//! Declarative expression compiler.
//!
//! Schema extensions such as `computed.visible` carry small expressions that
//! read other nodes through pointers (`../mode === 'A'`). Compilation parses
//! the source into an [`Expr`], registering every distinct pointer once in
//! the owner's [`DependencyRegistry`]; the resulting [`CompiledExpression`]
//! is a pure function of the owner's dependency-value array, whose slot
//! order is the order of first appearance.
//!
//! Nothing here executes generated code: the grammar is restricted to
//! pointer reads, literals, member access, comparison, logical operators
//! and array membership.

pub mod computed;
pub mod eval;
pub mod lexer;
pub mod parser;

use serde_json::Value;

use crate::error::BuildError;

pub use computed::{ComputedProperties, ComputedSource, ComputedState};
pub use eval::{strict_equals, truthy};
pub use parser::{CompareOp, Expr};

/// Ordered, deduplicated list of dependency pointers for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyRegistry {
    paths: Vec<String>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, returning its slot. Already-known paths keep their slot.
    pub fn register(&mut self, path: &str) -> usize {
        if let Some(index) = self.paths.iter().position(|p| p == path) {
            return index;
        }
        self.paths.push(path.to_string());
        self.paths.len() - 1
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A parsed expression bound to slots of a [`DependencyRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    expr: Expr,
}

impl CompiledExpression {
    /// Wrap an expression built directly against a registry. `source` is
    /// only used for display.
    pub fn from_expr(source: impl Into<String>, expr: Expr) -> Self {
        CompiledExpression {
            source: source.into(),
            expr,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against the owner's dependency values. Never fails.
    pub fn evaluate(&self, deps: &[Option<Value>]) -> Option<Value> {
        eval::evaluate(&self.expr, deps)
    }

    /// Evaluate and normalize to a boolean.
    pub fn test(&self, deps: &[Option<Value>]) -> bool {
        truthy(self.evaluate(deps).as_ref())
    }
}

/// Error from [`compile`], with the character offset it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub offset: usize,
    pub message: String,
}

/// Compile `source`, registering its pointers in `registry`.
pub fn compile(source: &str, registry: &mut DependencyRegistry) -> Result<CompiledExpression, CompileError> {
    let tokens = lexer::lex(source).map_err(|e| CompileError {
        offset: e.offset,
        message: e.message,
    })?;
    // Parse against a scratch copy so a failed parse leaves no stray paths.
    let mut scratch = registry.clone();
    let expr = parser::Parser::new(&tokens, &mut scratch)
        .parse()
        .map_err(|e| CompileError {
            offset: e.offset,
            message: e.message,
        })?;
    *registry = scratch;
    Ok(CompiledExpression {
        source: source.to_string(),
        expr,
    })
}

/// [`compile`], reporting failures as a [`BuildError`] located at `path`.
pub fn compile_at(
    source: &str,
    registry: &mut DependencyRegistry,
    path: &str,
) -> Result<CompiledExpression, BuildError> {
    compile(source, registry).map_err(|e| BuildError::InvalidExpression {
        path: path.to_string(),
        source_text: source.to_string(),
        message: format!("{} at offset {}", e.message, e.offset),
    })
}
