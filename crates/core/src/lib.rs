//! schemaform-core: reactive JSON Schema form tree engine.
//!
//! Builds a live tree of nodes from a JSON Schema and a default value, keeps
//! the tree's value, structure and computed state consistent as values
//! change, and validates the aggregated value against the live schema.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`TreeBuilder`] -- configure and build a tree
//! - [`FormTree`] -- the live tree: reads, writes, lookups, subscriptions
//! - [`NodeId`] / [`NodeRef`] -- node handles and read-only views
//! - [`BuildError`] -- schema errors detected while building
//! - [`JsonSchemaError`] -- validation errors as distributed to nodes
//! - [`ValidatorFactory`] / [`Validator`] -- pluggable validation backend
//!
//! Schema preprocessing (`allOf` merging, `oneOf`/`anyOf` branch resolution,
//! `if/then/else` flattening) and the expression language are public as
//! modules for tooling that needs them without a tree.

pub mod config;
pub mod error;
pub mod event;
pub mod expression;
pub mod pointer;
pub mod renderer;
pub mod schema;
pub mod tree;
pub mod validation;

// ── Convenience re-exports ───────────────────────────────────────────

pub use config::{TreeConfig, ValidationMode};
pub use error::BuildError;
pub use event::{EventKind, EventKinds, NodeEvent, Subscription};
pub use expression::ComputedState;
pub use renderer::RendererRegistry;
pub use schema::branch::Salt;
pub use schema::{NodeGroup, NodeType};
pub use tree::{ChildSlot, FormTree, NodeId, NodeRef, NodeState, TreeBuilder};
pub use validation::{
    JsonSchemaError, JsonSchemaValidatorFactory, Validator, ValidatorError, ValidatorFactory,
};
