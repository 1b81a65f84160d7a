//! The live node tree.
//!
//! Nodes live in a [`Slab`] arena owned by [`FormTree`] and are addressed by
//! [`NodeId`] handles. Parents own their children through child slots;
//! children point back at their parent by id only.
//!
//! All mutation goes through `&mut FormTree`. A mutating call writes values,
//! re-aggregates ancestors, then drains the event queue (internal reactions
//! first-come first-served, external listeners inline) and finally runs root
//! validation, all before it returns.

mod array;
mod builder;
mod errors;
mod find;
mod reactive;
mod terminal;
mod value;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use slab::Slab;
use tracing::warn;

use crate::config::TreeConfig;
use crate::event::{
    EventKind, EventKinds, Listener, ListenerEntry, NodeEvent, Reaction, Subscription,
};
use crate::expression::{CompiledExpression, ComputedProperties, ComputedState, DependencyRegistry};
use crate::pointer::to_data_path;
use crate::renderer::RendererRegistry;
use crate::schema::branch::{BranchStrategy, Salt};
use crate::schema::{NodeGroup, NodeType};
use crate::validation::{JsonSchemaError, Validator, ValidatorFactory};

pub use builder::{ChangeCallback, TreeBuilder};

/// Upper bound on events drained by one mutating call.
const MAX_EVENTS_PER_SETTLE: usize = 100_000;

/// Handle of a node in its tree.
///
/// Arena slots are reused once a node is destroyed; the generation keeps a
/// handle to the destroyed node from resolving to the slot's new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// Interaction flags of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// The value changed at least once through a write.
    pub dirty: bool,
    /// The user interacted with the node.
    pub touched: bool,
    /// Explicit override of error display.
    pub show_error: Option<bool>,
}

/// A child association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub node: NodeId,
    /// The child is a virtual node (or, on a virtual node, a referenced field).
    pub is_virtual: bool,
    /// Set on children that belong to a `oneOf` branch.
    pub salt: Option<Salt>,
}

// ──────────────────────────────────────────────
// Node storage
// ──────────────────────────────────────────────

pub(crate) struct ObjectData {
    pub strategy: BranchStrategy,
    /// allOf-merged schema, still carrying its composition keywords.
    pub source_schema: Value,
    /// `properties`, then `anyOf` properties, then virtual fields.
    pub base_children: Vec<ChildSlot>,
    /// Children of every `oneOf` branch, attached or not.
    pub branch_children: Vec<Vec<ChildSlot>>,
    pub branch_guards: Vec<Option<CompiledExpression>>,
    pub one_of_index: Option<usize>,
    pub static_required: Vec<String>,
    pub required_guards: BTreeMap<String, Vec<CompiledExpression>>,
}

pub(crate) struct ArrayData {
    pub items: Value,
}

pub(crate) struct VirtualData {
    pub fields: Vec<String>,
}

pub(crate) enum NodeKind {
    Terminal,
    Object(Box<ObjectData>),
    Array(ArrayData),
    Virtual(VirtualData),
}

pub(crate) struct NodeData {
    pub generation: u64,
    pub name: String,
    pub path: String,
    pub parent: Option<NodeId>,
    pub node_type: NodeType,
    pub group: NodeGroup,
    pub integer: bool,
    pub schema: Value,
    pub value: Option<Value>,
    pub default_value: Option<Value>,
    pub children: Vec<ChildSlot>,
    pub kind: NodeKind,
    pub attached: bool,
    pub registry: DependencyRegistry,
    pub dep_values: Vec<Option<Value>>,
    pub computed: ComputedProperties,
    pub computed_state: ComputedState,
    pub watch_values: Vec<Option<Value>>,
    pub required: bool,
    pub virtual_required: bool,
    pub state: NodeState,
    pub local_errors: Vec<JsonSchemaError>,
    pub external_errors: Vec<JsonSchemaError>,
    pub listeners: Vec<ListenerEntry>,
}

impl NodeData {
    fn merged_errors(&self) -> Vec<JsonSchemaError> {
        self.external_errors
            .iter()
            .chain(self.local_errors.iter())
            .cloned()
            .collect()
    }
}

// ──────────────────────────────────────────────
// Read-only view
// ──────────────────────────────────────────────

/// Borrowed view of one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    id: NodeId,
    data: &'a NodeData,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Property name or array index; empty for the root.
    pub fn name(&self) -> &'a str {
        &self.data.name
    }

    /// Absolute JSON pointer.
    pub fn path(&self) -> &'a str {
        &self.data.path
    }

    /// Dotted form of [`path`](Self::path), as used by error `data_path`s.
    pub fn data_path(&self) -> String {
        to_data_path(&self.data.path)
    }

    pub fn node_type(&self) -> NodeType {
        self.data.node_type
    }

    pub fn group(&self) -> NodeGroup {
        self.data.group
    }

    /// Effective schema, with `allOf` merged and the active branch folded in.
    pub fn json_schema(&self) -> &'a Value {
        &self.data.schema
    }

    /// Current value; `None` is undefined.
    pub fn value(&self) -> Option<&'a Value> {
        self.data.value.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.data.parent
    }

    /// Live children. For a virtual node: the fields it aggregates.
    pub fn children(&self) -> &'a [ChildSlot] {
        &self.data.children
    }

    pub fn one_of_index(&self) -> Option<usize> {
        match &self.data.kind {
            NodeKind::Object(obj) => obj.one_of_index,
            _ => None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.data.required
    }

    pub fn is_virtual_required(&self) -> bool {
        self.data.virtual_required
    }

    pub fn computed(&self) -> ComputedState {
        self.data.computed_state
    }

    pub fn watch_values(&self) -> &'a [Option<Value>] {
        &self.data.watch_values
    }

    /// Dependency pointers, in slot order.
    pub fn dependencies(&self) -> &'a [String] {
        self.data.registry.paths()
    }

    pub fn state(&self) -> NodeState {
        self.data.state
    }

    /// External errors followed by validator errors.
    pub fn errors(&self) -> Vec<JsonSchemaError> {
        self.data.merged_errors()
    }

    pub fn local_errors(&self) -> &'a [JsonSchemaError] {
        &self.data.local_errors
    }

    pub fn external_errors(&self) -> &'a [JsonSchemaError] {
        &self.data.external_errors
    }

    /// Whether the node is part of the live tree (not in an inactive branch).
    pub fn is_attached(&self) -> bool {
        self.data.attached
    }

    pub fn is_root(&self) -> bool {
        self.data.parent.is_none()
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("path", &self.data.path)
            .field("type", &self.data.node_type)
            .field("value", &self.data.value)
            .finish()
    }
}

// ──────────────────────────────────────────────
// Tree
// ──────────────────────────────────────────────

/// A live form tree built from one schema.
pub struct FormTree {
    nodes: Slab<NodeData>,
    root: NodeId,
    config: TreeConfig,
    renderers: RendererRegistry,
    validator_factory: Box<dyn ValidatorFactory>,
    validator_cache: Option<(Value, Box<dyn Validator>)>,
    global_errors: Vec<JsonSchemaError>,
    queue: VecDeque<(NodeId, NodeEvent)>,
    next_listener_id: u64,
    next_error_key: u64,
    next_generation: u64,
    ready: bool,
    settling: bool,
    needs_validation: bool,
    on_change: Option<ChangeCallback>,
    last_reported: Option<Value>,
}

impl FormTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// View of a node, or `None` if the id is stale.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.data(id).map(|data| NodeRef { id, data })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.data(id).is_some()
    }

    /// Number of nodes in the arena, including detached branch nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.data(id).and_then(|d| d.value.as_ref())
    }

    pub fn root_value(&self) -> Option<&Value> {
        self.value(self.root)
    }

    /// Live nodes in depth-first pre-order.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_live(self.root, &mut out);
        out
    }

    fn collect_live(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for child in self.live_children(id) {
            self.collect_live(child, out);
        }
    }

    // -- Internal accessors -------------------------------------

    pub(crate) fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes
            .get(id.index)
            .filter(|data| data.generation == id.generation)
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes
            .get_mut(id.index)
            .filter(|data| data.generation == id.generation)
    }

    /// Store a node under a fresh generation.
    pub(crate) fn insert_node(&mut self, mut data: NodeData) -> NodeId {
        let generation = self.next_generation;
        self.next_generation += 1;
        data.generation = generation;
        NodeId {
            index: self.nodes.insert(data),
            generation,
        }
    }

    /// Every node in the arena, attached or not.
    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|(index, data)| NodeId {
                index,
                generation: data.generation,
            })
            .collect()
    }

    /// Children this node owns and that are currently live. Virtual nodes
    /// reference fields they do not own, so they report none.
    pub(crate) fn live_children(&self, id: NodeId) -> Vec<NodeId> {
        match self.data(id) {
            Some(data) if !matches!(data.kind, NodeKind::Virtual(_)) => {
                data.children.iter().map(|s| s.node).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Every child this node owns, including those of inactive branches.
    pub(crate) fn owned_children(&self, id: NodeId) -> Vec<NodeId> {
        match self.data(id).map(|d| &d.kind) {
            Some(NodeKind::Object(obj)) => obj
                .base_children
                .iter()
                .chain(obj.branch_children.iter().flatten())
                .map(|s| s.node)
                .collect(),
            Some(NodeKind::Array(_)) => self
                .data(id)
                .map(|d| d.children.iter().map(|s| s.node).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    // -- State --------------------------------------------------

    pub fn set_touched(&mut self, id: NodeId, touched: bool) {
        self.update_state(id, |s| s.touched = touched);
        self.settle();
    }

    pub fn set_show_error(&mut self, id: NodeId, show_error: Option<bool>) {
        self.update_state(id, |s| s.show_error = show_error);
        self.settle();
    }

    /// Reset the state flags of `id` and its live descendants.
    pub fn clear_state(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.update_state(current, |s| *s = NodeState::default());
            stack.extend(self.live_children(current));
        }
        self.settle();
    }

    pub(crate) fn update_state(&mut self, id: NodeId, f: impl FnOnce(&mut NodeState)) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        let before = data.state;
        f(&mut data.state);
        let after = data.state;
        if before != after {
            self.emit(id, NodeEvent::StateChanged(after));
        }
    }

    // -- Subscriptions ------------------------------------------

    /// Subscribe to every event of `id`.
    pub fn subscribe(
        &mut self,
        id: NodeId,
        listener: impl FnMut(NodeId, &NodeEvent) + 'static,
    ) -> Option<Subscription> {
        self.subscribe_to(id, EventKinds::all(), listener)
    }

    /// Subscribe to the events of `id` whose kind is in `kinds`.
    pub fn subscribe_to(
        &mut self,
        id: NodeId,
        kinds: EventKinds,
        listener: impl FnMut(NodeId, &NodeEvent) + 'static,
    ) -> Option<Subscription> {
        self.add_listener(id, kinds, Listener::External(Box::new(listener)))
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let Some(data) = self.data_mut(subscription.node) else {
            return false;
        };
        let before = data.listeners.len();
        data.listeners.retain(|e| e.id != subscription.id);
        before != data.listeners.len()
    }

    pub(crate) fn add_listener(
        &mut self,
        id: NodeId,
        kinds: EventKinds,
        listener: Listener,
    ) -> Option<Subscription> {
        let listener_id = self.next_listener_id;
        let data = self.data_mut(id)?;
        data.listeners.push(ListenerEntry {
            id: listener_id,
            kinds,
            listener,
        });
        self.next_listener_id += 1;
        Some(Subscription {
            node: id,
            id: listener_id,
        })
    }

    // -- Event queue --------------------------------------------

    /// Queue an event. Nothing is published before the tree is ready.
    pub(crate) fn emit(&mut self, id: NodeId, event: NodeEvent) {
        if !self.ready {
            return;
        }
        if event.kind() == EventKind::ValueChanged {
            self.needs_validation = true;
        }
        self.queue.push_back((id, event));
    }

    /// Drain the queue, validate if needed, and report root changes.
    pub(crate) fn settle(&mut self) {
        if self.settling || !self.ready {
            return;
        }
        self.settling = true;

        self.drain_queue();
        if self.needs_validation {
            self.needs_validation = false;
            if self.config.validation_mode == crate::config::ValidationMode::OnChange {
                self.run_validation();
                self.drain_queue();
            }
        }
        self.report_change();

        self.settling = false;
    }

    fn drain_queue(&mut self) {
        let mut processed = 0usize;
        while let Some((id, event)) = self.queue.pop_front() {
            processed += 1;
            if processed > MAX_EVENTS_PER_SETTLE {
                warn!(
                    remaining = self.queue.len(),
                    "event limit reached, dropping queued events (cyclic computed properties?)"
                );
                self.queue.clear();
                break;
            }
            self.dispatch(id, event);
        }
    }

    fn dispatch(&mut self, id: NodeId, event: NodeEvent) {
        let kind = event.kind();
        let mut reactions = Vec::new();
        if let Some(data) = self.data_mut(id) {
            for entry in data.listeners.iter_mut() {
                if !entry.kinds.contains(kind) {
                    continue;
                }
                match &mut entry.listener {
                    Listener::External(callback) => callback(id, &event),
                    Listener::Dependency { dependent, slot } => {
                        if let NodeEvent::ValueChanged { current, .. } = &event {
                            reactions.push(Reaction::Dependency {
                                dependent: *dependent,
                                slot: *slot,
                                value: current.clone(),
                            });
                        }
                    }
                    Listener::Virtual { owner } => {
                        reactions.push(Reaction::Virtual { owner: *owner })
                    }
                }
            }
        }
        for reaction in reactions {
            self.react(reaction);
        }
    }

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Dependency {
                dependent,
                slot,
                value,
            } => {
                let Some(data) = self.data_mut(dependent) else {
                    return;
                };
                if !data.attached {
                    return;
                }
                match data.dep_values.get_mut(slot) {
                    Some(cached) if *cached != value => *cached = value,
                    _ => return,
                }
                self.recompute(dependent);
            }
            Reaction::Virtual { owner } => {
                self.refresh_virtual(owner);
            }
        }
    }

    fn report_change(&mut self) {
        let current = self.root_value().cloned();
        if current == self.last_reported {
            return;
        }
        self.last_reported = current;
        if let Some(callback) = self.on_change.as_mut() {
            callback(self.last_reported.as_ref());
        }
    }
}

impl std::fmt::Debug for FormTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormTree")
            .field("nodes", &self.nodes.len())
            .field("root_value", &self.root_value())
            .field("config", &self.config)
            .finish()
    }
}
