use std::collections::{BTreeMap, VecDeque};

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{
    terminal, ArrayData, ChildSlot, FormTree, NodeData, NodeId, NodeKind, NodeState, ObjectData,
    VirtualData,
};
use crate::config::{TreeConfig, ValidationMode};
use crate::error::BuildError;
use crate::expression::{compile_at, ComputedProperties, ComputedState, DependencyRegistry};
use crate::pointer::join;
use crate::renderer::RendererRegistry;
use crate::schema::all_of::merge_all_of;
use crate::schema::conditions::{flatten_conditions, guards_by_field};
use crate::schema::{
    self, branch, empty_value, initial_value, is_integer, node_group, node_type, NodeGroup,
    NodeType,
};
use crate::validation::{JsonSchemaError, JsonSchemaValidatorFactory, ValidatorFactory};

/// Called with the root value whenever it changes.
pub type ChangeCallback = Box<dyn FnMut(Option<&Value>)>;

/// Configures and builds a [`FormTree`].
///
/// ```
/// use schemaform_core::TreeBuilder;
/// use serde_json::json;
///
/// let tree = TreeBuilder::new(json!({
///     "type": "object",
///     "properties": {"name": {"type": "string", "default": "Ada"}}
/// }))
/// .build()
/// .unwrap();
/// assert_eq!(tree.root_value(), Some(&json!({"name": "Ada"})));
/// ```
pub struct TreeBuilder {
    schema: Value,
    default_value: Option<Value>,
    config: TreeConfig,
    renderers: RendererRegistry,
    validator_factory: Box<dyn ValidatorFactory>,
    on_change: Option<ChangeCallback>,
    external_errors: Vec<JsonSchemaError>,
}

impl TreeBuilder {
    pub fn new(schema: Value) -> Self {
        TreeBuilder {
            schema,
            default_value: None,
            config: TreeConfig::default(),
            renderers: RendererRegistry::new(),
            validator_factory: Box::new(JsonSchemaValidatorFactory),
            on_change: None,
            external_errors: Vec::new(),
        }
    }

    /// Initial value of the root; overrides schema defaults where present.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn config(mut self, config: TreeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn validator_factory(mut self, factory: impl ValidatorFactory + 'static) -> Self {
        self.validator_factory = Box::new(factory);
        self
    }

    pub fn on_change(mut self, callback: impl FnMut(Option<&Value>) + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Errors injected once the tree is ready.
    pub fn external_errors(mut self, errors: Vec<JsonSchemaError>) -> Self {
        self.external_errors = errors;
        self
    }

    pub fn build(self) -> Result<FormTree, BuildError> {
        if !self.schema.is_object() {
            return Err(BuildError::InvalidSchema {
                path: String::new(),
                message: "root schema must be a JSON object".to_string(),
            });
        }

        let mut tree = FormTree {
            nodes: slab::Slab::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            config: self.config,
            renderers: self.renderers,
            validator_factory: self.validator_factory,
            validator_cache: None,
            global_errors: Vec::new(),
            queue: VecDeque::new(),
            next_listener_id: 0,
            next_error_key: 0,
            next_generation: 0,
            ready: false,
            settling: false,
            needs_validation: false,
            on_change: self.on_change,
            last_reported: None,
        };

        tree.root = tree.construct(None, String::new(), &self.schema, self.default_value, true)?;
        tree.initialize();
        if !self.external_errors.is_empty() {
            tree.set_external_errors(self.external_errors);
        }
        debug!(nodes = tree.nodes.len(), "form tree built");
        Ok(tree)
    }
}

impl FormTree {
    /// Build the node for `schema` and its whole subtree.
    pub(crate) fn construct(
        &mut self,
        parent: Option<NodeId>,
        name: String,
        raw_schema: &Value,
        input: Option<Value>,
        attached: bool,
    ) -> Result<NodeId, BuildError> {
        let path = match parent.and_then(|p| self.data(p)) {
            Some(p) => join(&p.path, &name),
            None => String::new(),
        };
        let schema = merge_all_of(raw_schema, &path)?;
        let node_type = node_type(&schema, input.as_ref());
        let group = node_group(&schema, node_type, &self.renderers);

        let mut registry = DependencyRegistry::new();
        let computed = ComputedProperties::compile(&schema, &mut registry, &path)?;
        let initial = initial_value(input, &schema, node_type, group);
        let integer = is_integer(&schema);

        let data = NodeData {
            generation: 0,
            name,
            path,
            parent,
            node_type,
            group,
            integer,
            default_value: schema.get("default").cloned(),
            schema: schema.clone(),
            value: None,
            children: Vec::new(),
            kind: NodeKind::Terminal,
            attached,
            dep_values: vec![None; registry.len()],
            registry,
            computed,
            computed_state: ComputedState::default(),
            watch_values: Vec::new(),
            required: false,
            virtual_required: false,
            state: NodeState::default(),
            local_errors: Vec::new(),
            external_errors: Vec::new(),
            listeners: Vec::new(),
        };
        let id = self.insert_node(data);

        match (group, node_type) {
            (NodeGroup::Branch, NodeType::Object) => self.build_object(id, &schema, initial)?,
            (NodeGroup::Branch, NodeType::Array) => self.build_array(id, &schema, initial)?,
            (NodeGroup::Branch, NodeType::Virtual) => {
                // A virtual node declared outside `virtual` has nothing to aggregate.
                if let Some(data) = self.data_mut(id) {
                    data.kind = NodeKind::Virtual(VirtualData { fields: Vec::new() });
                }
            }
            _ => {
                if let Some(data) = self.data_mut(id) {
                    data.value = terminal::coerce(node_type, integer, initial);
                }
            }
        }
        Ok(id)
    }

    fn build_object(
        &mut self,
        id: NodeId,
        schema: &Value,
        initial: Option<Value>,
    ) -> Result<(), BuildError> {
        let (path, attached) = match self.data(id) {
            Some(d) => (d.path.clone(), d.attached),
            None => return Ok(()),
        };
        let strategy = branch::resolve(schema, &path)?;
        let incoming = match initial {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mut base_children = Vec::new();
        let shared = strategy
            .base
            .iter()
            .chain(strategy.any_of.iter().flat_map(|b| b.properties.iter()));
        for (name, prop) in shared {
            let child = self.construct(
                Some(id),
                name.clone(),
                prop,
                incoming.get(name).cloned(),
                attached,
            )?;
            base_children.push(ChildSlot {
                node: child,
                is_virtual: false,
                salt: None,
            });
        }

        let declared = schema::virtual_fields(schema);
        let mut virtual_names: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, fields, node_schema) in &declared {
            let child = self.construct_virtual(id, name, fields.clone(), node_schema, attached)?;
            virtual_names.insert(name.clone(), fields.clone());
            base_children.push(ChildSlot {
                node: child,
                is_virtual: true,
                salt: None,
            });
        }

        let mut branch_children = Vec::with_capacity(strategy.one_of.len());
        for branch in &strategy.one_of {
            let mut slots = Vec::with_capacity(branch.properties.len());
            for (name, prop) in &branch.properties {
                let child =
                    self.construct(Some(id), name.clone(), prop, incoming.get(name).cloned(), false)?;
                slots.push(ChildSlot {
                    node: child,
                    is_virtual: false,
                    salt: Some(branch.salt),
                });
            }
            branch_children.push(slots);
        }

        let Some(data) = self.data_mut(id) else {
            return Ok(());
        };
        let mut registry = std::mem::take(&mut data.registry);

        let mut branch_guards = Vec::with_capacity(strategy.one_of.len());
        for branch in &strategy.one_of {
            let guard = match &branch.guard {
                Some(src) => {
                    let at = format!("{}/oneOf/{}/computed/if", path, branch.index);
                    Some(compile_at(src, &mut registry, &at)?)
                }
                None => None,
            };
            branch_guards.push(guard);
        }

        let expand = |name: &str| -> Vec<String> {
            match virtual_names.get(name) {
                Some(fields) => fields.clone(),
                None => vec![name.to_string()],
            }
        };

        let declared_required = schema::required(schema);
        let mut static_required: Vec<String> = Vec::new();
        for name in &declared_required {
            for field in expand(name) {
                if !static_required.contains(&field) {
                    static_required.push(field);
                }
            }
        }

        let mut required_guards: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for (field, guards) in guards_by_field(&flatten_conditions(schema)) {
            for guard in &guards {
                let compiled = guard.compile(&mut registry);
                for target in expand(&field) {
                    required_guards
                        .entry(target)
                        .or_default()
                        .push(compiled.clone());
                }
            }
        }

        data.dep_values = vec![None; registry.len()];
        data.registry = registry;
        data.schema = strategy.effective_schema(schema, None);
        data.children = base_children.clone();
        data.kind = NodeKind::Object(Box::new(ObjectData {
            strategy,
            source_schema: schema.clone(),
            base_children,
            branch_children,
            branch_guards,
            one_of_index: None,
            static_required,
            required_guards,
        }));

        // Virtual nodes named in `required` are flagged for renderers.
        let flagged: Vec<NodeId> = data
            .children
            .iter()
            .filter(|s| s.is_virtual)
            .map(|s| s.node)
            .collect();
        for child in flagged {
            if let Some(child_data) = self.data_mut(child) {
                child_data.virtual_required = declared_required.contains(&child_data.name);
            }
        }
        Ok(())
    }

    fn construct_virtual(
        &mut self,
        parent: NodeId,
        name: &str,
        fields: Vec<String>,
        node_schema: &Value,
        attached: bool,
    ) -> Result<NodeId, BuildError> {
        let id = self.construct(Some(parent), name.to_string(), node_schema, None, attached)?;
        if let Some(data) = self.data_mut(id) {
            data.node_type = NodeType::Virtual;
            data.group = NodeGroup::Branch;
            data.kind = NodeKind::Virtual(VirtualData { fields });
            data.value = None;
        }
        Ok(id)
    }

    fn build_array(
        &mut self,
        id: NodeId,
        schema: &Value,
        initial: Option<Value>,
    ) -> Result<(), BuildError> {
        let attached = self.data(id).map(|d| d.attached).unwrap_or(false);
        let items = match schema.get("items") {
            Some(Value::Array(tuple)) => tuple.first().cloned().unwrap_or_else(|| json!({})),
            Some(items) => items.clone(),
            None => json!({}),
        };

        // Build one element up front so a broken item schema fails the build
        // instead of a later push.
        let sample = self.construct(Some(id), "0".to_string(), &items, None, false)?;
        self.destroy(sample);

        let values = match initial {
            Some(Value::Array(values)) => values,
            _ => Vec::new(),
        };
        let mut slots = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let child = self.construct(Some(id), index.to_string(), &items, Some(value), attached)?;
            slots.push(ChildSlot {
                node: child,
                is_virtual: false,
                salt: None,
            });
        }

        if let Some(data) = self.data_mut(id) {
            data.children = slots;
            data.kind = NodeKind::Array(ArrayData { items });
        }
        Ok(())
    }

    /// Remove `id` and everything it owns from the arena.
    pub(crate) fn destroy(&mut self, id: NodeId) {
        for child in self.owned_children(id) {
            self.destroy(child);
        }
        if self.data(id).is_some() {
            self.nodes.remove(id.index);
        }
        self.queue.retain(|(node, _)| *node != id);
    }

    /// Link dependencies, evaluate computed state, then open the tree for events.
    fn initialize(&mut self) {
        self.aggregate_subtree(self.root);
        self.relink_dependencies();
        for id in self.live_nodes() {
            self.recompute(id);
        }
        self.aggregate_subtree(self.root);

        self.ready = true;
        if self.config.validation_mode == ValidationMode::OnChange {
            self.run_validation();
        }
        self.queue.clear();
        self.needs_validation = false;

        self.last_reported = self.root_value().cloned();
        if let Some(callback) = self.on_change.as_mut() {
            callback(self.last_reported.as_ref());
        }
    }

    /// Build a fresh array element at runtime. Failures are logged, not raised.
    pub(crate) fn construct_element(
        &mut self,
        array: NodeId,
        index: usize,
        items: &Value,
        value: Option<Value>,
    ) -> Option<NodeId> {
        let attached = self.data(array).map(|d| d.attached).unwrap_or(false);
        match self.construct(Some(array), index.to_string(), items, value, attached) {
            Ok(child) => {
                self.aggregate_subtree(child);
                Some(child)
            }
            Err(err) => {
                warn!(code = err.code(), path = err.path(), error = %err, "failed to build array element");
                None
            }
        }
    }

    pub(crate) fn empty_of(&self, id: NodeId) -> Option<Value> {
        self.data(id)
            .and_then(|d| empty_value(d.node_type, d.group))
    }
}
