use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{FormTree, NodeGroup, NodeId, NodeKind};
use crate::event::NodeEvent;
use crate::pointer::to_data_path;
use crate::validation::{compile_or_fallback, transform_errors, JsonSchemaError};

impl FormTree {
    /// Validate the root value now, regardless of the validation mode, and
    /// return the root's error list.
    pub fn validate(&mut self) -> Vec<JsonSchemaError> {
        self.run_validation();
        self.settle();
        self.global_errors.clone()
    }

    /// Errors of the last validation run, all nodes included.
    pub fn global_errors(&self) -> &[JsonSchemaError] {
        &self.global_errors
    }

    /// External errors of every node followed by the validator errors.
    pub fn all_errors(&self) -> Vec<JsonSchemaError> {
        let mut out: Vec<JsonSchemaError> = self
            .nodes
            .iter()
            .flat_map(|(_, d)| d.external_errors.iter().cloned())
            .collect();
        out.extend(self.global_errors.iter().cloned());
        out
    }

    pub(crate) fn run_validation(&mut self) {
        let schema = self.validation_schema(self.root);
        let value = self.root_value().cloned().unwrap_or(Value::Null);

        let cached = matches!(&self.validator_cache, Some((s, _)) if *s == schema);
        if !cached {
            let validator = compile_or_fallback(self.validator_factory.as_ref(), &schema);
            self.validator_cache = Some((schema, validator));
        }
        let raw = self
            .validator_cache
            .as_ref()
            .map(|(_, v)| v.validate(&value))
            .unwrap_or_default();
        let errors = transform_errors(raw);
        debug!(count = errors.len(), "validated form value");
        self.distribute_errors(errors);
    }

    /// The schema the root value is validated against: node schemas of the
    /// live tree, with hidden fields dropped from `required`.
    pub fn validation_schema(&self, id: NodeId) -> Value {
        let Some(data) = self.data(id) else {
            return Value::Bool(true);
        };
        if data.group == NodeGroup::Terminal {
            return data.schema.clone();
        }
        let mut schema = data.schema.as_object().cloned().unwrap_or_default();
        match &data.kind {
            NodeKind::Object(_) => {
                let mut properties = Map::new();
                let mut hidden = Vec::new();
                for slot in data.children.iter().filter(|s| !s.is_virtual) {
                    let Some(child) = self.data(slot.node) else {
                        continue;
                    };
                    if !child.computed_state.is_shown() {
                        hidden.push(child.name.clone());
                    }
                    properties.insert(child.name.clone(), self.validation_schema(slot.node));
                }

                let virtual_fields: HashMap<&str, Vec<String>> = data
                    .children
                    .iter()
                    .filter(|s| s.is_virtual)
                    .filter_map(|s| self.data(s.node))
                    .filter_map(|v| match &v.kind {
                        NodeKind::Virtual(vd) => Some((v.name.as_str(), vd.fields.clone())),
                        _ => None,
                    })
                    .collect();
                let mut required: Vec<String> = Vec::new();
                let declared = crate::schema::required(&data.schema);
                let names = declared.iter().flat_map(|name| {
                    virtual_fields
                        .get(name.as_str())
                        .cloned()
                        .unwrap_or_else(|| vec![name.clone()])
                });
                for name in names {
                    if !hidden.contains(&name) && !required.contains(&name) {
                        required.push(name);
                    }
                }

                schema.insert("properties".to_string(), Value::Object(properties));
                schema.remove("virtual");
                if required.is_empty() {
                    schema.remove("required");
                } else {
                    schema.insert(
                        "required".to_string(),
                        Value::Array(required.into_iter().map(Value::String).collect()),
                    );
                }
            }
            NodeKind::Array(_) => {
                let prefix: Vec<Value> = data
                    .children
                    .iter()
                    .map(|s| self.validation_schema(s.node))
                    .collect();
                schema.remove("items");
                schema.insert("prefixItems".to_string(), Value::Array(prefix));
            }
            NodeKind::Virtual(_) | NodeKind::Terminal => {}
        }
        Value::Object(schema)
    }

    /// Replace the root's error list and hand each error to the live node
    /// whose data path it names. No-op when unchanged.
    pub fn set_global_errors(&mut self, errors: Vec<JsonSchemaError>) {
        self.distribute_errors(errors);
        self.settle();
    }

    /// Replace one node's validator errors. No-op when unchanged.
    pub fn set_local_errors(&mut self, id: NodeId, errors: Vec<JsonSchemaError>) {
        self.store_local_errors(id, errors);
        self.settle();
    }

    fn distribute_errors(&mut self, errors: Vec<JsonSchemaError>) {
        if self.global_errors == errors {
            return;
        }
        let mut by_path: HashMap<String, Vec<JsonSchemaError>> = HashMap::new();
        for error in &errors {
            by_path
                .entry(error.data_path.clone())
                .or_default()
                .push(error.clone());
        }
        self.global_errors = errors;

        let ids: Vec<NodeId> = self.node_ids();
        for id in ids {
            let local = match self.data(id) {
                Some(d) if d.attached && !matches!(d.kind, NodeKind::Virtual(_)) => {
                    by_path.remove(&to_data_path(&d.path)).unwrap_or_default()
                }
                Some(_) => Vec::new(),
                None => continue,
            };
            self.store_local_errors(id, local);
        }
    }

    fn store_local_errors(&mut self, id: NodeId, errors: Vec<JsonSchemaError>) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        if data.local_errors == errors {
            return;
        }
        data.local_errors = errors;
        let merged = data.merged_errors();
        self.emit(id, NodeEvent::ErrorChanged(merged));
    }

    // -- External errors ----------------------------------------

    /// Replace all external errors. Each error is tagged with a fresh key
    /// and attached to the node at its `data_path` (the root when no live
    /// node matches). Returns the keys in input order.
    pub fn set_external_errors(&mut self, errors: Vec<JsonSchemaError>) -> Vec<u64> {
        self.clear_external_errors_inner();
        let keys = self.attach_external_errors(errors);
        self.settle();
        keys
    }

    /// Attach external errors next to the existing ones.
    pub fn add_external_errors(&mut self, errors: Vec<JsonSchemaError>) -> Vec<u64> {
        let keys = self.attach_external_errors(errors);
        self.settle();
        keys
    }

    /// Remove the external errors tagged with any of `keys`.
    pub fn remove_external_errors(&mut self, keys: &[u64]) {
        let ids: Vec<NodeId> = self.node_ids();
        for id in ids {
            self.update_external_errors(id, |errors| {
                errors.retain(|e| !e.key.is_some_and(|k| keys.contains(&k)))
            });
        }
        self.settle();
    }

    pub fn clear_external_errors(&mut self) {
        self.clear_external_errors_inner();
        self.settle();
    }

    fn clear_external_errors_inner(&mut self) {
        let ids: Vec<NodeId> = self.node_ids();
        for id in ids {
            self.update_external_errors(id, Vec::clear);
        }
    }

    fn attach_external_errors(&mut self, errors: Vec<JsonSchemaError>) -> Vec<u64> {
        let by_path: HashMap<String, NodeId> = self
            .live_nodes()
            .into_iter()
            .filter_map(|id| self.data(id).map(|d| (to_data_path(&d.path), id)))
            .collect();

        let mut grouped: Vec<(NodeId, Vec<JsonSchemaError>)> = Vec::new();
        let mut keys = Vec::with_capacity(errors.len());
        for mut error in errors {
            if error.data_path.is_empty() && !error.instance_path.is_empty() {
                error.data_path = to_data_path(&error.instance_path);
            }
            let key = self.next_error_key;
            self.next_error_key += 1;
            error.key = Some(key);
            keys.push(key);

            let target = by_path.get(&error.data_path).copied().unwrap_or(self.root);
            match grouped.iter_mut().find(|(id, _)| *id == target) {
                Some((_, list)) => list.push(error),
                None => grouped.push((target, vec![error])),
            }
        }
        for (id, list) in grouped {
            self.update_external_errors(id, |errors| errors.extend(list));
        }
        keys
    }

    fn update_external_errors(&mut self, id: NodeId, f: impl FnOnce(&mut Vec<JsonSchemaError>)) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        let before = data.external_errors.clone();
        f(&mut data.external_errors);
        if data.external_errors != before {
            let merged = data.merged_errors();
            self.emit(id, NodeEvent::ErrorChanged(merged));
        }
    }
}
