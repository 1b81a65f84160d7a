use serde_json::{Map, Value};

use super::{terminal, ChildSlot, FormTree, NodeData, NodeId, NodeKind};
use crate::event::NodeEvent;
use crate::schema::NodeGroup;

/// Who is writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// A caller write; changed nodes become dirty.
    User,
    /// An engine reset (hidden node, branch switch).
    Reset,
}

enum Target {
    Object,
    Array,
    Virtual,
    Terminal,
}

impl FormTree {
    /// Write `value` to `id`, then re-aggregate its ancestors and settle.
    ///
    /// Objects distribute the value over their children; arrays resize to
    /// match it; terminals coerce it to their type. A hidden node receives
    /// its safe-empty value instead.
    pub fn set_value(&mut self, id: NodeId, value: Option<Value>) {
        let Some(parent) = self.data(id).map(|d| d.parent) else {
            return;
        };
        self.write_value(id, value, WriteMode::User);
        self.propagate_up(parent, WriteMode::User);
        self.settle();
    }

    /// Returns whether the node's own value changed.
    pub(crate) fn write_value(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let Some(data) = self.data(id) else {
            return false;
        };
        let shown = data.computed_state.is_shown() || !self.config.reset_hidden_values;
        let target = match &data.kind {
            NodeKind::Object(_) => Target::Object,
            NodeKind::Array(_) => Target::Array,
            NodeKind::Virtual(_) => Target::Virtual,
            NodeKind::Terminal => Target::Terminal,
        };
        let value = if shown { value } else { self.empty_of(id) };
        match target {
            Target::Object => self.write_object(id, value, mode),
            Target::Array => self.write_array(id, value, mode),
            Target::Virtual => self.write_virtual(id, value, mode),
            Target::Terminal => self.write_terminal(id, value, mode),
        }
    }

    fn write_terminal(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let Some((node_type, integer)) = self.data(id).map(|d| (d.node_type, d.integer)) else {
            return false;
        };
        let normalized = terminal::coerce(node_type, integer, value);
        self.store(id, normalized, mode)
    }

    fn write_object(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let incoming = match value {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for (child, name) in self.named_children(id, |obj| obj.base_children.as_slice()) {
            self.write_value(child, incoming.get(&name).cloned(), mode);
        }

        let has_one_of = matches!(
            self.data(id).map(|d| &d.kind),
            Some(NodeKind::Object(obj)) if obj.strategy.has_one_of()
        );
        if has_one_of {
            // Selection must see the discriminators just written.
            self.pull_dependencies(id);
            self.select_branch(id);
            let active = self.named_children(id, |obj| {
                obj.one_of_index
                    .and_then(|i| obj.branch_children.get(i))
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
            });
            for (child, name) in active {
                self.write_value(child, incoming.get(&name).cloned(), mode);
            }
        }

        self.refresh_aggregate(id, mode)
    }

    fn write_array(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let items = match value {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let Some(NodeKind::Array(array)) = self.data(id).map(|d| &d.kind) else {
            return false;
        };
        let item_schema = array.items.clone();
        let existing: Vec<NodeId> = self.live_children(id);

        for (child, item) in existing.iter().zip(items.iter()) {
            self.write_value(*child, Some(item.clone()), mode);
        }

        let mut structure_changed = false;
        let mut created = Vec::new();
        if items.len() < existing.len() {
            for child in &existing[items.len()..] {
                self.destroy(*child);
            }
            if let Some(data) = self.data_mut(id) {
                data.children.truncate(items.len());
            }
            structure_changed = true;
        } else if items.len() > existing.len() {
            for (index, item) in items.into_iter().enumerate().skip(existing.len()) {
                if let Some(child) = self.construct_element(id, index, &item_schema, Some(item)) {
                    created.push(child);
                    if let Some(data) = self.data_mut(id) {
                        data.children.push(ChildSlot {
                            node: child,
                            is_virtual: false,
                            salt: None,
                        });
                    }
                }
            }
            structure_changed = true;
        }

        if structure_changed {
            self.emit(id, NodeEvent::ChildrenChanged);
            self.relink_and_recompute(&created);
        }
        self.refresh_aggregate(id, mode)
    }

    fn write_virtual(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let items = match value {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let refs: Vec<NodeId> = self
            .data(id)
            .map(|d| d.children.iter().map(|s| s.node).collect())
            .unwrap_or_default();
        for (i, field) in refs.into_iter().enumerate() {
            self.write_value(field, items.get(i).cloned(), mode);
        }
        self.refresh_virtual(id)
    }

    /// Store a new value and publish the change. Returns whether it changed.
    pub(crate) fn store(&mut self, id: NodeId, value: Option<Value>, mode: WriteMode) -> bool {
        let Some(data) = self.data_mut(id) else {
            return false;
        };
        if data.value == value {
            return false;
        }
        let previous = std::mem::replace(&mut data.value, value.clone());
        self.emit(
            id,
            NodeEvent::ValueChanged {
                previous,
                current: value,
            },
        );
        if mode == WriteMode::User {
            self.update_state(id, |s| s.dirty = true);
        }
        true
    }

    /// Recompute a branch value from its live children.
    pub(crate) fn refresh_aggregate(&mut self, id: NodeId, mode: WriteMode) -> bool {
        let Some(data) = self.data(id) else {
            return false;
        };
        if data.group != NodeGroup::Branch {
            return false;
        }
        let aggregate = self.aggregate(data);
        self.store(id, aggregate, mode)
    }

    /// Re-aggregate from `start` upwards, stopping at the first unchanged node.
    pub(crate) fn propagate_up(&mut self, start: Option<NodeId>, mode: WriteMode) {
        let mut cursor = start;
        while let Some(id) = cursor {
            if !self.refresh_aggregate(id, mode) {
                break;
            }
            cursor = self.data(id).and_then(|d| d.parent);
        }
    }

    /// Re-read a virtual node's value from its fields.
    pub(crate) fn refresh_virtual(&mut self, id: NodeId) -> bool {
        self.refresh_aggregate(id, WriteMode::Reset)
    }

    /// Set branch values bottom-up without publishing anything.
    pub(crate) fn aggregate_subtree(&mut self, id: NodeId) {
        let (plain, virtual_children): (Vec<ChildSlot>, Vec<ChildSlot>) = match self.data(id) {
            Some(data) if !matches!(data.kind, NodeKind::Virtual(_)) => {
                data.children.iter().partition(|s| !s.is_virtual)
            }
            _ => (Vec::new(), Vec::new()),
        };
        // Virtual nodes read their siblings, so they go last.
        for slot in plain.iter().chain(virtual_children.iter()) {
            self.aggregate_subtree(slot.node);
        }
        let Some(data) = self.data(id) else {
            return;
        };
        if data.group == NodeGroup::Branch {
            let aggregate = self.aggregate(data);
            if let Some(data) = self.data_mut(id) {
                data.value = aggregate;
            }
        }
    }

    fn aggregate(&self, data: &NodeData) -> Option<Value> {
        let child_value = |slot: &ChildSlot| self.data(slot.node).and_then(|c| c.value.clone());
        match &data.kind {
            NodeKind::Object(_) => {
                let mut map = Map::new();
                for slot in data.children.iter().filter(|s| !s.is_virtual) {
                    let Some(child) = self.data(slot.node) else {
                        continue;
                    };
                    if let Some(value) = &child.value {
                        map.insert(child.name.clone(), value.clone());
                    }
                }
                Some(Value::Object(map))
            }
            NodeKind::Array(_) | NodeKind::Virtual(_) => Some(Value::Array(
                data.children
                    .iter()
                    .map(|s| child_value(s).unwrap_or(Value::Null))
                    .collect(),
            )),
            NodeKind::Terminal => data.value.clone(),
        }
    }

    /// Refresh `id`'s dependency slots from the current tree.
    pub(crate) fn pull_dependencies(&mut self, id: NodeId) {
        let Some(data) = self.data(id) else {
            return;
        };
        let values: Vec<Option<Value>> = data
            .registry
            .paths()
            .iter()
            .map(|path| self.find(id, path).and_then(|t| self.value(t).cloned()))
            .collect();
        if let Some(data) = self.data_mut(id) {
            data.dep_values = values;
        }
    }

    /// Reset a node to its safe-empty value and re-aggregate its ancestors.
    pub(crate) fn reset_node(&mut self, id: NodeId) {
        let empty = self.empty_of(id);
        let parent = self.data(id).and_then(|d| d.parent);
        self.write_value(id, empty, WriteMode::Reset);
        self.propagate_up(parent, WriteMode::Reset);
    }

    fn named_children(
        &self,
        id: NodeId,
        pick: impl Fn(&super::ObjectData) -> &[ChildSlot],
    ) -> Vec<(NodeId, String)> {
        let Some(NodeKind::Object(obj)) = self.data(id).map(|d| &d.kind) else {
            return Vec::new();
        };
        pick(obj)
            .iter()
            .filter(|s| !s.is_virtual)
            .filter_map(|s| self.data(s.node).map(|c| (s.node, c.name.clone())))
            .collect()
    }
}
