//! Dependency links, computed state, `oneOf` branch selection and
//! conditional `required`.

use tracing::debug;

use super::value::WriteMode;
use super::{ChildSlot, FormTree, NodeId, NodeKind};
use crate::event::{EventKind, EventKinds, Listener, NodeEvent};

impl FormTree {
    /// Drop every internal link and resolve all dependency pointers again
    /// against the live tree. Returns the nodes whose dependency values changed.
    pub(crate) fn relink_dependencies(&mut self) -> Vec<NodeId> {
        for (_, data) in self.nodes.iter_mut() {
            data.listeners.retain(|entry| !entry.is_internal());
        }

        let all = self.node_ids();
        let mut changed = Vec::new();
        for id in all {
            let Some(data) = self.data(id) else {
                continue;
            };
            if !data.attached {
                if let Some(data) = self.data_mut(id) {
                    data.dep_values.iter_mut().for_each(|v| *v = None);
                }
                continue;
            }

            let paths = data.registry.paths().to_vec();
            let mut values = Vec::with_capacity(paths.len());
            for (slot, path) in paths.iter().enumerate() {
                match self.find(id, path) {
                    Some(target) => {
                        values.push(self.value(target).cloned());
                        self.add_listener(
                            target,
                            EventKinds::only(EventKind::ValueChanged),
                            Listener::Dependency {
                                dependent: id,
                                slot,
                            },
                        );
                    }
                    None => values.push(None),
                }
            }

            self.link_virtual(id);

            if let Some(data) = self.data_mut(id) {
                if data.dep_values != values {
                    data.dep_values = values;
                    changed.push(id);
                }
            }
        }
        changed
    }

    /// Resolve the fields of a virtual node among its live siblings.
    fn link_virtual(&mut self, id: NodeId) {
        let Some(data) = self.data(id) else {
            return;
        };
        let NodeKind::Virtual(virtual_data) = &data.kind else {
            return;
        };
        let Some(parent) = data.parent else {
            return;
        };
        let fields = virtual_data.fields.clone();
        let siblings: Vec<(NodeId, String)> = self
            .data(parent)
            .map(|p| {
                p.children
                    .iter()
                    .filter(|s| !s.is_virtual)
                    .filter_map(|s| self.data(s.node).map(|c| (s.node, c.name.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let mut refs = Vec::with_capacity(fields.len());
        for field in &fields {
            if let Some((node, _)) = siblings.iter().find(|(_, name)| name == field) {
                refs.push(ChildSlot {
                    node: *node,
                    is_virtual: true,
                    salt: None,
                });
                self.add_listener(
                    *node,
                    EventKinds::only(EventKind::ValueChanged),
                    Listener::Virtual { owner: id },
                );
            }
        }
        if let Some(data) = self.data_mut(id) {
            data.children = refs;
        }
    }

    /// Relink, then recompute every node whose inputs moved plus `extra`
    /// (and their live subtrees).
    pub(crate) fn relink_and_recompute(&mut self, extra: &[NodeId]) {
        let mut pending = self.relink_dependencies();
        for root in extra {
            self.collect_attached(*root, &mut pending);
        }
        for id in self.virtual_nodes() {
            self.refresh_virtual(id);
        }
        for id in pending {
            self.recompute(id);
        }
    }

    fn collect_attached(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if self.data(id).is_some_and(|d| d.attached) {
            out.push(id);
            for child in self.live_children(id) {
                self.collect_attached(child, out);
            }
        }
    }

    pub(crate) fn virtual_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .into_iter()
            .filter(|&id| {
                self.data(id)
                    .is_some_and(|d| d.attached && matches!(d.kind, NodeKind::Virtual(_)))
            })
            .collect()
    }

    /// Re-evaluate computed state, branch selection and required flags.
    pub(crate) fn recompute(&mut self, id: NodeId) {
        let Some(data) = self.data(id) else {
            return;
        };
        if !data.attached {
            return;
        }
        let state = data.computed.evaluate(&data.dep_values);
        let watch = data.computed.watch_values(&data.dep_values);
        let previous = data.computed_state;
        let watch_changed = watch != data.watch_values;
        let is_object = matches!(data.kind, NodeKind::Object(_));

        if let Some(data) = self.data_mut(id) {
            data.computed_state = state;
            data.watch_values = watch;
        }
        if state != previous || watch_changed {
            self.emit(id, NodeEvent::RefreshRequested);
        }
        if previous.is_shown() && !state.is_shown() && self.config.reset_hidden_values {
            debug!(node = ?id, "node hidden, resetting value");
            self.reset_node(id);
        }

        if is_object {
            self.select_branch(id);
            self.refresh_required(id);
        }
    }

    /// Activate the first `oneOf` branch whose guard holds.
    pub(crate) fn select_branch(&mut self, id: NodeId) {
        let Some(data) = self.data(id) else {
            return;
        };
        let NodeKind::Object(obj) = &data.kind else {
            return;
        };
        if !obj.strategy.has_one_of() {
            return;
        }
        let next = obj
            .branch_guards
            .iter()
            .position(|guard| guard.as_ref().map_or(true, |g| g.test(&data.dep_values)));
        if next != obj.one_of_index {
            self.switch_branch(id, next);
        }
    }

    fn switch_branch(&mut self, id: NodeId, next: Option<usize>) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        let path = data.path.clone();
        let NodeKind::Object(obj) = &mut data.kind else {
            return;
        };
        let previous = obj.one_of_index;
        let branch_slots = |index: Option<usize>| -> Vec<ChildSlot> {
            index
                .and_then(|i| obj.branch_children.get(i))
                .cloned()
                .unwrap_or_default()
        };
        let old_slots = branch_slots(previous);
        let new_slots = branch_slots(next);
        obj.one_of_index = next;
        let schema = obj.strategy.effective_schema(&obj.source_schema, next);
        let mut children = obj.base_children.clone();
        children.extend(new_slots.iter().copied());
        data.schema = schema;
        data.children = children;
        debug!(path = %path, from = ?previous, to = ?next, "switching oneOf branch");

        for slot in &old_slots {
            self.set_attached(slot.node, false);
            let empty = self.empty_of(slot.node);
            self.write_value(slot.node, empty, WriteMode::Reset);
        }
        for slot in &new_slots {
            self.set_attached(slot.node, true);
            if self.ready {
                let default = self.data(slot.node).and_then(|d| d.default_value.clone());
                let value = default.or_else(|| self.empty_of(slot.node));
                self.write_value(slot.node, value, WriteMode::Reset);
            }
        }

        self.emit(id, NodeEvent::ChildrenChanged);
        let attached: Vec<NodeId> = new_slots.iter().map(|s| s.node).collect();
        self.relink_and_recompute(&attached);
        self.propagate_up(Some(id), WriteMode::Reset);
    }

    /// Attach or detach a subtree. Re-attaching follows the active branches only.
    fn set_attached(&mut self, id: NodeId, attached: bool) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        data.attached = attached;
        if !attached {
            data.computed_state = Default::default();
        }
        let children = if attached {
            self.live_children(id)
        } else {
            self.owned_children(id)
        };
        for child in children {
            self.set_attached(child, attached);
        }
    }

    /// Recompute the `required` flag of every child of an object.
    pub(crate) fn refresh_required(&mut self, id: NodeId) {
        let Some(data) = self.data(id) else {
            return;
        };
        let NodeKind::Object(obj) = &data.kind else {
            return;
        };
        let branch_required: &[String] = obj
            .one_of_index
            .and_then(|i| obj.strategy.one_of.get(i))
            .map(|b| b.required.as_slice())
            .unwrap_or(&[]);
        let any_of_required: Vec<&String> =
            obj.strategy.any_of.iter().flat_map(|b| b.required.iter()).collect();

        let mut updates = Vec::new();
        for slot in data.children.iter().filter(|s| !s.is_virtual) {
            let Some(child) = self.data(slot.node) else {
                continue;
            };
            let name = &child.name;
            let required = obj.static_required.contains(name)
                || branch_required.contains(name)
                || any_of_required.contains(&name)
                || obj
                    .required_guards
                    .get(name)
                    .is_some_and(|guards| guards.iter().any(|g| g.test(&data.dep_values)));
            if child.required != required {
                updates.push((slot.node, required));
            }
        }

        for (child, required) in updates {
            if let Some(data) = self.data_mut(child) {
                data.required = required;
            }
            self.emit(child, NodeEvent::RefreshRequested);
        }
    }
}
