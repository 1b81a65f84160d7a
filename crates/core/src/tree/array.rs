use serde_json::Value;
use tracing::warn;

use super::value::WriteMode;
use super::{ChildSlot, FormTree, NodeId, NodeKind};
use crate::event::NodeEvent;
use crate::pointer::join;

impl FormTree {
    /// Append an element. Refused (returns `None`) when `maxItems` is reached
    /// or `array` is not an array branch.
    pub fn push(&mut self, array: NodeId, value: Option<Value>) -> Option<NodeId> {
        let (items, len, max) = match self.data(array) {
            Some(data) => match &data.kind {
                NodeKind::Array(a) => (
                    a.items.clone(),
                    data.children.len(),
                    data.schema.get("maxItems").and_then(Value::as_u64),
                ),
                _ => return None,
            },
            None => return None,
        };
        if max.is_some_and(|max| len as u64 >= max) {
            warn!(node = ?array, max_items = max, "push refused: array is full");
            return None;
        }

        let child = self.construct_element(array, len, &items, value)?;
        if let Some(data) = self.data_mut(array) {
            data.children.push(ChildSlot {
                node: child,
                is_virtual: false,
                salt: None,
            });
        }
        self.finish_structure_change(array, &[child]);
        Some(child)
    }

    /// Remove the element at `index`. Refused when `minItems` would be violated.
    pub fn remove(&mut self, array: NodeId, index: usize) -> bool {
        let Some((len, min)) = self.array_bounds(array) else {
            return false;
        };
        if index >= len {
            return false;
        }
        if min.is_some_and(|min| (len as u64) <= min) {
            warn!(node = ?array, min_items = min, "remove refused: array at minimum size");
            return false;
        }
        let removed = match self.data_mut(array) {
            Some(data) => data.children.remove(index),
            None => return false,
        };
        self.destroy(removed.node);
        self.finish_structure_change(array, &[]);
        true
    }

    /// Move the element at `from` to position `to`.
    pub fn move_item(&mut self, array: NodeId, from: usize, to: usize) -> bool {
        let Some((len, _)) = self.array_bounds(array) else {
            return false;
        };
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }
        if let Some(data) = self.data_mut(array) {
            let slot = data.children.remove(from);
            data.children.insert(to, slot);
        }
        self.finish_structure_change(array, &[]);
        true
    }

    /// Remove every element. Refused when `minItems` is positive.
    pub fn clear(&mut self, array: NodeId) -> bool {
        let Some((len, min)) = self.array_bounds(array) else {
            return false;
        };
        if min.is_some_and(|min| min > 0) {
            warn!(node = ?array, min_items = min, "clear refused: array has a minimum size");
            return false;
        }
        if len == 0 {
            return true;
        }
        let removed = match self.data_mut(array) {
            Some(data) => std::mem::take(&mut data.children),
            None => return false,
        };
        for slot in removed {
            self.destroy(slot.node);
        }
        self.finish_structure_change(array, &[]);
        true
    }

    fn array_bounds(&self, array: NodeId) -> Option<(usize, Option<u64>)> {
        let data = self.data(array)?;
        match data.kind {
            NodeKind::Array(_) => Some((
                data.children.len(),
                data.schema.get("minItems").and_then(Value::as_u64),
            )),
            _ => None,
        }
    }

    fn finish_structure_change(&mut self, array: NodeId, created: &[NodeId]) {
        self.reindex(array);
        self.emit(array, NodeEvent::ChildrenChanged);
        self.relink_and_recompute(created);
        let parent = self.data(array).and_then(|d| d.parent);
        if self.refresh_aggregate(array, WriteMode::User) {
            self.propagate_up(parent, WriteMode::User);
        }
        self.settle();
    }

    /// Rename elements to their positions and rewrite paths below them.
    fn reindex(&mut self, array: NodeId) {
        let Some(data) = self.data(array) else {
            return;
        };
        let base = data.path.clone();
        let slots: Vec<NodeId> = data.children.iter().map(|s| s.node).collect();
        for (index, child) in slots.into_iter().enumerate() {
            let name = index.to_string();
            if let Some(data) = self.data_mut(child) {
                data.name = name.clone();
            }
            self.rewrite_paths(child, join(&base, &name));
        }
    }

    fn rewrite_paths(&mut self, id: NodeId, path: String) {
        let Some(data) = self.data_mut(id) else {
            return;
        };
        if data.path == path {
            return;
        }
        data.path = path.clone();
        for child in self.owned_children(id) {
            let name = self.data(child).map(|d| d.name.clone()).unwrap_or_default();
            self.rewrite_paths(child, join(&path, &name));
        }
    }
}
