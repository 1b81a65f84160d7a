use super::{FormTree, NodeGroup, NodeId, NodeKind};
use crate::pointer::{parse_pointer, Segment};

impl FormTree {
    /// Resolve `pointer` from `from` over the live tree.
    ///
    /// `#`/`/` restart at the root, `..` climbs, `.` stays, and names
    /// descend. Returns `None` when a segment cannot be followed, including
    /// names below a terminal.
    pub fn find(&self, from: NodeId, pointer: &str) -> Option<NodeId> {
        let mut current = from;
        self.data(current)?;
        for segment in parse_pointer(pointer) {
            current = match segment {
                Segment::Root => self.root,
                Segment::Parent => self.data(current)?.parent?,
                Segment::Current => current,
                Segment::Child(name) => self.live_child_named(current, &name)?,
            };
        }
        Some(current)
    }

    /// Every node `pointer` can reach from `from`, counting inactive
    /// `oneOf` branches. A terminal reached before the last segment is kept.
    pub fn find_nodes(&self, from: NodeId, pointer: &str) -> Vec<NodeId> {
        if self.data(from).is_none() {
            return Vec::new();
        }
        let mut current = vec![from];
        for segment in parse_pointer(pointer) {
            let mut next: Vec<NodeId> = Vec::new();
            for id in &current {
                match &segment {
                    Segment::Root => next.push(self.root),
                    Segment::Parent => next.extend(self.data(*id).and_then(|d| d.parent)),
                    Segment::Current => next.push(*id),
                    Segment::Child(name) => {
                        if self.data(*id).is_some_and(|d| d.group == NodeGroup::Terminal) {
                            next.push(*id);
                        } else {
                            next.extend(self.all_children_named(*id, name));
                        }
                    }
                }
            }
            let mut seen = std::collections::HashSet::new();
            next.retain(|id| seen.insert(*id));
            current = next;
        }
        current
    }

    fn live_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let data = self.data(id)?;
        if data.group == NodeGroup::Terminal {
            return None;
        }
        data.children
            .iter()
            .map(|s| s.node)
            .find(|child| self.data(*child).is_some_and(|c| c.name == name))
    }

    fn all_children_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        let candidates: Vec<NodeId> = match self.data(id).map(|d| &d.kind) {
            Some(NodeKind::Object(_)) => self.owned_children(id),
            Some(_) => self
                .data(id)
                .map(|d| d.children.iter().map(|s| s.node).collect())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|child| self.data(*child).is_some_and(|c| c.name == name))
            .collect()
    }
}
