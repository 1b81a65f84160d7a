//! Per-node publish/subscribe.
//!
//! Every node keeps its own listener list. External listeners are boxed
//! closures; the engine's own reactions (dependency recomputation, virtual
//! field refresh) are registered on the same lists as internal entries, so
//! both are driven by the same events.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::tree::{NodeId, NodeState};
use crate::validation::JsonSchemaError;

/// Event kinds a listener can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    ValueChanged,
    StateChanged,
    ErrorChanged,
    ChildrenChanged,
    RefreshRequested,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ValueChanged,
        EventKind::StateChanged,
        EventKind::ErrorChanged,
        EventKind::ChildrenChanged,
        EventKind::RefreshRequested,
    ];
}

/// A set of [`EventKind`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventKinds(BTreeSet<EventKind>);

impl EventKinds {
    pub fn all() -> Self {
        EventKinds(EventKind::ALL.into_iter().collect())
    }

    pub fn only(kind: EventKind) -> Self {
        EventKinds(BTreeSet::from([kind]))
    }

    pub fn with(mut self, kind: EventKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EventKind> for EventKinds {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        EventKinds(iter.into_iter().collect())
    }
}

/// An event published by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    ValueChanged {
        previous: Option<Value>,
        current: Option<Value>,
    },
    StateChanged(NodeState),
    ErrorChanged(Vec<JsonSchemaError>),
    ChildrenChanged,
    RefreshRequested,
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NodeEvent::ValueChanged { .. } => EventKind::ValueChanged,
            NodeEvent::StateChanged(_) => EventKind::StateChanged,
            NodeEvent::ErrorChanged(_) => EventKind::ErrorChanged,
            NodeEvent::ChildrenChanged => EventKind::ChildrenChanged,
            NodeEvent::RefreshRequested => EventKind::RefreshRequested,
        }
    }
}

/// Handle returned by `subscribe`; removing it twice is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(crate) node: NodeId,
    pub(crate) id: u64,
}

impl Subscription {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

pub type ListenerFn = Box<dyn FnMut(NodeId, &NodeEvent)>;

pub(crate) enum Listener {
    External(ListenerFn),
    /// `dependent`'s dependency slot `slot` mirrors this node's value.
    Dependency { dependent: NodeId, slot: usize },
    /// `owner` is a virtual node aggregating this node's value.
    Virtual { owner: NodeId },
}

pub(crate) struct ListenerEntry {
    pub id: u64,
    pub kinds: EventKinds,
    pub listener: Listener,
}

impl ListenerEntry {
    pub fn is_internal(&self) -> bool {
        !matches!(self.listener, Listener::External(_))
    }
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.listener {
            Listener::External(_) => "external".to_string(),
            Listener::Dependency { dependent, slot } => {
                format!("dependency({:?}#{})", dependent, slot)
            }
            Listener::Virtual { owner } => format!("virtual({:?})", owner),
        };
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("listener", &kind)
            .finish()
    }
}

/// Internal follow-up work produced while dispatching an event.
#[derive(Debug, Clone)]
pub(crate) enum Reaction {
    Dependency {
        dependent: NodeId,
        slot: usize,
        value: Option<Value>,
    },
    Virtual {
        owner: NodeId,
    },
}
