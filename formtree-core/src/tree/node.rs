//! The closed set of node kinds.

use std::sync::Weak;

use parking_lot::RwLock;
use serde_json::Value;

use super::control::{Control, ControlInner};
use super::group::Group;
use super::link::Link;
use super::snapshot::NodeSnapshot;
use super::state::{Cascade, FlagKind, Status};

/// Both cascading flags, in the order they are applied.
pub(crate) const FLAG_KINDS: [FlagKind; 2] = [FlagKind::ReadOnly, FlagKind::Disabled];

/// Any unit of the state tree.
#[derive(Debug, Clone)]
pub enum Node {
    Control(Control),
    Group(Group),
}

impl Node {
    /// Current state of the node.
    pub fn status(&self) -> Status {
        match self {
            Node::Control(control) => control.status(),
            Node::Group(group) => group.status(),
        }
    }

    /// Whether the node changed since the last reset.
    pub fn dirty(&self) -> bool {
        self.status().dirty
    }

    /// Whether the node was touched since the last reset.
    pub fn touched(&self) -> bool {
        self.status().touched
    }

    /// Whether the node and everything it holds is valid.
    pub fn valid(&self) -> bool {
        self.status().valid
    }

    /// Current readonly flag.
    pub fn readonly(&self) -> bool {
        self.status().readonly.get()
    }

    /// Current disabled flag.
    pub fn disabled(&self) -> bool {
        self.status().disabled.get()
    }

    /// Plain value projection.
    pub fn build(&self) -> Value {
        match self {
            Node::Control(control) => control.build(),
            Node::Group(group) => group.build(),
        }
    }

    /// Latest cached snapshot.
    pub fn snapshot(&self) -> NodeSnapshot {
        match self {
            Node::Control(control) => NodeSnapshot::Control(control.snapshot()),
            Node::Group(group) => NodeSnapshot::Group(group.snapshot()),
        }
    }

    /// Reset the node and notify its owner.
    pub fn reset(&self) {
        match self {
            Node::Control(control) => control.reset(),
            Node::Group(group) => group.reset(),
        }
    }

    /// The control, if this node is one.
    pub fn as_control(&self) -> Option<&Control> {
        match self {
            Node::Control(control) => Some(control),
            Node::Group(_) => None,
        }
    }

    /// The group, if this node is one.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(group) => Some(group),
            Node::Control(_) => None,
        }
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Control(a), Node::Control(b)) => a.ptr_eq(b),
            (Node::Group(a), Node::Group(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub(crate) fn reset_silent(&self) {
        match self {
            Node::Control(control) => control.reset_silent(),
            Node::Group(group) => group.reset_silent(),
        }
    }

    pub(crate) fn adopt(&self, link: Option<Link>) {
        match self {
            Node::Control(control) => control.adopt(link),
            Node::Group(group) => group.adopt(link),
        }
    }

    pub(crate) fn detach_from(&self, owner: &Weak<RwLock<ControlInner>>) {
        match self {
            Node::Control(control) => control.detach_from(owner),
            Node::Group(group) => group.detach_from(owner),
        }
    }

    pub(crate) fn held_elsewhere(&self, adopter: Option<&Weak<RwLock<ControlInner>>>) -> bool {
        match self {
            Node::Control(control) => control.held_elsewhere(adopter),
            Node::Group(group) => group.held_elsewhere(adopter),
        }
    }

    pub(crate) fn apply_cascade(&self, kind: FlagKind, cascade: Cascade) -> bool {
        match self {
            Node::Control(control) => control.apply_cascade(kind, cascade),
            Node::Group(group) => group.apply_cascade(kind, cascade),
        }
    }
}

impl From<Control> for Node {
    fn from(control: Control) -> Self {
        Node::Control(control)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}
