//! Notification channels.
//!
//! A node never points at its owner. Instead it holds a [`Link`]: a weak,
//! typed channel that tells the owner "I changed". Owners keep their
//! children alive; links never do.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::control::{Control, ControlInner};
use super::group::{Group, GroupInner};
use super::id::ElementId;
use super::snapshot::{GroupSnapshot, NodeSnapshot};

/// Callback receiving the latest root snapshot after every change.
pub type Sink = Arc<dyn Fn(Arc<GroupSnapshot>) + Send + Sync>;

/// Where a node reports its changes.
#[derive(Clone)]
pub(crate) enum Link {
    /// The node is a root; hand its snapshot to the external observer.
    Sink(Sink),

    /// The node is the child `key` of a group.
    Parent {
        group: Weak<RwLock<GroupInner>>,
        key: String,
    },

    /// The node is held in a control's value. Groups carry their element id
    /// so the control can find their current slot when they report.
    Holder {
        control: Weak<RwLock<ControlInner>>,
        element: Option<ElementId>,
    },
}

impl Link {
    pub(crate) fn deliver(&self, snapshot: NodeSnapshot) {
        match self {
            Link::Sink(sink) => match snapshot {
                NodeSnapshot::Group(group) => sink(group),
                NodeSnapshot::Control(control) => {
                    debug!(key = %control.key, "sink only accepts group snapshots");
                }
            },
            Link::Parent { group, key } => {
                if let Some(group) = Group::upgrade(group) {
                    group.child_changed(key);
                }
            }
            Link::Holder { control, element } => {
                if let Some(control) = Control::upgrade(control) {
                    control.element_changed(*element, snapshot);
                }
            }
        }
    }

    /// Whether this link reports into the given control.
    pub(crate) fn targets(&self, owner: &Weak<RwLock<ControlInner>>) -> bool {
        matches!(self, Link::Holder { control, .. } if Weak::ptr_eq(control, owner))
    }

    /// Whether this link reports into a live owner other than the control
    /// `adopter`. Roots are free to be adopted.
    pub(crate) fn held_elsewhere(&self, adopter: Option<&Weak<RwLock<ControlInner>>>) -> bool {
        match self {
            Link::Sink(_) => false,
            Link::Parent { group, .. } => group.strong_count() > 0,
            Link::Holder { control, .. } => {
                control.strong_count() > 0
                    && !adopter.is_some_and(|adopter| Weak::ptr_eq(control, adopter))
            }
        }
    }
}

impl Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Sink(_) => f.write_str("Sink"),
            Link::Parent { key, .. } => f.debug_struct("Parent").field("key", key).finish(),
            Link::Holder { element, .. } => {
                f.debug_struct("Holder").field("element", element).finish()
            }
        }
    }
}
