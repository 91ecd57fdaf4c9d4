//! Collection Reconciler
//!
//! When a control holds groups, structural changes to its value (index
//! assignment, insert, remove, wholesale replacement) must stay observable
//! and must keep identity straight.
//!
//! # Identity, Not Position
//!
//! Each group carries an [`ElementId`] assigned at creation. The control
//! keeps an index table from id to current slot, rebuilt on every
//! structural change. A group reporting a change is located through that
//! table at the moment it reports, never through a position remembered
//! earlier, so editing one element after its neighbours moved still
//! updates the right slot and leaves every other slot alone.
//!
//! # Entering and Leaving
//!
//! On every structural change the reconciler computes which nodes enter
//! and which leave:
//!
//! - An entering node is wired to report into the owning control and takes
//!   the control's current readonly/disabled flags, following the
//!   explicit-vs-runtime override rules (see [`Cascade::from_owner`]).
//! - A leaving node is unwired, so it can no longer reach this control.
//! - A node still wired into another live owner is refused. Moving a group
//!   between collections means removing it from the first one before
//!   adding it to the second.
//!
//! # Interception
//!
//! [`GroupSeq`] is the only way to edit a collection in place. It records
//! whether any slot really changed and the owning control emits exactly
//! once for the whole edit.
//!
//! [`Cascade::from_owner`]: super::state::Cascade::from_owner

use std::collections::{HashMap, HashSet};
use std::sync::Weak;

use parking_lot::RwLock;
use tracing::warn;

use super::control::{ControlInner, ControlValue};
use super::group::Group;
use super::id::ElementId;
use super::node::Node;

/// Index table from element id to current slot.
#[derive(Debug, Default)]
pub(crate) struct Collection {
    positions: HashMap<ElementId, usize>,
}

impl Collection {
    pub(crate) fn reindex(&mut self, value: &ControlValue) {
        self.positions.clear();
        for (position, group) in value.groups().iter().enumerate() {
            self.positions.insert(group.id(), position);
        }
    }

    pub(crate) fn position(&self, id: ElementId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Nodes entering and leaving a control's value.
#[derive(Debug, Default)]
pub(crate) struct Reconciliation {
    pub(crate) entering: Vec<Node>,
    pub(crate) leaving: Vec<Node>,
}

impl Reconciliation {
    pub(crate) fn plan(previous: &ControlValue, incoming: &ControlValue, index: &Collection) -> Self {
        let mut plan = Self::default();

        for group in incoming.groups() {
            let held = index
                .position(group.id())
                .and_then(|position| previous.groups().get(position))
                .is_some_and(|current| current.ptr_eq(group));
            if !held {
                plan.entering.push(Node::Group(group.clone()));
            }
        }
        for group in previous.groups() {
            if !incoming.groups().iter().any(|kept| kept.ptr_eq(group)) {
                plan.leaving.push(Node::Group(group.clone()));
            }
        }

        for control in incoming.controls() {
            if !previous.controls().iter().any(|held| held.ptr_eq(control)) {
                plan.entering.push(Node::Control(control.clone()));
            }
        }
        for control in previous.controls() {
            if !incoming.controls().iter().any(|kept| kept.ptr_eq(control)) {
                plan.leaving.push(Node::Control(control.clone()));
            }
        }

        plan
    }
}

/// Drop repeated members of a collection, keeping the first occurrence.
///
/// A node has exactly one owner, so the same group can't sit in two slots,
/// and two groups sharing an id would make identity lookup ambiguous.
pub(crate) fn dedupe(key: &str, value: ControlValue) -> ControlValue {
    match value {
        ControlValue::Groups(groups) => {
            let mut seen = HashSet::with_capacity(groups.len());
            let mut kept: Vec<Group> = Vec::with_capacity(groups.len());
            for group in groups {
                let id = group.id();
                if seen.insert(id) {
                    kept.push(group);
                } else if kept.iter().any(|other| other.ptr_eq(&group)) {
                    warn!(key = %key, element = %id, "group appears twice in collection; keeping the first slot");
                } else {
                    warn!(key = %key, element = %id, "element id collision in collection; dropping the later group");
                }
            }
            ControlValue::Groups(kept)
        }
        ControlValue::Controls(controls) => {
            let mut kept = Vec::with_capacity(controls.len());
            for control in controls {
                if kept.iter().any(|other: &super::Control| other.ptr_eq(&control)) {
                    warn!(key = %key, "control appears twice in list; keeping the first slot");
                } else {
                    kept.push(control);
                }
            }
            ControlValue::Controls(kept)
        }
        other => other,
    }
}

/// Filter a value down to what `owner` may hold: repeats are dropped and
/// so are nodes that still report into another live owner.
///
/// A single group that belongs elsewhere rejects the whole value.
pub(crate) fn admit(
    key: &str,
    value: ControlValue,
    owner: &Weak<RwLock<ControlInner>>,
) -> Option<ControlValue> {
    let free = |group: &Group| {
        let held = group.held_elsewhere(Some(owner));
        if held {
            warn!(key = %key, element = %group.id(), "group already belongs to another owner; not adopting it");
        }
        !held
    };

    match dedupe(key, value) {
        ControlValue::Group(group) => free(&group).then_some(ControlValue::Group(group)),
        ControlValue::Groups(groups) => Some(ControlValue::Groups(groups.into_iter().filter(|group| free(group)).collect())),
        ControlValue::Controls(controls) => Some(ControlValue::Controls(
            controls
                .into_iter()
                .filter(|control| {
                    let held = control.held_elsewhere(Some(owner));
                    if held {
                        warn!(key = %key, "control already belongs to another owner; not adopting it");
                    }
                    !held
                })
                .collect(),
        )),
        plain => Some(plain),
    }
}

/// A collection of groups open for structural editing.
///
/// Obtained from [`Control::update_groups`](super::Control::update_groups).
#[derive(Debug)]
pub struct GroupSeq {
    key: String,
    items: Vec<Group>,
    changed: bool,
}

impl GroupSeq {
    pub(crate) fn new(key: String, items: Vec<Group>) -> Self {
        Self {
            key,
            items,
            changed: false,
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection holds no groups.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Group at `index`.
    pub fn get(&self, index: usize) -> Option<&Group> {
        self.items.get(index)
    }

    /// Groups in slot order.
    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.items.iter()
    }

    /// Current slot of the group with the given id.
    pub fn position(&self, id: ElementId) -> Option<usize> {
        self.items.iter().position(|group| group.id() == id)
    }

    /// Assign a slot. Assigning at `len()` appends; past that is ignored.
    ///
    /// Returns the group previously in the slot, if it was replaced.
    pub fn set(&mut self, index: usize, group: Group) -> Option<Group> {
        let len = self.items.len();
        if index == len {
            self.push(group);
            return None;
        }
        let Some(slot) = self.items.get_mut(index) else {
            warn!(key = %self.key, index, len, "index assignment past the end of the collection ignored");
            return None;
        };
        if slot.ptr_eq(&group) {
            return None;
        }
        self.changed = true;
        Some(std::mem::replace(slot, group))
    }

    /// Append a group. A group still held by another owner is dropped
    /// when the edit is applied.
    pub fn push(&mut self, group: Group) {
        self.items.push(group);
        self.changed = true;
    }

    /// Insert at `index`, shifting later groups. Returns `false` if `index`
    /// is past the end.
    pub fn insert(&mut self, index: usize, group: Group) -> bool {
        if index > self.items.len() {
            warn!(key = %self.key, index, len = self.items.len(), "insert past the end of the collection ignored");
            return false;
        }
        self.items.insert(index, group);
        self.changed = true;
        true
    }

    /// Remove the group at `index`. `None` if out of range.
    pub fn remove(&mut self, index: usize) -> Option<Group> {
        if index >= self.items.len() {
            return None;
        }
        self.changed = true;
        Some(self.items.remove(index))
    }

    pub fn pop(&mut self) -> Option<Group> {
        let popped = self.items.pop();
        self.changed |= popped.is_some();
        popped
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.items.len() {
            self.items.truncate(len);
            self.changed = true;
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        let len = self.items.len();
        if a != b && a < len && b < len {
            self.items.swap(a, b);
            self.changed = true;
        }
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Group) -> bool,
    {
        let before = self.items.len();
        self.items.retain(keep);
        self.changed |= self.items.len() != before;
    }

    pub(crate) fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn into_vec(self) -> Vec<Group> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{Factory, Template};
    use crate::tree::id::SequentialIds;
    use serde_json::json;

    fn item(factory: &Factory, v: i64) -> Group {
        factory.group(Template::new().value("v", v))
    }

    #[test]
    fn index_tracks_current_positions() {
        let factory = Factory::new();
        let (a, b, c) = (item(&factory, 1), item(&factory, 2), item(&factory, 3));

        let mut index = Collection::default();
        index.reindex(&ControlValue::Groups(vec![a.clone(), b.clone(), c.clone()]));
        assert_eq!(index.position(b.id()), Some(1));

        index.reindex(&ControlValue::Groups(vec![c.clone(), a.clone()]));
        assert_eq!(index.position(c.id()), Some(0));
        assert_eq!(index.position(a.id()), Some(1));
        assert_eq!(index.position(b.id()), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn plan_finds_entering_and_leaving_groups() {
        let factory = Factory::new();
        let (a, b, c) = (item(&factory, 1), item(&factory, 2), item(&factory, 3));

        let previous = ControlValue::Groups(vec![a.clone(), b.clone()]);
        let mut index = Collection::default();
        index.reindex(&previous);

        let incoming = ControlValue::Groups(vec![b.clone(), c.clone()]);
        let plan = Reconciliation::plan(&previous, &incoming, &index);

        assert_eq!(plan.entering.len(), 1);
        assert!(plan.entering[0].as_group().unwrap().ptr_eq(&c));
        assert_eq!(plan.leaving.len(), 1);
        assert!(plan.leaving[0].as_group().unwrap().ptr_eq(&a));
    }

    #[test]
    fn reordering_is_not_entering() {
        let factory = Factory::new();
        let (a, b) = (item(&factory, 1), item(&factory, 2));

        let previous = ControlValue::Groups(vec![a.clone(), b.clone()]);
        let mut index = Collection::default();
        index.reindex(&previous);

        let plan = Reconciliation::plan(&previous, &ControlValue::Groups(vec![b, a]), &index);
        assert!(plan.entering.is_empty());
        assert!(plan.leaving.is_empty());
    }

    #[test]
    fn dedupe_drops_repeats_and_collisions() {
        let factory = Factory::new();
        let a = item(&factory, 1);
        // A second factory counting from the same start collides with `a`.
        let other = Factory::with_ids(SequentialIds::new());
        let clash = item(&other, 9);
        assert_eq!(a.id(), clash.id());

        let value = dedupe("items", ControlValue::Groups(vec![a.clone(), a.clone(), clash]));
        let groups = value.groups();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].ptr_eq(&a));
    }

    #[test]
    fn admit_refuses_nodes_held_elsewhere() {
        let factory = Factory::new();
        let (a, b) = (item(&factory, 1), item(&factory, 2));
        let holder = crate::tree::Control::new("left", vec![a.clone()]);
        let owner = Weak::new();

        let value = admit("right", ControlValue::Groups(vec![a.clone(), b.clone()]), &owner).unwrap();
        assert_eq!(value.groups().len(), 1);
        assert!(value.groups()[0].ptr_eq(&b));
        assert!(admit("right", ControlValue::Group(a.clone()), &owner).is_none());

        // Once the holder is gone the group is free again.
        drop(holder);
        assert!(admit("right", ControlValue::Group(a), &owner).is_some());
    }

    #[test]
    fn seq_tracks_real_changes_only() {
        let factory = Factory::new();
        let (a, b) = (item(&factory, 1), item(&factory, 2));

        let mut seq = GroupSeq::new("items".into(), vec![a.clone(), b.clone()]);
        assert!(seq.set(0, a.clone()).is_none());
        seq.swap(1, 1);
        seq.truncate(5);
        assert!(seq.remove(7).is_none());
        assert!(seq.set(9, a.clone()).is_none());
        assert!(!seq.is_changed());

        assert!(seq.set(0, b.clone()).unwrap().ptr_eq(&a));
        assert!(seq.is_changed());
    }

    #[test]
    fn seq_set_at_len_appends() {
        let factory = Factory::new();
        let (a, b) = (item(&factory, 1), item(&factory, 2));

        let mut seq = GroupSeq::new("items".into(), vec![a]);
        seq.set(1, b.clone());
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.position(b.id()), Some(1));
        assert_eq!(seq.get(1).unwrap().build(), json!({"v": 2}));
    }
}
