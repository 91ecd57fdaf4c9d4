//! Group Implementation
//!
//! A Group is a composite node owning a named map of child nodes. Its own
//! state is derived from its children:
//!
//! - `dirty`   = any child dirty
//! - `touched` = any child touched
//! - `valid`   = every child valid (`invalids` is empty)
//!
//! # Propagation
//!
//! A child that changes reports to its group through a [`Link`]. The group
//! recomputes its aggregate ([`Group::internal_update`]) and then reports to
//! its own owner. The aggregate recompute never emits on its own: whoever
//! triggered the mutation emits once, after every affected node is
//! consistent.
//!
//! Bulk operations (`patch_value`, `reset`, flag setters) mutate children
//! silently, recompute once, and emit once.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::control::{ControlInner, PatchOptions};
use super::id::ElementId;
use super::link::{Link, Sink};
use super::node::{Node, FLAG_KINDS};
use super::snapshot::{GroupSnapshot, NodeSnapshot};
use super::state::{Cascade, Flag, FlagKind, Status};
use super::Control;
use crate::error::json_kind;

pub(crate) struct GroupInner {
    id: ElementId,
    controls: IndexMap<String, Node>,
    status: Status,
    invalids: Vec<String>,
    snapshot: Arc<GroupSnapshot>,
    link: Option<Link>,
}

/// A composite node holding named children.
///
/// `Group` is a cheap handle; clones refer to the same node.
#[derive(Clone)]
pub struct Group {
    inner: Arc<RwLock<GroupInner>>,
}

impl Group {
    /// Wire `controls` under a new group.
    ///
    /// `Some` flags are explicit construction-time configuration: they are
    /// handed down to every child that did not configure its own. Children
    /// that already report into another live owner are left out.
    pub(crate) fn assemble(
        id: ElementId,
        mut controls: IndexMap<String, Node>,
        readonly: Option<bool>,
        disabled: Option<bool>,
    ) -> Self {
        let mut status = Status::default();
        if let Some(value) = readonly {
            status.readonly = Flag::explicit(value);
        }
        if let Some(value) = disabled {
            status.disabled = Flag::explicit(value);
        }

        controls.retain(|key, node| {
            let held = node.held_elsewhere(None);
            if held {
                warn!(group = %id, key = %key, "child already belongs to another owner; leaving it out");
            }
            !held
        });

        let group = Self {
            inner: Arc::new(RwLock::new(GroupInner {
                id,
                controls: IndexMap::new(),
                status,
                invalids: Vec::new(),
                snapshot: Arc::new(GroupSnapshot {
                    id,
                    status,
                    invalids: Vec::new(),
                    controls: IndexMap::new(),
                }),
                link: None,
            })),
        };

        for (key, node) in &controls {
            node.adopt(Some(group.link_for(key)));
            for kind in FLAG_KINDS {
                let flag = status.flag(kind);
                if flag.is_locked() {
                    node.apply_cascade(kind, Cascade::Inherit(flag.get()));
                }
            }
        }

        group.inner.write().controls = controls;
        group.internal_update();
        group
    }

    /// Stable identity, assigned at creation.
    pub fn id(&self) -> ElementId {
        self.inner.read().id
    }

    /// Whether both handles refer to the same group.
    pub fn ptr_eq(&self, other: &Group) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Children in insertion order.
    pub fn controls(&self) -> Vec<(String, Node)> {
        self.inner
            .read()
            .controls
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect()
    }

    /// Child keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().controls.keys().cloned().collect()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.inner.read().controls.len()
    }

    /// Whether the group has no children.
    pub fn is_empty(&self) -> bool {
        self.inner.read().controls.is_empty()
    }

    /// Look up a direct child. `None` when the key is unknown.
    pub fn get_control(&self, key: &str) -> Option<Node> {
        self.inner.read().controls.get(key).cloned()
    }

    /// Look up a direct child that is a control.
    pub fn control(&self, key: &str) -> Option<Control> {
        match self.get_control(key)? {
            Node::Control(control) => Some(control),
            Node::Group(_) => None,
        }
    }

    /// Look up a direct child that is a group.
    pub fn group(&self, key: &str) -> Option<Group> {
        match self.get_control(key)? {
            Node::Group(group) => Some(group),
            Node::Control(_) => None,
        }
    }

    /// Look up a node by dotted path, e.g. `"address.city"` or
    /// `"items.0.name"`. Numeric segments index into collections.
    pub fn find(&self, path: &str) -> Option<Node> {
        let mut segments = path.split('.');
        let mut node = self.get_control(segments.next()?)?;
        for segment in segments {
            node = match node {
                Node::Group(group) => group.get_control(segment)?,
                Node::Control(control) => control.child(segment)?,
            };
        }
        Some(node)
    }

    /// Add new children.
    ///
    /// If any key already exists, or any node still belongs to another
    /// owner, the whole call is rejected: nothing is added, the existing
    /// children are untouched, and `false` is returned.
    pub fn add_controls<I, K>(&self, controls: I) -> bool
    where
        I: IntoIterator<Item = (K, Node)>,
        K: Into<String>,
    {
        let controls: IndexMap<String, Node> = controls
            .into_iter()
            .map(|(key, node)| (key.into(), node))
            .collect();

        let status = {
            let inner = self.inner.read();
            if let Some(duplicate) = controls.keys().find(|key| inner.controls.contains_key(*key)) {
                warn!(group = %inner.id, key = %duplicate, "add_controls rejected: key already exists");
                return false;
            }
            inner.status
        };

        if let Some(key) = controls.iter().find(|(_, node)| node.held_elsewhere(None)).map(|(key, _)| key) {
            warn!(group = %self.id(), key = %key, "add_controls rejected: node already belongs to another owner");
            return false;
        }

        for (key, node) in &controls {
            node.adopt(Some(self.link_for(key)));
            for kind in FLAG_KINDS {
                node.apply_cascade(kind, Cascade::from_owner(status.flag(kind)));
            }
        }

        self.inner.write().controls.extend(controls);
        self.internal_update();
        self.emit();
        true
    }

    /// Patch child values from a keyed map.
    ///
    /// Nested groups are patched recursively; controls go through
    /// [`Control::patch_value`]. Unknown keys are logged and skipped. One
    /// snapshot is emitted for the whole call, and none if nothing changed.
    pub fn patch_value(&self, partial: &Value) {
        if self.patch_silent(partial) {
            self.emit();
        }
    }

    /// Reset every child to its initial state.
    pub fn reset(&self) {
        self.reset_silent();
        self.emit();
    }

    /// Plain value tree of the group.
    pub fn build(&self) -> Value {
        Value::Object(
            self.controls()
                .into_iter()
                .map(|(key, node)| (key, node.build()))
                .collect(),
        )
    }

    /// Keys of the direct children that are currently invalid.
    pub fn invalids(&self) -> Vec<String> {
        self.inner.read().invalids.clone()
    }

    /// Aggregate state of the group.
    pub fn status(&self) -> Status {
        self.inner.read().status
    }

    /// Whether any child is dirty.
    pub fn dirty(&self) -> bool {
        self.status().dirty
    }

    /// Whether any child is touched.
    pub fn touched(&self) -> bool {
        self.status().touched
    }

    /// Whether every child is valid.
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

    /// Set readonly on this group and force it onto every descendant.
    pub fn set_readonly(&self, readonly: bool) {
        self.apply_cascade(FlagKind::ReadOnly, Cascade::Override(readonly));
        self.emit();
    }

    /// Set disabled on this group and force it onto every descendant.
    pub fn set_disabled(&self, disabled: bool) {
        self.apply_cascade(FlagKind::Disabled, Cascade::Override(disabled));
        self.emit();
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<GroupSnapshot> {
        self.inner.read().snapshot.clone()
    }

    /// Make this group a root reporting to `sink`.
    pub fn set_sink(&self, sink: Sink) {
        self.inner.write().link = Some(Link::Sink(sink));
    }

    pub(crate) fn upgrade(weak: &Weak<RwLock<GroupInner>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn adopt(&self, link: Option<Link>) {
        self.inner.write().link = link;
    }

    pub(crate) fn detach_from(&self, owner: &Weak<RwLock<ControlInner>>) {
        let mut inner = self.inner.write();
        if inner.link.as_ref().is_some_and(|link| link.targets(owner)) {
            inner.link = None;
        }
    }

    pub(crate) fn held_elsewhere(&self, adopter: Option<&Weak<RwLock<ControlInner>>>) -> bool {
        self.inner
            .read()
            .link
            .as_ref()
            .is_some_and(|link| link.held_elsewhere(adopter))
    }

    /// Patch children without emitting. Returns whether any child changed.
    pub(crate) fn patch_silent(&self, partial: &Value) -> bool {
        let Value::Object(fields) = partial else {
            warn!(group = %self.id(), found = json_kind(partial), "patch_value expects a keyed map");
            return false;
        };

        let mut changed = false;
        for (key, value) in fields {
            changed |= match self.get_control(key) {
                None => {
                    warn!(group = %self.id(), key = %key, "patch_value skipped unknown key");
                    false
                }
                Some(Node::Group(group)) => group.patch_silent(value),
                Some(Node::Control(control)) => {
                    control.patch_value_with(value.clone(), PatchOptions::silent())
                }
            };
        }

        if changed {
            self.internal_update();
        }
        changed
    }

    pub(crate) fn reset_silent(&self) {
        for (_, node) in self.controls() {
            node.reset_silent();
        }
        self.internal_update();
    }

    pub(crate) fn apply_cascade(&self, kind: FlagKind, cascade: Cascade) -> bool {
        let children: Vec<Node> = {
            let mut inner = self.inner.write();
            if !inner.status.flag_mut(kind).apply(cascade) {
                return false;
            }
            inner.controls.values().cloned().collect()
        };

        for child in &children {
            child.apply_cascade(kind, cascade);
        }
        self.internal_update();
        true
    }

    /// Called through a child's [`Link::Parent`].
    pub(crate) fn child_changed(&self, key: &str) {
        if !self.inner.read().controls.contains_key(key) {
            debug!(group = %self.id(), key = %key, "ignoring notification from unknown child");
            return;
        }
        self.internal_update();
        self.emit();
    }

    /// Recompute the aggregate state and the cached snapshot from the
    /// children. Does not emit.
    pub(crate) fn internal_update(&self) {
        let children = self.controls();

        let mut dirty = false;
        let mut touched = false;
        let mut invalids = Vec::new();
        let mut snapshots = IndexMap::with_capacity(children.len());

        for (key, node) in children {
            let snapshot = node.snapshot();
            let status = snapshot.status();
            dirty |= status.dirty;
            touched |= status.touched;
            if !status.valid {
                invalids.push(key.clone());
            }
            snapshots.insert(key, snapshot);
        }

        let mut inner = self.inner.write();
        inner.status.dirty = dirty;
        inner.status.touched = touched;
        inner.status.valid = invalids.is_empty();
        inner.invalids = invalids.clone();
        inner.snapshot = Arc::new(GroupSnapshot {
            id: inner.id,
            status: inner.status,
            invalids,
            controls: snapshots,
        });
    }

    /// Hand the cached snapshot to the owner.
    pub(crate) fn emit(&self) {
        let (snapshot, link) = {
            let inner = self.inner.read();
            (inner.snapshot.clone(), inner.link.clone())
        };
        trace!(group = %snapshot.id, valid = snapshot.status.valid, "emitting group snapshot");
        if let Some(link) = link {
            link.deliver(NodeSnapshot::Group(snapshot));
        }
    }

    fn link_for(&self, key: &str) -> Link {
        Link::Parent {
            group: Arc::downgrade(&self.inner),
            key: key.to_string(),
        }
    }
}

impl Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Group")
            .field("id", &inner.id)
            .field("keys", &inner.controls.keys().collect::<Vec<_>>())
            .field("status", &inner.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{Factory, Template, TreeOptions};
    use crate::validation::rules::required;
    use parking_lot::Mutex;
    use serde_json::json;

    fn person(factory: &Factory) -> Group {
        factory.group(
            Template::new()
                .validated("name", "", [required()])
                .validated("age", 0, [required()]),
        )
    }

    #[test]
    fn aggregates_child_validity() {
        let factory = Factory::new();
        let group = person(&factory);

        assert!(!group.valid());
        assert_eq!(group.invalids(), vec!["name".to_string()]);

        group.control("name").unwrap().set_value(json!("Ann"));
        assert!(group.valid());
        assert!(group.invalids().is_empty());
        assert!(group.dirty());
        assert!(group.touched());
    }

    #[test]
    fn add_controls_rejects_duplicates() {
        let factory = Factory::new();
        let group = person(&factory);
        let original = group.control("name").unwrap();

        let added = group.add_controls([
            ("email", Node::from(Control::new("email", json!("a@b.c")))),
            ("name", Node::from(Control::new("name", json!("other")))),
        ]);

        assert!(!added);
        assert_eq!(group.len(), 2);
        assert!(group.get_control("email").is_none());
        assert!(group.control("name").unwrap().ptr_eq(&original));
    }

    #[test]
    fn add_controls_rejects_nodes_owned_elsewhere() {
        let factory = Factory::new();
        let first = person(&factory);
        let second = person(&factory);
        let name = first.control("name").unwrap();

        assert!(!second.add_controls([("alias", Node::from(name.clone()))]));
        assert!(second.get_control("alias").is_none());

        // The child still reports into its original group.
        name.set_value(json!("Ann"));
        assert!(first.valid());
        assert!(!second.valid());
    }

    #[test]
    fn add_controls_wires_new_children() {
        let factory = Factory::new();
        let group = person(&factory);
        group.control("name").unwrap().set_value(json!("Ann"));

        assert!(group.add_controls([(
            "email",
            Node::from(Control::with_validators("email", json!(""), [required()])),
        )]));
        assert!(!group.valid());
        assert_eq!(group.invalids(), vec!["email".to_string()]);

        group.control("email").unwrap().set_value(json!("ann@example.com"));
        assert!(group.valid());
    }

    #[test]
    fn added_children_inherit_runtime_flags() {
        let factory = Factory::new();
        let group = person(&factory);
        group.set_readonly(true);

        group.add_controls([("email", Node::from(Control::new("email", json!(""))))]);
        assert!(group.control("email").unwrap().readonly());
    }

    #[test]
    fn patch_value_skips_unknown_keys_and_emits_once() {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let sink_log = emitted.clone();
        let sink: Sink = Arc::new(move |snapshot: Arc<GroupSnapshot>| {
            sink_log.lock().push(snapshot);
        });

        let factory = Factory::new();
        let group = factory.create_tree(
            Template::new()
                .validated("name", "", [required()])
                .value("age", 0)
                .group("address", factory.group(Template::new().value("city", "Oslo"))),
            Some(sink),
            TreeOptions::default(),
        );

        group.patch_value(&json!({
            "name": "Ann",
            "missing": 1,
            "address": {"city": "Bergen"},
        }));

        let emitted = emitted.lock();
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].build(),
            json!({"name": "Ann", "age": 0, "address": {"city": "Bergen"}})
        );
        assert!(emitted[0].status.valid);
        assert!(emitted[0].status.dirty);
    }

    #[test]
    fn patch_value_without_changes_emits_nothing() {
        let emitted = Arc::new(Mutex::new(0usize));
        let counter = emitted.clone();
        let sink: Sink = Arc::new(move |_: Arc<GroupSnapshot>| *counter.lock() += 1);

        let factory = Factory::new();
        let group = factory.create_tree(
            Template::new().value("name", "Ann"),
            Some(sink),
            TreeOptions::default(),
        );
        let before = group.snapshot();

        group.patch_value(&json!({"missing": 1}));
        group.patch_value(&json!({"name": "Ann"}));

        assert_eq!(*emitted.lock(), 0);
        assert!(Arc::ptr_eq(&before, &group.snapshot()));
        assert!(!group.dirty());
    }

    #[test]
    fn find_walks_groups_and_collections() {
        let factory = Factory::new();
        let item = factory.group(Template::new().value("v", 1));
        let root = factory.group(
            Template::new()
                .group("address", factory.group(Template::new().value("city", "Oslo")))
                .groups("items", [item.clone()]),
        );

        assert_eq!(root.find("address.city").unwrap().build(), json!("Oslo"));
        assert!(root.find("items.0").unwrap().as_group().unwrap().ptr_eq(&item));
        assert_eq!(root.find("items.0.v").unwrap().build(), json!(1));
        assert!(root.find("items.1.v").is_none());
        assert!(root.find("address.zip").is_none());
    }

    #[test]
    fn reset_twice_matches_reset_once() {
        let factory = Factory::new();
        let group = person(&factory);
        group.control("name").unwrap().set_value(json!("Ann"));

        group.reset();
        let once = (group.status(), group.build(), group.invalids());
        group.reset();
        let twice = (group.status(), group.build(), group.invalids());

        assert_eq!(once, twice);
        assert!(!group.dirty());
        assert!(!group.valid());
    }

    #[test]
    fn every_emission_is_a_new_snapshot() {
        let factory = Factory::new();
        let group = person(&factory);
        let before = group.snapshot();

        group.control("age").unwrap().set_value(json!(30));
        let after = group.snapshot();

        assert!(!Arc::ptr_eq(&before, &after));
        // The untouched sibling keeps its snapshot.
        assert!(before.controls["name"].ptr_eq(&after.controls["name"]));
        assert!(!before.controls["age"].ptr_eq(&after.controls["age"]));
    }
}
