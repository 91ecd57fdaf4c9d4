//! Snapshots
//!
//! A snapshot is an immutable picture of a node, handed to the sink after
//! every externally visible change.
//!
//! # Structural Sharing
//!
//! Each node caches its latest snapshot behind an `Arc`. When a node changes
//! it builds a new snapshot that points at the cached snapshots of its
//! children, so only the nodes on the path from the change to the root get a
//! new identity. A view layer can therefore compare with [`Arc::ptr_eq`] to
//! decide what to re-render, and siblings of an edited element keep the
//! exact same `Arc`.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::id::ElementId;
use super::state::Status;

/// Immutable picture of a group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    pub id: ElementId,
    pub status: Status,
    /// Keys of the direct children that are invalid.
    pub invalids: Vec<String>,
    pub controls: IndexMap<String, NodeSnapshot>,
}

impl GroupSnapshot {
    /// Project the snapshot to a plain value, like
    /// [`Group::build`](super::Group::build).
    pub fn build(&self) -> Value {
        Value::Object(
            self.controls
                .iter()
                .map(|(key, node)| (key.clone(), node.build()))
                .collect(),
        )
    }

    /// Snapshot of a direct child.
    pub fn get(&self, key: &str) -> Option<&NodeSnapshot> {
        self.controls.get(key)
    }
}

/// Immutable picture of a control.
#[derive(Debug, Clone, Serialize)]
pub struct ControlSnapshot {
    pub key: String,
    pub status: Status,
    /// Messages reported by failing validators.
    pub errors: Vec<String>,
    pub value: SnapshotValue,
}

impl ControlSnapshot {
    pub fn build(&self) -> Value {
        self.value.build()
    }
}

/// The value held by a control snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Plain(Value),
    Group(Arc<GroupSnapshot>),
    Groups(Vec<Arc<GroupSnapshot>>),
    Controls(Vec<Arc<ControlSnapshot>>),
}

impl SnapshotValue {
    pub fn build(&self) -> Value {
        match self {
            SnapshotValue::Plain(value) => value.clone(),
            SnapshotValue::Group(group) => group.build(),
            SnapshotValue::Groups(groups) => {
                Value::Array(groups.iter().map(|group| group.build()).collect())
            }
            SnapshotValue::Controls(controls) => {
                Value::Array(controls.iter().map(|control| control.build()).collect())
            }
        }
    }
}

/// Snapshot of either kind of node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSnapshot {
    Control(Arc<ControlSnapshot>),
    Group(Arc<GroupSnapshot>),
}

impl NodeSnapshot {
    pub fn status(&self) -> Status {
        match self {
            NodeSnapshot::Control(control) => control.status,
            NodeSnapshot::Group(group) => group.status,
        }
    }

    pub fn build(&self) -> Value {
        match self {
            NodeSnapshot::Control(control) => control.build(),
            NodeSnapshot::Group(group) => group.build(),
        }
    }

    /// Whether both snapshots are the same allocation.
    pub fn ptr_eq(&self, other: &NodeSnapshot) -> bool {
        match (self, other) {
            (NodeSnapshot::Control(a), NodeSnapshot::Control(b)) => Arc::ptr_eq(a, b),
            (NodeSnapshot::Group(a), NodeSnapshot::Group(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn control(key: &str, value: Value) -> Arc<ControlSnapshot> {
        Arc::new(ControlSnapshot {
            key: key.into(),
            status: Status::default(),
            errors: Vec::new(),
            value: SnapshotValue::Plain(value),
        })
    }

    #[test]
    fn group_snapshot_builds_nested_values() {
        let inner = Arc::new(GroupSnapshot {
            id: ElementId::from(1),
            status: Status::default(),
            invalids: Vec::new(),
            controls: IndexMap::from([(
                "v".to_string(),
                NodeSnapshot::Control(control("v", json!(2))),
            )]),
        });

        let outer = GroupSnapshot {
            id: ElementId::from(0),
            status: Status::default(),
            invalids: Vec::new(),
            controls: IndexMap::from([
                ("name".to_string(), NodeSnapshot::Control(control("name", json!("Ann")))),
                (
                    "items".to_string(),
                    NodeSnapshot::Control(Arc::new(ControlSnapshot {
                        key: "items".into(),
                        status: Status::default(),
                        errors: Vec::new(),
                        value: SnapshotValue::Groups(vec![inner]),
                    })),
                ),
            ]),
        };

        assert_eq!(outer.build(), json!({"name": "Ann", "items": [{"v": 2}]}));
    }

    #[test]
    fn ptr_eq_compares_allocations() {
        let a = NodeSnapshot::Control(control("a", json!(1)));
        let same = a.clone();
        let other = NodeSnapshot::Control(control("a", json!(1)));

        assert!(a.ptr_eq(&same));
        assert!(!a.ptr_eq(&other));
    }

    #[test]
    fn snapshots_serialize() {
        let snapshot = NodeSnapshot::Control(control("age", json!(3)));
        let encoded = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(encoded["kind"], json!("control"));
        assert_eq!(encoded["value"], json!(3));
        assert_eq!(encoded["status"]["valid"], json!(true));
    }
}
