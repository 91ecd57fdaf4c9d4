//! State Tree
//!
//! This module implements the form state tree: controls, groups, and the
//! collections that hold groups. Together they form the foundation of
//! formtree's change propagation.
//!
//! # Concepts
//!
//! ## Controls
//!
//! A Control is a leaf holding one value and its validators. Its value may
//! be a plain value, a nested group, a collection of groups, or a list of
//! controls.
//!
//! ## Groups
//!
//! A Group owns a named, ordered map of children. Its dirty, touched and
//! valid state is derived from those children.
//!
//! ## Snapshots
//!
//! Every node caches an immutable snapshot of itself. A change produces a
//! new snapshot for the changed node and each of its ancestors, while
//! untouched siblings keep sharing their previous snapshots. The root hands
//! its snapshot to a [`Sink`].
//!
//! # Implementation Notes
//!
//! Nodes are cheap handles over shared state. Owners hold their children
//! strongly; children report upward through weak links, so dropping a tree
//! drops everything in it. No lock is held while a validator runs or while
//! a link delivers a notification.

mod state;
mod id;
mod snapshot;
mod link;
mod node;
mod group;
mod control;
mod collection;

pub use state::{Cascade, Flag, FlagKind, FlagOrigin, Status};
pub use id::{ElementId, IdGenerator, SequentialIds};
pub use snapshot::{ControlSnapshot, GroupSnapshot, NodeSnapshot, SnapshotValue};
pub use link::Sink;
pub use node::Node;
pub use group::Group;
pub use control::{Control, ControlValue, PatchOptions};
pub use collection::GroupSeq;
