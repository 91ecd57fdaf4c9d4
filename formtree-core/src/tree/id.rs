//! Element identifiers.
//!
//! Every group gets a stable identifier when it is created. Collections use
//! it to find an element's current slot, since positions shift under insert
//! and remove.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Stable identity of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(u64);

impl ElementId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ElementId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of fresh element identifiers, injected into the
/// [`Factory`](crate::factory::Factory).
///
/// Identifiers must be unique among all groups that can end up in the same
/// collection, so one generator should be shared per form.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ElementId;
}

/// Monotonic counter owned by a single factory.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> ElementId {
        ElementId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn next_id(&self) -> ElementId {
        ElementId(self())
    }
}
