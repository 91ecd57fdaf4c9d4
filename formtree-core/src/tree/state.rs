//! Node Status
//!
//! Every node in the tree carries the same five pieces of state: dirty,
//! touched, valid, readonly and disabled. The last two cascade from a node
//! into its descendants, and the cascade has to know *where* a flag value
//! came from.
//!
//! # Flag Origins
//!
//! A flag configured on a node when it was built (`Explicit`) survives a
//! construction-time value pushed down from an ancestor (`Inherited`). A
//! value set through a setter after construction (`Runtime`) is pushed down
//! as an override and replaces every descendant flag, explicit or not.
//!
//! Only `Explicit` resists inheritance. A node that set its own flag at
//! runtime and then enters a new owner takes that owner's value.

use serde::Serialize;

/// Where a node's readonly or disabled value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagOrigin {
    /// Never configured. The flag holds `false`.
    Default,

    /// Configured on this node when it was constructed.
    Explicit,

    /// Pushed down from an ancestor's construction-time configuration, or
    /// taken from the owning control when entering a collection.
    Inherited,

    /// Set through a setter after construction.
    Runtime,
}

/// A cascading boolean flag together with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Flag {
    value: bool,
    origin: FlagOrigin,
}

impl Flag {
    /// An unconfigured flag.
    pub const fn unset() -> Self {
        Self {
            value: false,
            origin: FlagOrigin::Default,
        }
    }

    /// A flag configured at construction time.
    pub const fn explicit(value: bool) -> Self {
        Self {
            value,
            origin: FlagOrigin::Explicit,
        }
    }

    /// Current value.
    pub fn get(&self) -> bool {
        self.value
    }

    /// Where the current value came from.
    pub fn origin(&self) -> FlagOrigin {
        self.origin
    }

    /// Whether the value was configured on this node at construction.
    ///
    /// Locked flags ignore [`Cascade::Inherit`].
    pub fn is_locked(&self) -> bool {
        self.origin == FlagOrigin::Explicit
    }

    /// Apply a cascade step. Returns `false` when the flag kept its value
    /// because it is locked against inheritance.
    pub fn apply(&mut self, cascade: Cascade) -> bool {
        match cascade {
            Cascade::Override(value) => {
                self.value = value;
                self.origin = FlagOrigin::Runtime;
                true
            }
            Cascade::Inherit(value) => {
                if self.is_locked() {
                    return false;
                }
                self.value = value;
                self.origin = FlagOrigin::Inherited;
                true
            }
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::unset()
    }
}

/// Selects one of the two cascading flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    ReadOnly,
    Disabled,
}

/// How a flag value travels from an owner into the nodes it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    /// Construction-time value; skips nodes with an explicit flag.
    Inherit(bool),

    /// Runtime setter value; replaces every descendant's flag.
    Override(bool),
}

impl Cascade {
    /// The cascade an owner applies to a node entering it.
    ///
    /// An owner whose flag was set at runtime overrides newcomers; any other
    /// owner hands its value to every newcomer without an explicit flag.
    pub fn from_owner(flag: Flag) -> Self {
        match flag.origin() {
            FlagOrigin::Runtime => Cascade::Override(flag.get()),
            _ => Cascade::Inherit(flag.get()),
        }
    }
}

/// The shared state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub dirty: bool,
    pub touched: bool,
    pub valid: bool,
    pub readonly: Flag,
    pub disabled: Flag,
}

impl Status {
    pub fn flag(&self, kind: FlagKind) -> Flag {
        match kind {
            FlagKind::ReadOnly => self.readonly,
            FlagKind::Disabled => self.disabled,
        }
    }

    pub fn flag_mut(&mut self, kind: FlagKind) -> &mut Flag {
        match kind {
            FlagKind::ReadOnly => &mut self.readonly,
            FlagKind::Disabled => &mut self.disabled,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self {
            dirty: false,
            touched: false,
            valid: true,
            readonly: Flag::unset(),
            disabled: Flag::unset(),
        }
    }
}
