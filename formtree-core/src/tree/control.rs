//! Control Implementation
//!
//! A Control is a leaf node holding one value and an ordered list of
//! validators.
//!
//! # How Controls Work
//!
//! 1. Setting a value that differs from the current one re-runs every
//!    validator, marks the control dirty and touched, and emits a snapshot.
//!
//! 2. If the new value holds groups (one group, or a sequence of them), the
//!    control first reconciles them: newcomers are wired to report into this
//!    control and inherit its readonly/disabled flags, departing groups are
//!    unwired. Nodes that still report into another live owner are not
//!    adopted. See the [collection module](super::collection).
//!
//! 3. When a held group reports a change, the control finds the group's
//!    current slot by its element id, replaces only that slot in its
//!    snapshot, re-validates and emits.
//!
//! # Validity
//!
//! A control is valid when every validator accepts the plain projection of
//! its value and every group it holds is valid.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use futures_util::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::collection::{self, Collection, GroupSeq, Reconciliation};
use super::group::Group;
use super::id::ElementId;
use super::link::Link;
use super::node::{Node, FLAG_KINDS};
use super::snapshot::{ControlSnapshot, GroupSnapshot, NodeSnapshot, SnapshotValue};
use super::state::{Cascade, FlagKind, Status};
use crate::error::{FormError, FormResult};
use crate::validation::{Outcome, Validation, ValidationContext, Validator};

/// The value held by a control.
#[derive(Debug, Clone)]
pub enum ControlValue {
    /// Any plain value, including plain arrays and maps.
    Plain(Value),
    /// A nested group.
    Group(Group),
    /// An ordered collection of groups.
    Groups(Vec<Group>),
    /// An ordered list of plain controls.
    Controls(Vec<Control>),
}

impl ControlValue {
    /// Plain value projection.
    pub fn build(&self) -> Value {
        match self {
            ControlValue::Plain(value) => value.clone(),
            ControlValue::Group(group) => group.build(),
            ControlValue::Groups(groups) => Value::Array(groups.iter().map(Group::build).collect()),
            ControlValue::Controls(controls) => {
                Value::Array(controls.iter().map(Control::build).collect())
            }
        }
    }

    /// The plain value, if this is not a node-holding value.
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            ControlValue::Plain(value) => Some(value),
            _ => None,
        }
    }

    /// Groups held by this value, in order.
    pub fn groups(&self) -> &[Group] {
        match self {
            ControlValue::Group(group) => std::slice::from_ref(group),
            ControlValue::Groups(groups) => groups,
            ControlValue::Plain(_) | ControlValue::Controls(_) => &[],
        }
    }

    /// Controls held by this value, in order.
    pub fn controls(&self) -> &[Control] {
        match self {
            ControlValue::Controls(controls) => controls,
            _ => &[],
        }
    }

    /// Whether two values are the same: equal plain values, or the same
    /// nodes in the same order.
    pub fn same_as(&self, other: &ControlValue) -> bool {
        match (self, other) {
            (ControlValue::Plain(a), ControlValue::Plain(b)) => a == b,
            (ControlValue::Group(a), ControlValue::Group(b)) => a.ptr_eq(b),
            (ControlValue::Groups(a), ControlValue::Groups(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.ptr_eq(b))
            }
            (ControlValue::Controls(a), ControlValue::Controls(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.ptr_eq(b))
            }
            _ => false,
        }
    }

    /// Every node held by this value.
    pub(crate) fn members(&self) -> Vec<Node> {
        self.groups()
            .iter()
            .cloned()
            .map(Node::Group)
            .chain(self.controls().iter().cloned().map(Node::Control))
            .collect()
    }

    fn snapshot(&self) -> SnapshotValue {
        match self {
            ControlValue::Plain(value) => SnapshotValue::Plain(value.clone()),
            ControlValue::Group(group) => SnapshotValue::Group(group.snapshot()),
            ControlValue::Groups(groups) => {
                SnapshotValue::Groups(groups.iter().map(Group::snapshot).collect())
            }
            ControlValue::Controls(controls) => {
                SnapshotValue::Controls(controls.iter().map(Control::snapshot).collect())
            }
        }
    }
}

impl From<Value> for ControlValue {
    fn from(value: Value) -> Self {
        ControlValue::Plain(value)
    }
}

impl From<Group> for ControlValue {
    fn from(group: Group) -> Self {
        ControlValue::Group(group)
    }
}

impl From<Vec<Group>> for ControlValue {
    fn from(groups: Vec<Group>) -> Self {
        ControlValue::Groups(groups)
    }
}

impl From<Vec<Control>> for ControlValue {
    fn from(controls: Vec<Control>) -> Self {
        ControlValue::Controls(controls)
    }
}

/// Options for [`Control::patch_value_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOptions {
    /// Emit a snapshot after patching. Stateless patches still update
    /// value, validity and dirty state.
    pub emit: bool,
}

impl PatchOptions {
    /// Patch without notifying the owner.
    pub fn silent() -> Self {
        Self { emit: false }
    }
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self { emit: true }
    }
}

/// A validator together with the last result it produced.
struct Check {
    validator: Validator,
    last: Validation,
}

impl Check {
    fn new(validator: Validator) -> Self {
        Self {
            validator,
            last: Validation::valid(),
        }
    }
}

/// An async validator result still in flight.
struct PendingCheck {
    validator: Validator,
    generation: u64,
    future: BoxFuture<'static, Validation>,
}

pub(crate) struct ControlInner {
    key: String,
    initial: ControlValue,
    value: ControlValue,
    checks: SmallVec<[Check; 2]>,
    errors: Vec<String>,
    status: Status,
    /// Set by value writes, cleared by reset. Held groups add their own
    /// dirty/touched on top.
    changed: bool,
    touched: bool,
    index: Collection,
    /// Bumped on every validator run; async results from older runs are
    /// discarded.
    generation: u64,
    pending: Mutex<Vec<PendingCheck>>,
    snapshot: Arc<ControlSnapshot>,
    link: Option<Link>,
}

/// A leaf node holding one value and its validators.
///
/// `Control` is a cheap handle; clones refer to the same node.
#[derive(Clone)]
pub struct Control {
    inner: Arc<RwLock<ControlInner>>,
}

impl Control {
    /// Create a control without validators.
    pub fn new(key: impl Into<String>, value: impl Into<ControlValue>) -> Self {
        Self::with_validators(key, value, std::iter::empty())
    }

    /// Create a control with validators, evaluated right away.
    pub fn with_validators<I>(key: impl Into<String>, value: impl Into<ControlValue>, validators: I) -> Self
    where
        I: IntoIterator<Item = Validator>,
    {
        let key = key.into();

        let control = Self {
            inner: Arc::new(RwLock::new(ControlInner {
                key: key.clone(),
                initial: ControlValue::Plain(Value::Null),
                value: ControlValue::Plain(Value::Null),
                checks: validators.into_iter().map(Check::new).collect(),
                errors: Vec::new(),
                status: Status::default(),
                changed: false,
                touched: false,
                index: Collection::default(),
                generation: 0,
                pending: Mutex::new(Vec::new()),
                snapshot: Arc::new(ControlSnapshot {
                    key,
                    status: Status::default(),
                    errors: Vec::new(),
                    value: SnapshotValue::Plain(Value::Null),
                }),
                link: None,
            })),
        };

        let value = control
            .admit(value.into())
            .unwrap_or(ControlValue::Plain(Value::Null));
        control.inner.write().initial = value.clone();
        control.install(value);
        control.refresh(None);
        control
    }

    /// Key under which the owner knows this control.
    pub fn key(&self) -> String {
        self.inner.read().key.clone()
    }

    /// Whether both handles refer to the same control.
    pub fn ptr_eq(&self, other: &Control) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current value. Group values are handles to the live groups.
    pub fn value(&self) -> ControlValue {
        self.inner.read().value.clone()
    }

    /// Groups held by the value, or an empty list.
    pub fn groups(&self) -> Vec<Group> {
        self.inner.read().value.groups().to_vec()
    }

    /// Plain value projection.
    pub fn build(&self) -> Value {
        self.value().build()
    }

    /// Replace the value.
    ///
    /// Returns `false` if the new value is the same as the current one, in
    /// which case nothing happens.
    pub fn set_value(&self, value: impl Into<ControlValue>) -> bool {
        self.write_value(value.into(), true)
    }

    /// Merge `partial` into the value and emit.
    pub fn patch_value(&self, partial: impl Into<ControlValue>) -> bool {
        self.patch_value_with(partial, PatchOptions::default())
    }

    /// Merge `partial` into the value.
    ///
    /// A plain map value is shallow-merged with a plain map `partial`. A
    /// group value is patched key by key. Anything else is replaced
    /// wholesale.
    pub fn patch_value_with(&self, partial: impl Into<ControlValue>, options: PatchOptions) -> bool {
        let current = self.value();
        match (current, partial.into()) {
            (ControlValue::Plain(Value::Object(mut merged)), ControlValue::Plain(Value::Object(fields))) => {
                merged.extend(fields);
                self.write_value(ControlValue::Plain(Value::Object(merged)), options.emit)
            }
            (ControlValue::Group(group), ControlValue::Plain(partial @ Value::Object(_))) => {
                if !group.patch_silent(&partial) {
                    return false;
                }
                self.refresh(None);
                if options.emit {
                    self.emit();
                }
                true
            }
            (_, partial) => self.write_value(partial, options.emit),
        }
    }

    /// Reset to the initial state.
    ///
    /// Held groups and controls are reset recursively; a plain value is
    /// restored to the initial value. Dirty and touched are cleared.
    pub fn reset(&self) {
        self.reset_silent();
        self.emit();
    }

    /// Mark the control touched without changing its value.
    pub fn mark_touched(&self) {
        self.inner.write().touched = true;
        self.recompute(None);
        self.emit();
    }

    /// Attach a validator. Returns `false` if it is already attached.
    pub fn add_validator(&self, validator: Validator) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.checks.iter().any(|check| check.validator == validator) {
                return false;
            }
            inner.checks.push(Check::new(validator));
        }
        self.refresh(None);
        self.emit();
        true
    }

    /// Detach a validator. Returns `false` if it was not attached.
    pub fn remove_validator(&self, validator: &Validator) -> bool {
        {
            let mut inner = self.inner.write();
            let before = inner.checks.len();
            inner.checks.retain(|check| check.validator != *validator);
            if inner.checks.len() == before {
                return false;
            }
        }
        self.refresh(None);
        self.emit();
        true
    }

    /// Whether `validator` is attached.
    pub fn has_validator(&self, validator: &Validator) -> bool {
        self.inner
            .read()
            .checks
            .iter()
            .any(|check| check.validator == *validator)
    }

    /// Messages of the validators that currently reject the value.
    pub fn errors(&self) -> Vec<String> {
        self.inner.read().errors.clone()
    }

    /// Current state of the control.
    pub fn status(&self) -> Status {
        self.inner.read().status
    }

    /// Whether the value or any held node changed since the last reset.
    pub fn dirty(&self) -> bool {
        self.status().dirty
    }

    /// Whether the control or any held node was touched since the last reset.
    pub fn touched(&self) -> bool {
        self.status().touched
    }

    /// Whether every validator passes and every held node is valid.
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

    /// Set readonly, forcing it onto every held group first.
    pub fn set_readonly(&self, readonly: bool) {
        self.apply_cascade(FlagKind::ReadOnly, Cascade::Override(readonly));
        self.emit();
    }

    /// Set disabled, forcing it onto every held group first.
    pub fn set_disabled(&self, disabled: bool) {
        self.apply_cascade(FlagKind::Disabled, Cascade::Override(disabled));
        self.emit();
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<ControlSnapshot> {
        self.inner.read().snapshot.clone()
    }

    /// Edit the held collection of groups in place.
    ///
    /// Every structural edit made through the [`GroupSeq`] is collected;
    /// if any slot actually changed, the result is reconciled and emitted
    /// exactly once when `edit` returns.
    pub fn update_groups<F, R>(&self, edit: F) -> FormResult<R>
    where
        F: FnOnce(&mut GroupSeq) -> R,
    {
        let mut seq = {
            let inner = self.inner.read();
            match &inner.value {
                ControlValue::Groups(groups) => GroupSeq::new(inner.key.clone(), groups.clone()),
                _ => {
                    return Err(FormError::NotACollection {
                        key: inner.key.clone(),
                    })
                }
            }
        };

        let output = edit(&mut seq);
        if seq.is_changed() {
            self.write_value(ControlValue::Groups(seq.into_vec()), true);
        }
        Ok(output)
    }

    /// Drive outstanding async validators to completion.
    ///
    /// Results computed against a value that has since been re-validated
    /// are dropped. Returns `true` if any result was applied.
    pub async fn settle(&self) -> bool {
        let pending = std::mem::take(&mut *self.inner.read().pending.lock());
        if pending.is_empty() {
            return false;
        }

        let (origins, futures): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|check| ((check.validator, check.generation), check.future))
            .unzip();
        let results = join_all(futures).await;

        let applied = {
            let mut inner = self.inner.write();
            let mut applied = false;
            for ((validator, generation), result) in origins.into_iter().zip(results) {
                if generation != inner.generation {
                    debug!(key = %inner.key, validator = validator.name(), "discarding superseded async result");
                    continue;
                }
                if let Some(check) = inner.checks.iter_mut().find(|check| check.validator == validator) {
                    check.last = result;
                    applied = true;
                }
            }
            applied
        };

        if applied {
            self.recompute(None);
            self.emit();
        }
        applied
    }

    /// Child lookup used by [`Group::find`].
    pub(crate) fn child(&self, segment: &str) -> Option<Node> {
        match self.value() {
            ControlValue::Group(group) => group.get_control(segment),
            ControlValue::Groups(groups) => {
                groups.get(segment.parse::<usize>().ok()?).cloned().map(Node::Group)
            }
            ControlValue::Controls(controls) => {
                controls.get(segment.parse::<usize>().ok()?).cloned().map(Node::Control)
            }
            ControlValue::Plain(_) => None,
        }
    }

    pub(crate) fn upgrade(weak: &Weak<RwLock<ControlInner>>) -> Option<Self> {
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

    pub(crate) fn reset_silent(&self) {
        let (current, initial) = {
            let inner = self.inner.read();
            (inner.value.clone(), inner.initial.clone())
        };
        if matches!(current, ControlValue::Plain(_)) && !current.same_as(&initial) {
            if let Some(initial) = self.admit(initial) {
                self.install(initial);
            }
        }

        for member in self.value().members() {
            member.reset_silent();
        }

        {
            let mut inner = self.inner.write();
            inner.changed = false;
            inner.touched = false;
        }
        self.refresh(None);
    }

    pub(crate) fn apply_cascade(&self, kind: FlagKind, cascade: Cascade) -> bool {
        let members = {
            let mut inner = self.inner.write();
            if !inner.status.flag_mut(kind).apply(cascade) {
                return false;
            }
            inner.value.members()
        };

        for member in &members {
            member.apply_cascade(kind, cascade);
        }
        self.recompute(None);
        true
    }

    /// Called through a held node's [`Link::Holder`].
    pub(crate) fn element_changed(&self, element: Option<ElementId>, snapshot: NodeSnapshot) {
        let replaced = match (element, snapshot) {
            (Some(id), NodeSnapshot::Group(group)) => {
                let inner = self.inner.read();
                if inner.index.position(id).is_none() {
                    debug!(key = %inner.key, element = %id, "ignoring notification from a group no longer held");
                    return;
                }
                Some((id, group))
            }
            _ => None,
        };

        self.refresh(replaced);
        self.emit();
    }

    fn write_value(&self, value: ControlValue, emit: bool) -> bool {
        let Some(value) = self.admit(value) else {
            return false;
        };
        if self.inner.read().value.same_as(&value) {
            return false;
        }

        self.install(value);
        {
            let mut inner = self.inner.write();
            inner.changed = true;
            inner.touched = true;
        }
        self.refresh(None);
        if emit {
            self.emit();
        }
        true
    }

    /// Filter `value` down to what this control may hold. `None` when a
    /// single held group belongs to another owner.
    fn admit(&self, value: ControlValue) -> Option<ControlValue> {
        let key = self.inner.read().key.clone();
        collection::admit(&key, value, &Arc::downgrade(&self.inner))
    }

    /// Reconcile an admitted value against the current one and store it.
    fn install(&self, incoming: ControlValue) {
        let (key, status, plan) = {
            let inner = self.inner.read();
            let plan = Reconciliation::plan(&inner.value, &incoming, &inner.index);
            (inner.key.clone(), inner.status, plan)
        };

        let owner = Arc::downgrade(&self.inner);
        for node in &plan.leaving {
            node.detach_from(&owner);
        }
        for node in &plan.entering {
            let element = match node {
                Node::Group(group) => Some(group.id()),
                Node::Control(_) => None,
            };
            node.adopt(Some(Link::Holder {
                control: owner.clone(),
                element,
            }));
            for kind in FLAG_KINDS {
                node.apply_cascade(kind, Cascade::from_owner(status.flag(kind)));
            }
        }

        if !plan.entering.is_empty() || !plan.leaving.is_empty() {
            trace!(
                key = %key,
                entering = plan.entering.len(),
                leaving = plan.leaving.len(),
                "reconciled control value"
            );
        }

        let mut inner = self.inner.write();
        inner.index.reindex(&incoming);
        inner.value = incoming;
    }

    fn refresh(&self, replaced: Option<(ElementId, Arc<GroupSnapshot>)>) {
        self.evaluate();
        self.recompute(replaced);
    }

    /// Run every validator against the current value.
    ///
    /// Validators run without any lock held.
    fn evaluate(&self) {
        let (key, value, validators) = {
            let inner = self.inner.read();
            let validators: SmallVec<[Validator; 2]> =
                inner.checks.iter().map(|check| check.validator.clone()).collect();
            (inner.key.clone(), inner.value.build(), validators)
        };

        let ctx = ValidationContext { key: &key };
        let outcomes: Vec<(Validator, Outcome)> = validators
            .into_iter()
            .map(|validator| {
                let outcome = validator.run(&value, &ctx);
                (validator, outcome)
            })
            .collect();

        let mut inner = self.inner.write();
        inner.generation += 1;
        let generation = inner.generation;

        let mut pending = Vec::new();
        for (validator, outcome) in outcomes {
            match outcome {
                Outcome::Ready(result) => {
                    if let Some(check) = inner.checks.iter_mut().find(|check| check.validator == validator) {
                        check.last = result;
                    }
                }
                Outcome::Pending(future) => pending.push(PendingCheck {
                    validator,
                    generation,
                    future,
                }),
            }
        }
        *inner.pending.get_mut() = pending;
    }

    /// Recompute status and snapshot from the last validator results and
    /// the held nodes. Does not emit.
    fn recompute(&self, replaced: Option<(ElementId, Arc<GroupSnapshot>)>) {
        let (value, patched) = {
            let inner = self.inner.read();
            let patched = replaced.and_then(|(id, group)| {
                let position = inner.index.position(id)?;
                match &inner.snapshot.value {
                    SnapshotValue::Groups(slots) if slots.len() == inner.index.len() => {
                        let mut slots = slots.clone();
                        *slots.get_mut(position)? = group;
                        Some(SnapshotValue::Groups(slots))
                    }
                    SnapshotValue::Group(_) if position == 0 => Some(SnapshotValue::Group(group)),
                    _ => None,
                }
            });
            (inner.value.clone(), patched)
        };

        let mut held_valid = true;
        let mut held_dirty = false;
        let mut held_touched = false;
        for member in value.members() {
            let status = member.status();
            held_valid &= status.valid;
            held_dirty |= status.dirty;
            held_touched |= status.touched;
        }
        let value_snapshot = patched.unwrap_or_else(|| value.snapshot());

        let mut inner = self.inner.write();
        let errors: Vec<String> = inner
            .checks
            .iter()
            .filter(|check| !check.last.valid)
            .map(|check| {
                check
                    .last
                    .message
                    .clone()
                    .unwrap_or_else(|| check.validator.name().to_string())
            })
            .collect();

        inner.status.valid = errors.is_empty() && held_valid;
        inner.status.dirty = inner.changed || held_dirty;
        inner.status.touched = inner.touched || held_touched;
        inner.errors = errors.clone();
        inner.snapshot = Arc::new(ControlSnapshot {
            key: inner.key.clone(),
            status: inner.status,
            errors,
            value: value_snapshot,
        });
    }

    /// Hand the cached snapshot to the owner.
    fn emit(&self) {
        let (snapshot, link) = {
            let inner = self.inner.read();
            (inner.snapshot.clone(), inner.link.clone())
        };
        trace!(key = %snapshot.key, valid = snapshot.status.valid, "emitting control snapshot");
        if let Some(link) = link {
            link.deliver(NodeSnapshot::Control(snapshot));
        }
    }
}

impl Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Control")
            .field("key", &inner.key)
            .field("value", &inner.value)
            .field("status", &inner.status)
            .field("validators", &inner.checks.len())
            .finish()
    }
}
