//! Property-based invariant tests for group aggregation.
//!
//! After any sequence of edits:
//!
//! 1. A group is valid exactly when every child is valid.
//! 2. A group is dirty exactly when some child is dirty.
//! 3. `invalids` is empty exactly when the group is valid, and lists the
//!    invalid children in order.
//! 4. The last snapshot handed to the sink agrees with the live tree.
//! 5. Resetting twice gives the same state as resetting once.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};

use formtree_core::factory::{Factory, Template, TreeOptions};
use formtree_core::tree::{Group, GroupSnapshot, Sink};
use formtree_core::validation::rules::required;

const FIELDS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Edit {
    Set(usize, Value),
    SetElement(usize, Value),
    Push,
    Remove(usize),
    Touch(usize),
    Reset,
    ReadOnly(bool),
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!("")),
        Just(json!(null)),
        Just(json!(0)),
        "[a-z]{1,4}".prop_map(Value::from),
    ]
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..FIELDS.len(), value_strategy()).prop_map(|(i, v)| Edit::Set(i, v)),
        (0usize..4, value_strategy()).prop_map(|(i, v)| Edit::SetElement(i, v)),
        Just(Edit::Push),
        (0usize..4).prop_map(Edit::Remove),
        (0..FIELDS.len()).prop_map(Edit::Touch),
        Just(Edit::Reset),
        any::<bool>().prop_map(Edit::ReadOnly),
    ]
}

fn element(factory: &Factory) -> Group {
    factory.group(Template::new().validated("v", "x", [required()]))
}

fn build(factory: &Factory, sink: Sink) -> Group {
    let template = FIELDS
        .iter()
        .fold(Template::new(), |template, key| template.validated(*key, "", [required()]))
        .groups("items", [element(factory)]);
    factory.create_tree(template, Some(sink), TreeOptions::default())
}

fn apply(factory: &Factory, form: &Group, edit: Edit) {
    match edit {
        Edit::Set(i, value) => {
            form.control(FIELDS[i]).unwrap().set_value(value);
        }
        Edit::SetElement(i, value) => {
            let items = form.control("items").unwrap().groups();
            if let Some(group) = items.get(i) {
                group.control("v").unwrap().set_value(value);
            }
        }
        Edit::Push => {
            let group = element(factory);
            form.control("items")
                .unwrap()
                .update_groups(|seq| seq.push(group))
                .unwrap();
        }
        Edit::Remove(i) => {
            form.control("items")
                .unwrap()
                .update_groups(|seq| seq.remove(i))
                .unwrap();
        }
        Edit::Touch(i) => form.control(FIELDS[i]).unwrap().mark_touched(),
        Edit::Reset => form.reset(),
        Edit::ReadOnly(flag) => form.set_readonly(flag),
    }
}

proptest! {
    #[test]
    fn aggregates_follow_children(edits in prop::collection::vec(edit_strategy(), 0..24)) {
        let last: Arc<Mutex<Option<Arc<GroupSnapshot>>>> = Arc::new(Mutex::new(None));
        let writer = last.clone();
        let sink: Sink = Arc::new(move |snapshot: Arc<GroupSnapshot>| *writer.lock() = Some(snapshot));

        let factory = Factory::new();
        let form = build(&factory, sink);

        for edit in edits {
            apply(&factory, &form, edit);

            let children = form.controls();
            let all_valid = children.iter().all(|(_, node)| node.valid());
            let any_dirty = children.iter().any(|(_, node)| node.dirty());
            let any_touched = children.iter().any(|(_, node)| node.touched());
            let expected_invalids: Vec<String> = children
                .iter()
                .filter(|(_, node)| !node.valid())
                .map(|(key, _)| key.clone())
                .collect();

            prop_assert_eq!(form.valid(), all_valid);
            prop_assert_eq!(form.dirty(), any_dirty);
            prop_assert_eq!(form.touched(), any_touched);
            prop_assert_eq!(form.invalids().is_empty(), form.valid());
            prop_assert_eq!(form.invalids(), expected_invalids);

            if let Some(snapshot) = last.lock().as_ref() {
                prop_assert!(Arc::ptr_eq(snapshot, &form.snapshot()));
                prop_assert_eq!(snapshot.build(), form.build());
            }
        }
    }

    #[test]
    fn reset_is_idempotent(edits in prop::collection::vec(edit_strategy(), 0..16)) {
        let factory = Factory::new();
        let form = build(&factory, Arc::new(|_: Arc<GroupSnapshot>| {}));
        for edit in edits {
            apply(&factory, &form, edit);
        }

        form.reset();
        let once = (form.status(), form.build(), form.invalids());
        form.reset();
        let twice = (form.status(), form.build(), form.invalids());

        prop_assert_eq!(once, twice);
        prop_assert!(!form.dirty());
        prop_assert!(!form.touched());
    }
}
