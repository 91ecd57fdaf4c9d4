//! Construction Factory
//!
//! Turns a [`Template`] into a live tree. Every group the factory builds
//! takes its element id from the factory's [`IdGenerator`], so groups built
//! by one factory can share a collection without colliding.
//!
//! # Example
//!
//! ```rust,ignore
//! use formtree_core::factory::{Factory, Template, TreeOptions};
//! use formtree_core::validation::rules::required;
//!
//! let factory = Factory::new();
//! let form = factory.create_tree(
//!     Template::new()
//!         .validated("name", "", [required()])
//!         .validated("age", 0, [required()]),
//!     None,
//!     TreeOptions::default(),
//! );
//!
//! assert!(!form.valid());
//! form.control("name").unwrap().set_value(serde_json::json!("Ann"));
//! assert!(form.valid());
//! ```

mod template;

pub use template::{Field, Template};

use std::fmt::{self, Debug};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::FormResult;
use crate::tree::{Control, Group, IdGenerator, Node, SequentialIds, Sink};

/// Construction-time options for a tree root.
///
/// `Some` flags are explicit configuration: children that did not set their
/// own flag inherit it, and it holds until a runtime setter on an ancestor
/// overrides it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeOptions {
    pub read_only: Option<bool>,
    pub disabled: Option<bool>,
}

impl TreeOptions {
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }
}

/// Builds groups from templates.
#[derive(Clone)]
pub struct Factory {
    ids: Arc<dyn IdGenerator>,
}

impl Factory {
    /// Factory numbering groups from zero.
    pub fn new() -> Self {
        Self::with_ids(SequentialIds::new())
    }

    /// Factory drawing element ids from `ids`.
    pub fn with_ids(ids: impl IdGenerator + 'static) -> Self {
        Self { ids: Arc::new(ids) }
    }

    /// Build a root group reporting to `sink`.
    ///
    /// Building does not emit; the first snapshot reaches the sink on the
    /// first change.
    pub fn create_tree(&self, template: Template, sink: Option<Sink>, options: TreeOptions) -> Group {
        let root = self.group_with(template, options);
        if let Some(sink) = sink {
            root.set_sink(sink);
        }
        debug!(group = %root.id(), fields = root.len(), "created tree");
        root
    }

    /// Build a root from a JSON object. See [`Template::from_json`].
    pub fn from_json(&self, template: Value, sink: Option<Sink>, options: TreeOptions) -> FormResult<Group> {
        let template = Template::from_json(template)?;
        Ok(self.create_tree(template, sink, options))
    }

    /// Build a group without flags, e.g. an element for a collection.
    pub fn group(&self, template: Template) -> Group {
        self.group_with(template, TreeOptions::default())
    }

    /// Build a group with explicit construction-time flags.
    pub fn group_with(&self, template: Template, options: TreeOptions) -> Group {
        let controls: IndexMap<String, Node> = template
            .into_fields()
            .into_iter()
            .map(|(key, field)| {
                let node = self.node(&key, field);
                (key, node)
            })
            .collect();

        Group::assemble(self.ids.next_id(), controls, options.read_only, options.disabled)
    }

    fn node(&self, key: &str, field: Field) -> Node {
        match field {
            Field::Value(value) => Control::new(key, value).into(),
            Field::Validated(value, validators) => Control::with_validators(key, value, validators).into(),
            Field::Group(group) => group.into(),
            Field::Groups(groups) => Control::new(key, groups).into(),
            Field::Controls(controls) => Control::new(key, controls).into(),
            Field::Nested(template) => self.group(template).into(),
            Field::NestedList(templates) => {
                let groups: Vec<Group> = templates.into_iter().map(|template| self.group(template)).collect();
                Control::new(key, groups).into()
            }
        }
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory").finish_non_exhaustive()
    }
}
