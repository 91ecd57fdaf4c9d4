//! Template DSL.
//!
//! A [`Template`] describes the fields of a group before it exists. Fields
//! are kept in insertion order.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{json_kind, FormError, FormResult};
use crate::tree::{Control, ControlValue, Group};
use crate::validation::Validator;

/// One field of a template.
#[derive(Debug, Clone)]
pub enum Field {
    /// A control holding a bare value.
    Value(Value),
    /// A control with validators.
    Validated(ControlValue, Vec<Validator>),
    /// An already built group, adopted as a child.
    Group(Group),
    /// A control holding a collection of already built groups.
    Groups(Vec<Group>),
    /// A control holding a list of plain controls.
    Controls(Vec<Control>),
    /// A nested group, built by the factory.
    Nested(Template),
    /// A control holding a collection of groups, each built by the factory.
    NestedList(Vec<Template>),
}

/// Builder describing a group's fields.
///
/// ```rust,ignore
/// let template = Template::new()
///     .validated("name", "", [required()])
///     .value("age", 0)
///     .groups("items", [first, second]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Template {
    fields: IndexMap<String, Field>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A key that is already present is kept and the new field
    /// is dropped.
    pub fn field(mut self, key: impl Into<String>, field: Field) -> Self {
        let key = key.into();
        if self.fields.contains_key(&key) {
            warn!(key = %key, "template field declared twice; keeping the first");
            return self;
        }
        self.fields.insert(key, field);
        self
    }

    pub fn value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(key, Field::Value(value.into()))
    }

    /// A control with a value and its validators, the `[value, validators]`
    /// form.
    pub fn validated<I>(self, key: impl Into<String>, value: impl Into<Value>, validators: I) -> Self
    where
        I: IntoIterator<Item = Validator>,
    {
        self.field(
            key,
            Field::Validated(ControlValue::Plain(value.into()), validators.into_iter().collect()),
        )
    }

    pub fn group(self, key: impl Into<String>, group: Group) -> Self {
        self.field(key, Field::Group(group))
    }

    pub fn groups<I>(self, key: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = Group>,
    {
        self.field(key, Field::Groups(groups.into_iter().collect()))
    }

    /// A collection of groups with validators on the collection itself.
    pub fn validated_groups<I, V>(self, key: impl Into<String>, groups: I, validators: V) -> Self
    where
        I: IntoIterator<Item = Group>,
        V: IntoIterator<Item = Validator>,
    {
        self.field(
            key,
            Field::Validated(
                ControlValue::Groups(groups.into_iter().collect()),
                validators.into_iter().collect(),
            ),
        )
    }

    pub fn controls<I>(self, key: impl Into<String>, controls: I) -> Self
    where
        I: IntoIterator<Item = Control>,
    {
        self.field(key, Field::Controls(controls.into_iter().collect()))
    }

    pub fn nested(self, key: impl Into<String>, template: Template) -> Self {
        self.field(key, Field::Nested(template))
    }

    pub fn nested_list<I>(self, key: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = Template>,
    {
        self.field(key, Field::NestedList(templates.into_iter().collect()))
    }

    /// Read a template from a JSON object.
    ///
    /// Objects become nested groups and non-empty arrays of objects become
    /// collections of groups. Everything else, including arrays of scalars,
    /// is a bare value.
    pub fn from_json(value: Value) -> FormResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self::from_map(fields)),
            other => Err(FormError::InvalidTemplate {
                found: json_kind(&other),
            }),
        }
    }

    fn from_map(fields: Map<String, Value>) -> Self {
        fields.into_iter().fold(Self::new(), |template, (key, value)| {
            let field = match value {
                Value::Object(fields) => Field::Nested(Self::from_map(fields)),
                Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                    Field::NestedList(
                        items
                            .into_iter()
                            .filter_map(|item| match item {
                                Value::Object(fields) => Some(Self::from_map(fields)),
                                _ => None,
                            })
                            .collect(),
                    )
                }
                other => Field::Value(other),
            };
            template.field(key, field)
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub(crate) fn into_fields(self) -> IndexMap<String, Field> {
        self.fields
    }
}
