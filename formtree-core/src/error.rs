//! Error types for form tree construction and structural edits.
//!
//! Most misuse of a live tree (duplicate keys, unknown keys, stale element
//! notifications) is logged and ignored rather than returned. Only the
//! conditions below surface as errors.

use thiserror::Error;

/// Errors returned by the form tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// The template root was not a keyed map.
    #[error("template root must be a keyed map, found {found}")]
    InvalidTemplate {
        /// JSON kind of the rejected root.
        found: &'static str,
    },

    /// A structural edit was requested on a control that does not hold a
    /// sequence of groups.
    #[error("control '{key}' does not hold a collection of groups")]
    NotACollection {
        /// Key of the offending control.
        key: String,
    },
}

/// Convenience alias used throughout the crate.
pub type FormResult<T> = Result<T, FormError>;

/// Name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
