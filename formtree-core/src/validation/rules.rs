//! Built-in validators.

use serde_json::Value;

use super::validator::{Validation, Validator};

/// Whether a value counts as "not provided".
///
/// `null`, blank strings, empty arrays and empty objects are empty.
/// Everything else, including `0` and `false`, is a value.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Rejects empty values (see [`is_empty`]).
pub fn required() -> Validator {
    Validator::new("required", |value: &Value| {
        if is_empty(value) {
            Validation::invalid("required")
        } else {
            Validation::valid()
        }
    })
}

/// Strings with fewer than `min` characters, or arrays with fewer than `min`
/// items, are invalid. Other values pass.
pub fn min_length(min: usize) -> Validator {
    Validator::new("min_length", move |value: &Value| match length(value) {
        Some(len) if len < min => Validation::invalid(format!("must have at least {min} items")),
        _ => Validation::valid(),
    })
}

/// Strings with more than `max` characters, or arrays with more than `max`
/// items, are invalid. Other values pass.
pub fn max_length(max: usize) -> Validator {
    Validator::new("max_length", move |value: &Value| match length(value) {
        Some(len) if len > max => Validation::invalid(format!("must have at most {max} items")),
        _ => Validation::valid(),
    })
}

/// Numbers below `min` are invalid. Non-numbers pass; combine with
/// [`required`] to reject them.
pub fn min(min: f64) -> Validator {
    Validator::new("min", move |value: &Value| match value.as_f64() {
        Some(n) if n < min => Validation::invalid(format!("must be at least {min}")),
        _ => Validation::valid(),
    })
}

/// Numbers above `max` are invalid. Non-numbers pass.
pub fn max(max: f64) -> Validator {
    Validator::new("max", move |value: &Value| match value.as_f64() {
        Some(n) if n > max => Validation::invalid(format!("must be at most {max}")),
        _ => Validation::valid(),
    })
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}
