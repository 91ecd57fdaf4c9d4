//! Validator Implementation
//!
//! A validator is a predicate over a control's current value. It answers
//! either right away or with a future that answers later.
//!
//! # Identity
//!
//! Validators are compared by identity, not by behaviour: a clone of a
//! validator is the same validator, two validators built from identical
//! closures are not. This is what [`Control::remove_validator`] and
//! [`Control::has_validator`] rely on.
//!
//! [`Control::remove_validator`]: crate::tree::Control::remove_validator
//! [`Control::has_validator`]: crate::tree::Control::has_validator

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

/// Result of checking one value against one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub message: Option<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl From<bool> for Validation {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            message: None,
        }
    }
}

impl From<Result<(), String>> for Validation {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::valid(),
            Err(message) => Self::invalid(message),
        }
    }
}

/// What a validator returns.
pub enum Outcome {
    /// The answer is known now.
    Ready(Validation),

    /// The answer arrives later. Until it does, the control keeps the last
    /// result it saw from this validator.
    Pending(BoxFuture<'static, Validation>),
}

impl Outcome {
    pub fn ready(validation: impl Into<Validation>) -> Self {
        Outcome::Ready(validation.into())
    }
}

impl Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(validation) => f.debug_tuple("Ready").field(validation).finish(),
            Outcome::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Extra information passed to every validator.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Key of the control being validated.
    pub key: &'a str,
}

type CheckFn = dyn Fn(&Value, &ValidationContext<'_>) -> Outcome + Send + Sync;

/// A named, shareable validator.
#[derive(Clone)]
pub struct Validator {
    name: Cow<'static, str>,
    check: Arc<CheckFn>,
}

impl Validator {
    /// Create a synchronous validator.
    ///
    /// The closure may return anything convertible into a [`Validation`]:
    /// a `bool`, a `Result<(), String>`, or a `Validation` itself.
    pub fn new<F, R>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<Validation>,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |value: &Value, _ctx: &ValidationContext<'_>| {
                Outcome::Ready(check(value).into())
            }),
        }
    }

    /// Create a validator that also sees the [`ValidationContext`] and
    /// decides for itself whether to answer now or later.
    pub fn with_context<F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&Value, &ValidationContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Create an asynchronous validator.
    ///
    /// The closure receives an owned copy of the value so the returned
    /// future can outlive the call.
    pub fn future<F, Fut>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Validation> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(move |value: &Value, _ctx: &ValidationContext<'_>| {
                Outcome::Pending(check(value.clone()).boxed())
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the validator against a value.
    pub fn run(&self, value: &Value, ctx: &ValidationContext<'_>) -> Outcome {
        (self.check)(value, ctx)
    }

    /// Whether both handles refer to the same validator.
    pub fn same(&self, other: &Validator) -> bool {
        Arc::ptr_eq(&self.check, &other.check)
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Validator {}

impl Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ValidationContext<'static> {
        ValidationContext { key: "field" }
    }

    #[test]
    fn sync_validator_answers_ready() {
        let positive = Validator::new("positive", |value: &Value| {
            value.as_i64().map_or(false, |n| n > 0)
        });

        match positive.run(&json!(3), &ctx()) {
            Outcome::Ready(validation) => assert!(validation.is_valid()),
            Outcome::Pending(_) => panic!("expected a ready outcome"),
        }
        match positive.run(&json!(-1), &ctx()) {
            Outcome::Ready(validation) => assert!(!validation.is_valid()),
            Outcome::Pending(_) => panic!("expected a ready outcome"),
        }
    }

    #[test]
    fn result_validators_carry_messages() {
        let short = Validator::new("short", |value: &Value| -> Result<(), String> {
            match value.as_str() {
                Some(s) if s.len() <= 3 => Ok(()),
                _ => Err("too long".into()),
            }
        });

        match short.run(&json!("abcd"), &ctx()) {
            Outcome::Ready(validation) => {
                assert_eq!(validation, Validation::invalid("too long"));
            }
            Outcome::Pending(_) => panic!("expected a ready outcome"),
        }
    }

    #[test]
    fn context_reaches_the_validator() {
        let keyed = Validator::with_context("keyed", |_value, ctx| {
            Outcome::ready(ctx.key == "field")
        });

        match keyed.run(&Value::Null, &ctx()) {
            Outcome::Ready(validation) => assert!(validation.is_valid()),
            Outcome::Pending(_) => panic!("expected a ready outcome"),
        }
    }

    #[test]
    fn future_validator_is_pending() {
        let remote = Validator::future("remote", |_value| async { Validation::valid() });
        assert!(matches!(remote.run(&json!(1), &ctx()), Outcome::Pending(_)));
    }

    #[test]
    fn identity_survives_clone_only() {
        let a = Validator::new("a", |_: &Value| true);
        let a_clone = a.clone();
        let b = Validator::new("a", |_: &Value| true);

        assert_eq!(a, a_clone);
        assert_ne!(a, b);
    }
}
