//! Validator Pipeline
//!
//! Validators are predicates evaluated against a control's current value.
//! A control is valid when every attached validator accepts the value; a
//! control without validators is always valid.
//!
//! Synchronous validators are evaluated eagerly on every value change.
//! Asynchronous validators return [`Outcome::Pending`]; the control keeps
//! the last result it knew for them and applies the new one when the host
//! awaits [`Control::settle`](crate::tree::Control::settle).

mod validator;
pub mod rules;

pub use validator::{Outcome, Validation, ValidationContext, Validator};
