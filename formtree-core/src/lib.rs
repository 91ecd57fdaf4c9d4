//! Formtree Core
//!
//! This crate provides a reactive state tree for form data. It implements:
//!
//! - Controls holding one value and its validators
//! - Groups aggregating dirty, touched and valid state from their children
//! - Collections of groups that keep element identity across edits
//! - Immutable snapshots with structural sharing, handed to a single sink
//!
//! The crate has no view layer. A host binds fields to widgets, writes user
//! input into controls, and re-renders from the snapshots it receives.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `tree`: Nodes, change propagation and collection reconciliation
//! - `validation`: Validators and built-in rules
//! - `factory`: Templates and the factory that turns them into trees
//! - `error`: Error type for construction and structural edits
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formtree_core::factory::{Factory, Template, TreeOptions};
//! use formtree_core::validation::rules::required;
//! use serde_json::json;
//!
//! let factory = Factory::new();
//! let form = factory.create_tree(
//!     Template::new()
//!         .validated("name", "", [required()])
//!         .validated("age", 0, [required()]),
//!     Some(Arc::new(|snapshot| println!("{}", snapshot.build()))),
//!     TreeOptions::default(),
//! );
//!
//! // "" fails `required`, 0 passes it
//! assert!(!form.valid());
//!
//! form.control("name").unwrap().set_value(json!("Ann"));
//! // Sink prints: {"name":"Ann","age":0}
//! assert!(form.valid());
//!
//! form.reset();
//! assert!(!form.valid());
//! assert!(!form.dirty());
//! ```

pub mod error;
pub mod tree;
pub mod validation;
pub mod factory;

pub use error::{FormError, FormResult};
pub use factory::{Factory, Template, TreeOptions};
pub use tree::{Control, ControlValue, Group, GroupSnapshot, Node, Sink};
pub use validation::{Validation, Validator};
