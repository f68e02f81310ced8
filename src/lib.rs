//! Expands nested matrix documents into flat configuration records.
//!
//! A matrix document describes variation compactly: arrays are alternatives,
//! sibling keys multiply, `$multiply` groups whole documents into one axis,
//! `$if` filters against an external config, `$dynamic` computes a field from
//! the rest of the record and `$value` attaches attributes to a literal.
//!
//! ```
//! use serde_json::json;
//!
//! let matrix = matrix_expand::generate_matrix(
//!     &json!({"os": ["mac", "linux"], "label": "build"}),
//!     &json!({}),
//! )
//! .unwrap();
//!
//! assert_eq!(matrix.len(), 2);
//! assert_eq!(matrix[1]["os"], json!("linux"));
//! ```
//!
//! The pipeline runs in three stages: [`flattener`] produces partial records,
//! [`evaluator`] resolves `$dynamic` fields and drops records whose `$if`
//! predicates fail, and [`mask`] removes duplicates and records made redundant
//! by a more specific one.

pub mod cartesian;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod flattener;
pub mod generator;
pub mod mask;
pub mod record;
pub mod settings;
pub mod telemetry;

pub use error::{MatrixError, Result};
pub use evaluator::{ExpressionEvaluator, Scope};
pub use expr::ExprEngine;
pub use generator::{generate_matrix, MatrixGenerator};
pub use record::Record;
pub use settings::Settings;
