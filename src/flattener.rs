use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use crate::cartesian::cartesian_merge;
use crate::document::{describe, without_key, Node, DYNAMIC_KEY, IF_KEY, MULTIPLY_KEY, VALUE_KEY};
use crate::error::{MatrixError, Result};
use crate::evaluator::ExpressionEvaluator;
use crate::record::{Field, PartialRecord};

/// Where a document-context value sits, for error messages.
#[derive(Debug, Clone, Copy)]
enum Location<'a> {
    Root,
    Item,
    Multiply,
    Variant { field: &'a str, key: &'a str },
    Siblings { field: &'a str },
}

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Root => write!(f, "matrix root"),
            Location::Item => write!(f, "array item"),
            Location::Multiply => write!(f, "`{MULTIPLY_KEY}` item"),
            Location::Variant { field, key } => write!(f, "variant `{key}` of field `{field}`"),
            Location::Siblings { field } => write!(f, "attributes of field `{field}`"),
        }
    }
}

/// Walks a matrix document and produces the partial records it denotes.
///
/// Arrays are unions of alternatives, object keys are independent axes that
/// get combined with a Cartesian product. Predicates and dynamic expressions
/// are syntax-checked here, evaluation happens later.
pub struct Flattener<'e> {
    evaluator: &'e dyn ExpressionEvaluator,
}

impl<'e> Flattener<'e> {
    pub fn new(evaluator: &'e dyn ExpressionEvaluator) -> Self {
        Self { evaluator }
    }

    /// Flattens a document in object-or-array context.
    pub fn flatten(&self, doc: &Value) -> Result<Vec<PartialRecord>> {
        self.flatten_at(doc, Location::Root)
    }

    fn flatten_at(&self, doc: &Value, at: Location<'_>) -> Result<Vec<PartialRecord>> {
        match Node::classify(doc) {
            // ─────────────────────────────────────────────
            // Array: every element is an alternative
            // ─────────────────────────────────────────────
            Node::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.flatten_at(item, Location::Item)?);
                }
                Ok(out)
            }

            Node::Mapping(map) if map.is_empty() => Ok(Vec::new()),

            // ─────────────────────────────────────────────
            // Object: every key is one axis
            // ─────────────────────────────────────────────
            Node::Mapping(map) => {
                let mut axes = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let axis = match key.as_str() {
                        MULTIPLY_KEY => self.multiply(value)?,
                        IF_KEY => vec![PartialRecord::with_conditions(self.conditions(value)?)],
                        _ => self.flatten_keyed(key, value)?,
                    };
                    trace!(key = %key, partials = axis.len(), "flattened key");
                    axes.push(axis);
                }
                Ok(cartesian_merge(&axes))
            }

            Node::Scalar(_) | Node::Null => Err(MatrixError::ExpectedDocument {
                at: at.to_string(),
                found: describe(doc),
            }),
        }
    }

    /// Flattens the possible values of `field`.
    pub fn flatten_keyed(&self, field: &str, doc: &Value) -> Result<Vec<PartialRecord>> {
        match Node::classify(doc) {
            Node::Scalar(value) => Ok(vec![PartialRecord::with_field(
                field,
                Field::Resolved(value.clone()),
            )]),

            Node::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.flatten_keyed(field, item)?);
                }
                Ok(out)
            }

            Node::Mapping(map) if map.contains_key(DYNAMIC_KEY) => self.dynamic(field, map),

            Node::Mapping(map) if map.contains_key(VALUE_KEY) => {
                let wrapped = map.get(VALUE_KEY).unwrap_or(&Value::Null);
                let values = self.flatten_keyed(field, wrapped)?;
                let rest = without_key(map, VALUE_KEY);
                let siblings = self.siblings(field, rest)?;
                Ok(cartesian_merge(&[values, siblings]))
            }

            Node::Mapping(map) if map.is_empty() => Err(MatrixError::EmptyVariants {
                field: field.to_string(),
            }),

            // ─────────────────────────────────────────────
            // Plain object: each key is a candidate value,
            // its nested document the attached attributes
            // ─────────────────────────────────────────────
            Node::Mapping(map) => {
                let mut out = Vec::new();
                for (key, nested) in map {
                    let choice = vec![PartialRecord::with_field(
                        field,
                        Field::Resolved(Value::String(key.clone())),
                    )];
                    let attached = self.flatten_at(nested, Location::Variant { field, key })?;
                    out.extend(cartesian_merge(&[choice, attached]));
                }
                Ok(out)
            }

            Node::Null => Err(MatrixError::UnexpectedValue {
                field: field.to_string(),
                found: describe(doc),
            }),
        }
    }

    fn dynamic(&self, field: &str, map: &Map<String, Value>) -> Result<Vec<PartialRecord>> {
        let expression = match map.get(DYNAMIC_KEY) {
            Some(Value::String(expr)) => expr,
            other => {
                return Err(MatrixError::DynamicNotString {
                    field: field.to_string(),
                    found: describe(other.unwrap_or(&Value::Null)),
                })
            }
        };
        self.evaluator.validate(expression)?;

        let deferred = vec![PartialRecord::with_field(
            field,
            Field::Deferred(expression.clone()),
        )];
        let rest = without_key(map, DYNAMIC_KEY);
        if rest.is_empty() {
            return Ok(deferred);
        }
        let siblings = self.siblings(field, rest)?;
        Ok(cartesian_merge(&[deferred, siblings]))
    }

    fn siblings(&self, field: &str, rest: Map<String, Value>) -> Result<Vec<PartialRecord>> {
        self.flatten_at(&Value::Object(rest), Location::Siblings { field })
    }

    fn multiply(&self, value: &Value) -> Result<Vec<PartialRecord>> {
        let Value::Array(items) = value else {
            return Err(MatrixError::MultiplyNotArray {
                found: describe(value),
            });
        };
        let groups = items
            .iter()
            .map(|item| self.flatten_at(item, Location::Multiply))
            .collect::<Result<Vec<_>>>()?;
        Ok(cartesian_merge(&groups))
    }

    fn conditions(&self, value: &Value) -> Result<Vec<String>> {
        let conditions = match value {
            Value::String(expr) => vec![expr.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(expr) => Ok(expr.clone()),
                    other => Err(MatrixError::InvalidCondition {
                        found: describe(other),
                    }),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(MatrixError::InvalidCondition {
                    found: describe(other),
                })
            }
        };
        for expr in &conditions {
            self.evaluator.validate(expr)?;
        }
        Ok(conditions)
    }
}
