//! Dynamic field resolution and `$if` predicate filtering.
//!
//! Each flattened record gets its own [`Resolver`]. Deferred fields are
//! computed on first read, memoized, and guarded against re-entry so a field
//! whose expression reads itself fails instead of recursing forever.

use ahash::AHashMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{MatrixError, Result};
use crate::record::{Field, PartialRecord, Record};
use crate::settings::Settings;

/// Bindings visible to an expression: the external config object and the
/// fields of the record being evaluated.
pub trait Scope {
    fn config(&self) -> &Value;

    /// Value of a record field, resolving it first if it is deferred.
    /// `None` means the field is absent.
    fn field(&mut self, name: &str) -> Result<Option<Value>>;
}

/// Pluggable expression language used for `$if` and `$dynamic`.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, scope: &mut dyn Scope) -> Result<Value>;

    /// Syntax check run while flattening. Accepts everything by default.
    fn validate(&self, source: &str) -> Result<()> {
        let _ = source;
        Ok(())
    }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Ready(Option<Value>),
    Pending(String),
    Computing(String),
}

/// Per-record memo table for field values.
pub struct Resolver<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
    config: &'a Value,
    slots: Vec<(String, Slot)>,
    index: AHashMap<String, usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        evaluator: &'a dyn ExpressionEvaluator,
        config: &'a Value,
        fields: Vec<(String, Field)>,
    ) -> Self {
        let mut index = AHashMap::with_capacity(fields.len());
        let slots = fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, field))| {
                index.insert(name.clone(), i);
                let slot = match field {
                    Field::Resolved(value) => Slot::Ready(Some(value)),
                    Field::Deferred(expr) => Slot::Pending(expr),
                };
                (name, slot)
            })
            .collect();
        Self {
            evaluator,
            config,
            slots,
            index,
        }
    }

    pub fn resolve(&mut self, name: &str) -> Result<Option<Value>> {
        let Some(&i) = self.index.get(name) else {
            return Ok(None);
        };

        let expression = match &self.slots[i].1 {
            Slot::Ready(value) => return Ok(value.clone()),
            Slot::Computing(expr) => {
                return Err(MatrixError::CircularDependency {
                    field: name.to_string(),
                    expression: expr.clone(),
                })
            }
            Slot::Pending(expr) => expr.clone(),
        };

        self.slots[i].1 = Slot::Computing(expression.clone());
        let evaluator = self.evaluator;
        let computed = match evaluator
            .evaluate(&expression, self)
            .and_then(|value| dynamic_output(&expression, value))
        {
            Ok(value) => value,
            Err(err) => {
                self.slots[i].1 = Slot::Pending(expression);
                return Err(err);
            }
        };
        trace!(field = name, value = ?computed, "resolved dynamic field");
        self.slots[i].1 = Slot::Ready(computed.clone());
        Ok(computed)
    }

    /// Evaluates predicates in order, stopping at the first falsy one.
    pub fn passes(&mut self, conditions: &[String]) -> Result<bool> {
        let evaluator = self.evaluator;
        for condition in conditions {
            let verdict = evaluator.evaluate(condition, self)?;
            if !truthy(&verdict) {
                trace!(condition = %condition, "record excluded");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolves whatever is still deferred and emits a plain record.
    /// Absent fields are left out.
    pub fn materialize(mut self) -> Result<Record> {
        for i in 0..self.slots.len() {
            if matches!(self.slots[i].1, Slot::Pending(_)) {
                let name = self.slots[i].0.clone();
                self.resolve(&name)?;
            }
        }

        let mut record = Record::new();
        for (name, slot) in self.slots {
            if let Slot::Ready(Some(value)) = slot {
                record.insert(name, value);
            }
        }
        Ok(record)
    }
}

impl Scope for Resolver<'_> {
    fn config(&self) -> &Value {
        self.config
    }

    fn field(&mut self, name: &str) -> Result<Option<Value>> {
        self.resolve(name)
    }
}

/// `null` and `""` mean the field is absent. Arrays and objects are rejected:
/// record fields hold scalars only.
fn dynamic_output(expression: &str, value: Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::Array(_) | Value::Object(_) => Err(MatrixError::Evaluation {
            source_text: expression.to_string(),
            message: "dynamic field must evaluate to a scalar".to_string(),
        }),
        scalar => Ok(Some(scalar)),
    }
}

/// Runs predicates and dynamic fields for one record. `None` when a predicate
/// rejected it.
pub fn evaluate_record(
    evaluator: &dyn ExpressionEvaluator,
    config: &Value,
    partial: PartialRecord,
) -> Result<Option<Record>> {
    let (fields, conditions) = partial.into_parts();
    let mut resolver = Resolver::new(evaluator, config, fields);
    if !resolver.passes(&conditions)? {
        return Ok(None);
    }
    resolver.materialize().map(Some)
}

/// Evaluates every record, keeping input order. Large batches go through
/// rayon; the reported error is always the one of the earliest failing record.
pub fn evaluate_records(
    evaluator: &dyn ExpressionEvaluator,
    config: &Value,
    partials: Vec<PartialRecord>,
    settings: &Settings,
) -> Result<Vec<Record>> {
    let total = partials.len();
    let results: Vec<Result<Option<Record>>> = if total >= settings.parallel_threshold {
        let run = || -> Vec<Result<Option<Record>>> {
            partials
                .into_par_iter()
                .map(|partial| evaluate_record(evaluator, config, partial))
                .collect()
        };
        match settings.num_threads {
            Some(threads) => {
                debug!(records = total, threads, "evaluating on dedicated pool");
                let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
                pool.install(run)
            }
            None => {
                debug!(records = total, "evaluating on global pool");
                run()
            }
        }
    } else {
        partials
            .into_iter()
            .map(|partial| evaluate_record(evaluator, config, partial))
            .collect()
    };

    let mut kept = Vec::with_capacity(results.len());
    for result in results {
        if let Some(record) = result? {
            kept.push(record);
        }
    }
    Ok(kept)
}
