//! Default expression language for `$if` predicates and `$dynamic` fields.
//!
//! A small JavaScript-flavoured subset: literals, `config` and record field
//! lookups, member/index access, arithmetic, comparisons, `&&`/`||`, ternary
//! and a handful of string/array methods. Expressions cannot mutate anything.

pub mod ast;
pub mod interpreter;
pub mod parser;

use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::Result;
use crate::evaluator::{ExpressionEvaluator, Scope};

pub use ast::Expr;
pub use interpreter::Interpreter;
pub use parser::parse;

/// Parses on first use and keeps the AST for the lifetime of the engine.
/// Safe to share between rayon workers.
#[derive(Default)]
pub struct ExprEngine {
    compiled: DashMap<String, Arc<Expr>, RandomState>,
}

impl ExprEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&self, source: &str) -> Result<Arc<Expr>> {
        if let Some(hit) = self.compiled.get(source) {
            return Ok(Arc::clone(hit.value()));
        }
        let expr = Arc::new(parse(source)?);
        self.compiled.insert(source.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn cached(&self) -> usize {
        self.compiled.len()
    }
}

impl ExpressionEvaluator for ExprEngine {
    fn evaluate(&self, source: &str, scope: &mut dyn Scope) -> Result<Value> {
        let expr = self.compile(source)?;
        Interpreter::new(source).eval(&expr, scope)
    }

    fn validate(&self, source: &str) -> Result<()> {
        self.compile(source).map(|_| ())
    }
}
