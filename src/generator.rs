use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::document::describe;
use crate::error::{MatrixError, Result};
use crate::evaluator::{evaluate_records, ExpressionEvaluator};
use crate::expr::ExprEngine;
use crate::flattener::Flattener;
use crate::mask::mask_reduce;
use crate::record::Record;
use crate::settings::Settings;

/// Expands matrix documents: flatten, evaluate, mask-reduce.
///
/// Without a custom evaluator every [`generate`](Self::generate) call builds a
/// fresh [`ExprEngine`], so nothing is shared between calls.
#[derive(Clone, Default)]
pub struct MatrixGenerator {
    settings: Settings,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl MatrixGenerator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            evaluator: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn generate(&self, input: &Value, config: &Value) -> Result<Vec<Record>> {
        match self.evaluator.as_deref() {
            Some(evaluator) => self.run(evaluator, input, config),
            None => self.run(&ExprEngine::new(), input, config),
        }
    }

    fn run(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        input: &Value,
        config: &Value,
    ) -> Result<Vec<Record>> {
        if !matches!(input, Value::Object(_) | Value::Array(_)) {
            return Err(MatrixError::InvalidRoot {
                found: describe(input),
            });
        }

        let partials = Flattener::new(evaluator).flatten(input)?;
        let flattened = partials.len();

        let kept = evaluate_records(evaluator, config, partials, &self.settings)?;
        let evaluated = kept.len();

        let matrix = mask_reduce(kept);
        debug!(
            flattened,
            evaluated,
            emitted = matrix.len(),
            "matrix generated"
        );
        Ok(matrix)
    }
}

/// Expands `input` against `config` with the default expression language
/// and default settings.
pub fn generate_matrix(input: &Value, config: &Value) -> Result<Vec<Record>> {
    MatrixGenerator::default().generate(input, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Scope;
    use serde_json::json;

    /// Treats every expression as the name of a config flag.
    struct FlagEvaluator;

    impl ExpressionEvaluator for FlagEvaluator {
        fn evaluate(&self, source: &str, scope: &mut dyn Scope) -> Result<Value> {
            Ok(scope.config().get(source).cloned().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn root_must_be_object_or_array() {
        for bad in [json!("x"), json!(true), json!(1), Value::Null] {
            let found = describe(&bad);
            assert_eq!(
                generate_matrix(&bad, &json!({})).unwrap_err(),
                MatrixError::InvalidRoot { found }
            );
        }
        assert_eq!(generate_matrix(&json!([]), &json!({})).unwrap(), vec![]);
    }

    #[test]
    fn custom_evaluator_is_used() {
        let generator = MatrixGenerator::default().with_evaluator(FlagEvaluator);
        let input = json!([
            {"os": "linux", "$if": "nightly"},
            {"os": "mac", "$if": "release"}
        ]);
        let out = generator
            .generate(&input, &json!({"nightly": true}))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["os"], json!("linux"));
    }

    #[test]
    fn settings_are_kept() {
        let settings = Settings {
            parallel_threshold: 1,
            num_threads: Some(2),
        };
        let generator = MatrixGenerator::new(settings.clone());
        assert_eq!(generator.settings(), &settings);

        let out = generator
            .generate(&json!({"a": ["1", "2", "3"]}), &json!({}))
            .unwrap();
        assert_eq!(out.len(), 3);
    }
}
