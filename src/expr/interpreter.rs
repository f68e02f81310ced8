use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::document::{describe, textual};
use crate::error::{MatrixError, Result};
use crate::evaluator::{truthy, Scope};

/// Tree-walking evaluation of one parsed expression.
pub struct Interpreter<'s> {
    source: &'s str,
}

impl<'s> Interpreter<'s> {
    pub fn new(source: &'s str) -> Self {
        Self { source }
    }

    fn fail(&self, message: impl Into<String>) -> MatrixError {
        MatrixError::Evaluation {
            source_text: self.source.trim().to_string(),
            message: message.into(),
        }
    }

    pub fn eval(&self, expr: &Expr, scope: &mut dyn Scope) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),

            Expr::Ident(name) if name == "config" => Ok(scope.config().clone()),
            Expr::Ident(name) => Ok(scope.field(name)?.unwrap_or(Value::Null)),

            Expr::Member(target, name) => {
                let target = self.eval(target, scope)?;
                self.member(&target, name)
            }

            Expr::Index(target, key) => {
                let target = self.eval(target, scope)?;
                let key = self.eval(key, scope)?;
                self.index(&target, &key)
            }

            Expr::Call {
                target,
                method,
                args,
            } => {
                let target = self.eval(target, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>>>()?;
                self.call(&target, method, &args)
            }

            Expr::Unary(UnaryOp::Not, operand) => {
                Ok(Value::Bool(!truthy(&self.eval(operand, scope)?)))
            }
            Expr::Unary(UnaryOp::Neg, operand) => {
                Ok(number_value(-to_number(&self.eval(operand, scope)?)))
            }

            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                Ok(binary(*op, &lhs, &rhs))
            }

            Expr::Logical(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                match (op, truthy(&lhs)) {
                    (LogicalOp::Or, true) | (LogicalOp::And, false) => Ok(lhs),
                    _ => self.eval(rhs, scope),
                }
            }

            Expr::Conditional(test, then, otherwise) => {
                if truthy(&self.eval(test, scope)?) {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
        }
    }

    fn member(&self, target: &Value, name: &str) -> Result<Value> {
        match (target, name) {
            (Value::Null, _) => Err(self.fail(format!("cannot read `{name}` of null"))),
            (Value::Object(map), _) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            (Value::String(s), "length") => Ok(Value::from(s.chars().count())),
            (Value::Array(items), "length") => Ok(Value::from(items.len())),
            _ => Ok(Value::Null),
        }
    }

    fn index(&self, target: &Value, key: &Value) -> Result<Value> {
        match target {
            Value::Null => Err(self.fail(format!("cannot read `{}` of null", textual(key)))),
            Value::Object(map) => Ok(map.get(&textual(key)).cloned().unwrap_or(Value::Null)),
            Value::Array(items) => Ok(position(key)
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null)),
            Value::String(s) => Ok(position(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    fn call(&self, target: &Value, method: &str, args: &[Value]) -> Result<Value> {
        let [arg] = args else {
            return Err(self.fail(format!(
                "`{method}` takes exactly one argument, got {}",
                args.len()
            )));
        };

        match (method, target) {
            ("includes", Value::String(s)) => Ok(Value::Bool(s.contains(&textual(arg)))),
            ("includes", Value::Array(items)) => {
                Ok(Value::Bool(items.iter().any(|item| strict_eq(item, arg))))
            }
            ("startsWith", Value::String(s)) => Ok(Value::Bool(s.starts_with(&textual(arg)))),
            ("endsWith", Value::String(s)) => Ok(Value::Bool(s.ends_with(&textual(arg)))),
            ("includes" | "startsWith" | "endsWith", other) => Err(self.fail(format!(
                "`{method}` is not defined on {}",
                describe(other)
            ))),
            _ => Err(self.fail(format!("unknown method `{method}`"))),
        }
    }
}

fn position(key: &Value) -> Option<usize> {
    let n = to_number(key);
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Number(_) | Value::Bool(_) | Value::Null, Value::Number(_) | Value::Bool(_) | Value::Null) => {
                number_value(to_number(lhs) + to_number(rhs))
            }
            _ => Value::String(textual(lhs) + &textual(rhs)),
        },
        BinaryOp::Sub => number_value(to_number(lhs) - to_number(rhs)),
        BinaryOp::Mul => number_value(to_number(lhs) * to_number(rhs)),
        BinaryOp::Div => number_value(to_number(lhs) / to_number(rhs)),
        BinaryOp::Rem => number_value(to_number(lhs) % to_number(rhs)),
        BinaryOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(lhs, rhs)),
        BinaryOp::StrictNe => Value::Bool(!strict_eq(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs, |o| o.is_lt())),
        BinaryOp::Le => Value::Bool(compare(lhs, rhs, |o| o.is_le())),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs, |o| o.is_gt())),
        BinaryOp::Ge => Value::Bool(compare(lhs, rhs, |o| o.is_ge())),
    }
}

fn compare(lhs: &Value, rhs: &Value, test: fn(std::cmp::Ordering) -> bool) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(lhs).partial_cmp(&to_number(rhs)),
    };
    ordering.map_or(false, test)
}

/// Same type and value; numbers compare numerically.
fn strict_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

/// Values of different types are equal when their textual forms match.
/// `null` only equals `null`.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ if std::mem::discriminant(lhs) == std::mem::discriminant(rhs) => strict_eq(lhs, rhs),
        _ => textual(lhs) == textual(rhs),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => f64::NAN,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Integral results stay integers so they print without a fraction.
/// `NaN` and infinities have no JSON form and become `null`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use serde_json::json;
    use std::collections::HashMap;

    /// Fixed bindings, no deferred fields.
    struct StaticScope {
        config: Value,
        fields: HashMap<String, Value>,
    }

    impl Scope for StaticScope {
        fn config(&self) -> &Value {
            &self.config
        }

        fn field(&mut self, name: &str) -> Result<Option<Value>> {
            Ok(self.fields.get(name).cloned())
        }
    }

    fn eval(source: &str) -> Result<Value> {
        let mut scope = StaticScope {
            config: json!({"os": "linux", "flags": ["lto", "pgo"], "jobs": 4, "nested": {"on": true}}),
            fields: HashMap::from([
                ("arch".to_string(), json!("arm64")),
                ("debug".to_string(), json!(true)),
                ("version".to_string(), json!("20")),
            ]),
        };
        let expr = parse(source)?;
        Interpreter::new(source).eval(&expr, &mut scope)
    }

    #[test]
    fn config_and_fields_are_in_scope() {
        assert_eq!(eval("config.os").unwrap(), json!("linux"));
        assert_eq!(eval("config['os']").unwrap(), json!("linux"));
        assert_eq!(eval("config.nested.on").unwrap(), json!(true));
        assert_eq!(eval("arch").unwrap(), json!("arm64"));
        assert_eq!(eval("missing").unwrap(), Value::Null);
        assert_eq!(eval("config.missing").unwrap(), Value::Null);
    }

    #[test]
    fn logic_returns_operands() {
        assert_eq!(eval("missing || 'fallback'").unwrap(), json!("fallback"));
        assert_eq!(eval("debug && arch").unwrap(), json!("arm64"));
        assert_eq!(eval("!debug").unwrap(), json!(false));
        assert_eq!(
            eval("config.os == 'linux' ? 'gnu' : 'other'").unwrap(),
            json!("gnu")
        );
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(eval("config.jobs * 2 + 1").unwrap(), json!(9));
        assert_eq!(eval("config.jobs / 8").unwrap(), json!(0.5));
        assert_eq!(eval("'node-' + version").unwrap(), json!("node-20"));
        assert_eq!(eval("version + 1").unwrap(), json!("201"));
        assert_eq!(eval("-config.jobs").unwrap(), json!(-4));
    }

    #[test]
    fn equality_rules() {
        assert_eq!(eval("version == 20").unwrap(), json!(true));
        assert_eq!(eval("version === 20").unwrap(), json!(false));
        assert_eq!(eval("debug == 'true'").unwrap(), json!(true));
        assert_eq!(eval("missing == null").unwrap(), json!(true));
        assert_eq!(eval("missing != ''").unwrap(), json!(true));
        assert_eq!(eval("version > 18").unwrap(), json!(true));
        assert_eq!(eval("arch < 'x64'").unwrap(), json!(true));
    }

    #[test]
    fn methods() {
        assert_eq!(eval("config.flags.includes('lto')").unwrap(), json!(true));
        assert_eq!(eval("arch.startsWith('arm')").unwrap(), json!(true));
        assert_eq!(eval("arch.endsWith('32')").unwrap(), json!(false));
        assert_eq!(eval("config.flags.length").unwrap(), json!(2));
        assert_eq!(eval("config.flags[1]").unwrap(), json!("pgo"));
    }

    #[test]
    fn evaluation_errors() {
        assert!(matches!(
            eval("missing.deeper"),
            Err(MatrixError::Evaluation { source_text, .. }) if source_text == "missing.deeper"
        ));
        assert!(matches!(
            eval("config.jobs.includes(1)"),
            Err(MatrixError::Evaluation { .. })
        ));
        assert!(matches!(
            eval("arch.toUpperCase(1)"),
            Err(MatrixError::Evaluation { message, .. }) if message.contains("unknown method")
        ));
    }
}
