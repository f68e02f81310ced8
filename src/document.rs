//! Shape classification of the decoded matrix document.
//!
//! The input arrives as an untyped `serde_json::Value`. Every position in the
//! flattener first classifies its value into a [`Node`] and then matches on it,
//! so reserved keys are only ever looked up on the `Mapping` variant.

use serde_json::{Map, Value};

pub const IF_KEY: &str = "$if";
pub const MULTIPLY_KEY: &str = "$multiply";
pub const DYNAMIC_KEY: &str = "$dynamic";
pub const VALUE_KEY: &str = "$value";

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// String, boolean or number leaf.
    Scalar(&'a Value),
    Sequence(&'a [Value]),
    Mapping(&'a Map<String, Value>),
    Null,
}

impl<'a> Node<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(_) | Value::Bool(_) | Value::Number(_) => Node::Scalar(value),
            Value::Array(items) => Node::Sequence(items),
            Value::Object(map) => Node::Mapping(map),
            Value::Null => Node::Null,
        }
    }
}

/// Shape name used in error messages.
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Copy of `map` without `key`. Key order of the remaining entries is kept.
pub fn without_key(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Textual form of a value, the way a record field is compared when masking.
/// Strings print bare, arrays join their elements with commas.
pub fn textual(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(textual).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_covers_every_shape() {
        assert!(matches!(Node::classify(&json!("a")), Node::Scalar(_)));
        assert!(matches!(Node::classify(&json!(true)), Node::Scalar(_)));
        assert!(matches!(Node::classify(&json!(3)), Node::Scalar(_)));
        assert!(matches!(Node::classify(&json!([1, 2])), Node::Sequence(s) if s.len() == 2));
        assert!(matches!(Node::classify(&json!({"a": 1})), Node::Mapping(_)));
        assert!(matches!(Node::classify(&Value::Null), Node::Null));
    }

    #[test]
    fn without_key_keeps_order() {
        let doc = json!({"b": 1, "$value": 2, "a": 3});
        let rest = without_key(doc.as_object().unwrap(), VALUE_KEY);
        let keys: Vec<_> = rest.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn textual_forms() {
        assert_eq!(textual(&json!("true")), "true");
        assert_eq!(textual(&json!(true)), "true");
        assert_eq!(textual(&json!(1.5)), "1.5");
        assert_eq!(textual(&json!(["a", 1])), "a,1");
        assert_eq!(textual(&Value::Null), "null");
    }
}
