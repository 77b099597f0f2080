//! Structured predicates shared by the router, condition, and evaluator
//! handlers: parse first (like `input_resolver`'s two-phase collection
//! resolution), no embedded expression language. A predicate reads one field
//! out of the block's resolved params via [`orchestrator_core::value`]'s
//! path navigator and compares it.

use serde::Deserialize;
use serde_json::Value;

use orchestrator_core::value::resolve_path_str;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    Contains { path: String, value: Value },
    GreaterThan { path: String, value: f64 },
    LessThan { path: String, value: f64 },
    Exists { path: String },
    And { clauses: Vec<Predicate> },
    Or { clauses: Vec<Predicate> },
    Not { clause: Box<Predicate> },
}

impl Predicate {
    /// Evaluates against `params`. A path that fails to resolve counts as
    /// `false` for every comparison except `Exists`, which reports it directly.
    pub fn eval(&self, params: &Value) -> bool {
        match self {
            Predicate::Equals { path, value } => {
                resolve_path_str(params, path).map(|v| v == value).unwrap_or(false)
            }
            Predicate::NotEquals { path, value } => {
                resolve_path_str(params, path).map(|v| v != value).unwrap_or(false)
            }
            Predicate::Contains { path, value } => resolve_path_str(params, path)
                .map(|v| match v {
                    Value::Array(items) => items.contains(value),
                    Value::String(s) => value.as_str().is_some_and(|needle| s.contains(needle)),
                    _ => false,
                })
                .unwrap_or(false),
            Predicate::GreaterThan { path, value } => resolve_path_str(params, path)
                .ok()
                .and_then(Value::as_f64)
                .is_some_and(|v| v > *value),
            Predicate::LessThan { path, value } => resolve_path_str(params, path)
                .ok()
                .and_then(Value::as_f64)
                .is_some_and(|v| v < *value),
            Predicate::Exists { path } => resolve_path_str(params, path).is_ok(),
            Predicate::And { clauses } => clauses.iter().all(|c| c.eval(params)),
            Predicate::Or { clauses } => clauses.iter().any(|c| c.eval(params)),
            Predicate::Not { clause } => !clause.eval(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_reads_a_nested_path() {
        let p: Predicate = serde_json::from_value(serde_json::json!({
            "op": "equals", "path": "user.age", "value": 30
        }))
        .unwrap();
        assert!(p.eval(&serde_json::json!({"user": {"age": 30}})));
        assert!(!p.eval(&serde_json::json!({"user": {"age": 31}})));
    }

    #[test]
    fn missing_path_is_false_except_for_not_exists() {
        let p: Predicate = serde_json::from_value(serde_json::json!({"op": "equals", "path": "missing", "value": 1}))
            .unwrap();
        assert!(!p.eval(&serde_json::json!({})));

        let exists: Predicate = serde_json::from_value(serde_json::json!({"op": "exists", "path": "missing"})).unwrap();
        assert!(!exists.eval(&serde_json::json!({})));
    }

    #[test]
    fn and_or_not_compose() {
        let p: Predicate = serde_json::from_value(serde_json::json!({
            "op": "and",
            "clauses": [
                {"op": "greater_than", "path": "score", "value": 5},
                {"op": "not", "clause": {"op": "equals", "path": "flag", "value": false}}
            ]
        }))
        .unwrap();
        assert!(p.eval(&serde_json::json!({"score": 10, "flag": true})));
        assert!(!p.eval(&serde_json::json!({"score": 10, "flag": false})));
    }
}
