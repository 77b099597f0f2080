//! Two-phase collection evaluation for `forEachItems`/`distribution`:
//! structured parse first, then an injected expression evaluator as fallback.

use serde_json::Value;

use crate::model::ExecutionContext;

/// Evaluates an arbitrary string expression against the running context.
/// The engine has no opinion on the expression language; this is a seam for
/// the host to plug in whatever it already uses elsewhere (templating,
/// scripting, ...). Returning `None` means "couldn't evaluate", which the
/// two-phase resolution in this module treats the same as a parse failure.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, ctx: &ExecutionContext) -> Option<Value>;
}

/// An evaluator with no real expression support: only the structured-parse
/// phase of [`resolve_collection`] ever succeeds. Adequate for workflows that
/// only ever pass literal arrays/objects or strict JSON strings as
/// `forEachItems`/`distribution`.
pub struct NoopEvaluator;

impl ExpressionEvaluator for NoopEvaluator {
    fn evaluate(&self, _expression: &str, _ctx: &ExecutionContext) -> Option<Value> {
        None
    }
}

/// Best-effort normalization of a loose JS-object-literal-style string into
/// strict JSON: single quotes become double quotes, and bare identifier keys
/// get quoted. Doesn't attempt to handle every edge case of JS literal
/// syntax — only the common `{name: 'a', tags: ['x', 'y']}` shape.
fn normalize_json_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut chars = input.chars().peekable();
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_double => {
                in_double = true;
                out.push('"');
            }
            '"' if in_double => {
                in_double = false;
                out.push('"');
            }
            '\'' if !in_double => {
                out.push('"');
                for d in chars.by_ref() {
                    if d == '\'' {
                        break;
                    }
                    if d == '"' {
                        out.push('\\');
                    }
                    out.push(d);
                }
                out.push('"');
            }
            c if !in_double && (c.is_alphabetic() || c == '_') => {
                let mut ident = String::new();
                ident.push(c);
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut lookahead = chars.clone();
                while let Some(&d) = lookahead.peek() {
                    if d.is_whitespace() {
                        lookahead.next();
                    } else {
                        break;
                    }
                }
                if lookahead.peek() == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn as_collection(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => Some(map.values().cloned().collect()),
        _ => None,
    }
}

/// Resolves a `forEachItems`/`distribution` source value to a concrete item
/// list: arrays/objects pass through directly; strings are tried as strict
/// JSON (after a loose-syntax normalization pass), then handed to `evaluator`
/// as an expression. `None` means every phase failed.
pub fn resolve_collection(
    raw: &Value,
    evaluator: &dyn ExpressionEvaluator,
    ctx: &ExecutionContext,
) -> Option<Vec<Value>> {
    match raw {
        Value::Array(_) | Value::Object(_) => as_collection(raw),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                let normalized = normalize_json_like(trimmed);
                if let Ok(parsed) = serde_json::from_str::<Value>(&normalized) {
                    if let Some(items) = as_collection(&parsed) {
                        return Some(items);
                    }
                }
            }
            evaluator.evaluate(s, ctx).and_then(|v| as_collection(&v))
        }
        _ => None,
    }
}
