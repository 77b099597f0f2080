//! Contextual formatting of resolved values when substituted back into text.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormattingContext {
    /// Substitution into a `function` block's code parameter: strings become
    /// JSON-quoted literals.
    FunctionCode,
    /// Substitution inside a template-literal position: strings are unquoted.
    TemplateLiteral,
    /// Substitution into a `condition` block's comparison value: escaped and quoted.
    Condition,
    /// Substitution into `response`/`api` bodies: strings JSON-escaped when
    /// embedded in a larger string, otherwise passed through.
    ApiBody,
    /// No special formatting (default plain substitution).
    Plain,
}

impl FormattingContext {
    /// Picks the substitution rule for a block's own parameters from its
    /// type: `function` code is JSON-quoted, `condition`/`router`
    /// comparison values are quoted-and-escaped, `api`/`response` bodies
    /// get string escaping without quoting, everything else is plain.
    pub fn for_block_type(block_type: &str) -> Self {
        match block_type {
            "function" => FormattingContext::FunctionCode,
            "condition" | "router" => FormattingContext::Condition,
            "api" | "response" => FormattingContext::ApiBody,
            _ => FormattingContext::Plain,
        }
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Formats `value` for substitution back into source text under `ctx`.
pub fn format_value_for_context(value: &Value, ctx: FormattingContext) -> String {
    match ctx {
        FormattingContext::FunctionCode => match value {
            Value::String(s) => format!("\"{}\"", json_escape(s)),
            Value::Object(_) | Value::Array(_) => value.to_string(),
            other => value_to_plain_string(other),
        },
        FormattingContext::TemplateLiteral => match value {
            Value::String(s) => s.clone(),
            Value::Object(_) | Value::Array(_) => value.to_string(),
            other => value_to_plain_string(other),
        },
        FormattingContext::Condition => {
            format!("\"{}\"", json_escape(&value_to_plain_string(value)))
        }
        FormattingContext::ApiBody => match value {
            Value::String(s) => json_escape(s),
            Value::Object(_) | Value::Array(_) => value.to_string(),
            other => value_to_plain_string(other),
        },
        FormattingContext::Plain => value_to_plain_string(value),
    }
}
