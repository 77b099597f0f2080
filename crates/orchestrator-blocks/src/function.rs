//! Function block handler: runs a user-defined transform
//! against this block's resolved params. Swap in a real code-execution
//! sandbox by implementing [`FunctionRunner`]; [`TemplateFunctionRunner`] is
//! the default, rendering `code` as a handlebars template against the params.
//! An injected trait with a sane default keeps the sandbox pluggable.

use std::sync::Arc;

use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

/// Runs a function block's body against its resolved params.
pub trait FunctionRunner: Send + Sync {
    fn run(&self, code: Option<&str>, params: &Value) -> Result<Value, String>;
}

pub struct FunctionBlockHandler {
    runner: Arc<dyn FunctionRunner>,
}

impl FunctionBlockHandler {
    pub fn new(runner: Arc<dyn FunctionRunner>) -> Self {
        Self { runner }
    }
}

impl BlockHandler for FunctionBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "function"
    }

    fn execute(
        &self,
        _block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let code = resolved_inputs.get("code").and_then(|v| v.as_str());
        match self.runner.run(code, resolved_inputs) {
            Ok(result) => Ok(HandlerOutput::success(serde_json::json!({ "result": result }))),
            Err(message) => Ok(HandlerOutput::failure(message)),
        }
    }
}

/// Renders `code` as a handlebars template against the params and tries to
/// parse the rendered text back into JSON, falling back to plain text.
/// Functions with no `code` pass their params through unchanged.
pub struct TemplateFunctionRunner;

impl FunctionRunner for TemplateFunctionRunner {
    fn run(&self, code: Option<&str>, params: &Value) -> Result<Value, String> {
        let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
            return Ok(params.clone());
        };
        let reg = handlebars::Handlebars::new();
        let rendered = reg
            .render_template(code, params)
            .map_err(|e| e.to_string())?;
        Ok(serde_json::from_str(&rendered).unwrap_or(Value::String(rendered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::model::BlockType;

    fn block(config: Value) -> Block {
        Block {
            id: "fn1".into(),
            block_type: BlockType::Custom("function".into()),
            name: "Fn1".into(),
            config,
            enabled: true,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Default::default(), Default::default())
    }

    #[test]
    fn passes_through_params_when_no_code_is_configured() {
        let handler = FunctionBlockHandler::new(Arc::new(TemplateFunctionRunner));
        let b = block(Value::Null);
        let out = handler
            .execute(&b, &serde_json::json!({"a": 1}), &ctx())
            .unwrap();
        assert_eq!(out.output["result"], serde_json::json!({"a": 1}));
    }

    #[test]
    fn renders_template_code_against_params() {
        let handler = FunctionBlockHandler::new(Arc::new(TemplateFunctionRunner));
        let b = block(serde_json::json!({"code": "Hello {{name}}"}));
        let out = handler
            .execute(&b, &serde_json::json!({"name": "world"}), &ctx())
            .unwrap();
        assert_eq!(out.output["result"], serde_json::json!("Hello world"));
    }
}
