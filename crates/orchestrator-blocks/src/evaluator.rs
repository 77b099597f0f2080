//! Evaluator block handler: resolves `config.expression`
//! to a value and reports it as this block's output. Same two-phase
//! strategy as `orchestrator_core::expression::resolve_collection`:
//! try it as a literal JSON value first, fall back to the injected
//! [`ExpressionEvaluator`] only when that fails.

use std::sync::Arc;

use serde_json::Value;

use orchestrator_core::expression::ExpressionEvaluator;
use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

pub struct EvaluatorBlockHandler {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl EvaluatorBlockHandler {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl BlockHandler for EvaluatorBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "evaluator"
    }

    fn execute(
        &self,
        _block: &Block,
        resolved_inputs: &Value,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let Some(expression) = resolved_inputs.get("expression").and_then(|v| v.as_str()) else {
            return Err(HandlerError::Other("evaluator block requires config.expression".into()));
        };

        if let Ok(literal) = serde_json::from_str::<Value>(expression.trim()) {
            return Ok(HandlerOutput::success(serde_json::json!({ "result": literal })));
        }

        match self.evaluator.evaluate(expression, ctx) {
            Some(result) => Ok(HandlerOutput::success(serde_json::json!({ "result": result }))),
            None => Ok(HandlerOutput::failure(format!(
                "expression did not evaluate to a value: {expression}"
            ))),
        }
    }
}
