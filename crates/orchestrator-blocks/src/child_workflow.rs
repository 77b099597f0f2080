//! Workflow block handler: runs a nested `WorkflowDefinition` to completion through a fresh child
//! `Executor` and returns its outcome as this block's output.
//!
//! The child gets its own `ExecutionContext` and a no-op observer
//! ([`Executor::as_child_execution`]) so nothing it does leaks through a
//! parent-owned UI signal; it shares the parent's handler registry and
//! expression evaluator since both are stateless over the run.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use orchestrator_core::expression::ExpressionEvaluator;
use orchestrator_core::handler::{BlockHandler, BlockHandlerRegistry, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext, WorkflowDefinition};
use orchestrator_core::Executor;

#[derive(Debug, Deserialize)]
struct ChildWorkflowConfig {
    workflow: WorkflowDefinition,
}

pub struct WorkflowBlockHandler {
    handlers: BlockHandlerRegistry,
    evaluator: Arc<dyn ExpressionEvaluator>,
    runtime: tokio::runtime::Handle,
}

impl WorkflowBlockHandler {
    /// `handlers`/`evaluator` are shared with the parent executor (both are
    /// pure lookup tables with no per-run state); `runtime` drives the
    /// child's async `execute` from this handler's `spawn_blocking` thread,
    /// same pattern as [`crate::agent::AgentBlockHandler`].
    pub fn new(
        handlers: BlockHandlerRegistry,
        evaluator: Arc<dyn ExpressionEvaluator>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            handlers,
            evaluator,
            runtime,
        }
    }
}

impl BlockHandler for WorkflowBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "workflow"
    }

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let config: ChildWorkflowConfig = serde_json::from_value(block.config.clone())
            .map_err(|e| HandlerError::Other(format!("invalid workflow block config: {e}")))?;

        let executor = Executor::new(config.workflow, self.handlers.clone(), self.evaluator.clone())
            .map_err(|e| HandlerError::Other(format!("child workflow failed to validate: {e}")))?
            .as_child_execution();

        let env_vars: HashMap<String, String> = ctx.environment_variables.clone();
        let wf_vars = ctx.workflow_variables.clone();
        let input = resolved_inputs.clone();

        let outcome = self
            .runtime
            .block_on(async move { executor.execute(input, env_vars, wf_vars).await });

        match outcome {
            Ok(run) => {
                tracing::debug!(block = %block.id, success = run.success, "child workflow settled");
                let last_output = run
                    .context
                    .block_states
                    .values()
                    .rev()
                    .find_map(|s| s.output.clone())
                    .unwrap_or(Value::Null);
                Ok(HandlerOutput {
                    output: serde_json::json!({
                        "success": run.success,
                        "result": last_output,
                    }),
                    error: if run.success {
                        None
                    } else {
                        Some("child workflow finished with an unhandled block error".to_string())
                    },
                    stream: false,
                })
            }
            Err(e) => Ok(HandlerOutput::failure(format!("child workflow execution failed: {e}"))),
        }
    }
}
