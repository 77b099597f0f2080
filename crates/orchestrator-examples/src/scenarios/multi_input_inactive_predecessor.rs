//! An agent block has two predecessors, Function1 and Function2; the router
//! only selects Function1. Driven one layer at a time, the agent becomes
//! ready in the very next layer once Function1 settles — Function2's
//! never-executing, inactive predecessor edge never blocks it (scenario F).
//!
//! ```text
//!   [start] --> [router] --> [fn1] --\
//!                   \                 --> [agent]
//!                    --> [fn2]  (never executes, never active)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::expression::NoopEvaluator;
use orchestrator_core::executor::StepOutcome;
use orchestrator_core::model::{BlockId, BlockType, WorkflowDefinition};
use orchestrator_core::{Executor, ExecutorError};
use orchestrator_blocks::default_handlers;

pub fn build() -> WorkflowDefinition {
    WorkflowDefinition::builder("multi-input-inactive-predecessor")
        .block("start", BlockType::Starter, "Start")
        .block_with_config(
            "router",
            BlockType::Router,
            "Router",
            serde_json::json!({"default": "fn1"}),
        )
        .block_with_config(
            "fn1",
            BlockType::Custom("function".into()),
            "Function1",
            serde_json::json!({"code": "\"hi\""}),
        )
        .block_with_config(
            "fn2",
            BlockType::Custom("function".into()),
            "Function2",
            serde_json::json!({"code": "\"bye\""}),
        )
        .block_with_config(
            "agent",
            BlockType::Custom("function".into()),
            "Agent",
            serde_json::json!({"fromFn1": "<fn1.result>"}),
        )
        .connect("start", "router")
        .connect("router", "fn1")
        .connect("router", "fn2")
        .connect("fn1", "agent")
        .connect("fn2", "agent")
        .build()
}

pub fn executor() -> Result<Executor, ExecutorError> {
    Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn agent_runs_the_layer_right_after_function1_without_waiting_on_function2() {
        let executor = executor().unwrap();
        let mut ctx = executor
            .initialize(serde_json::Value::Null, HashMap::new(), HashMap::new())
            .unwrap();

        // Layer 1: router.
        let layer = match executor.continue_execution(&mut ctx).await.unwrap() {
            StepOutcome::Continued { layer } => layer,
            StepOutcome::Finished(_) => panic!("expected a router layer"),
        };
        assert_eq!(layer, vec![BlockId::new("router")]);
        assert!(!ctx.executed_blocks.contains(&BlockId::new("fn2")));

        // Layer 2: fn1 only — fn2 was never placed on the active path by the
        // router's decision, so it's not waited on.
        let layer = match executor.continue_execution(&mut ctx).await.unwrap() {
            StepOutcome::Continued { layer } => layer,
            StepOutcome::Finished(_) => panic!("expected a function1 layer"),
        };
        assert_eq!(layer, vec![BlockId::new("fn1")]);

        // Layer 3: agent — ready immediately, not blocked on fn2 ever running.
        let layer = match executor.continue_execution(&mut ctx).await.unwrap() {
            StepOutcome::Continued { layer } => layer,
            StepOutcome::Finished(_) => panic!("expected an agent layer"),
        };
        assert_eq!(layer, vec![BlockId::new("agent")]);

        let output = ctx.block_states[&BlockId::new("agent")].output.clone().unwrap();
        assert_eq!(output["result"]["fromFn1"], serde_json::json!("hi"));

        match executor.continue_execution(&mut ctx).await.unwrap() {
            StepOutcome::Finished(outcome) => assert!(outcome.success),
            StepOutcome::Continued { layer } => panic!("expected completion, got {layer:?}"),
        }

        assert!(!ctx.executed_blocks.contains(&BlockId::new("fn2")));
        assert!(!ctx.active_execution_path.contains(&BlockId::new("fn2")));
    }
}
