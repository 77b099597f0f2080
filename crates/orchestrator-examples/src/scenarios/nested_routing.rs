//! Router hands off to a Condition, which in turn picks a Function branch
//! over a Parallel branch: the Parallel section (and its interior block)
//! never enters the active path, so `next_execution_layer` never returns
//! them (scenario E).
//!
//! ```text
//!   [start] --> [router] --> [cond] --condition-func_branch--> [func] --> [end]
//!                                \--condition-par_branch--> [par] --> [task]  (never runs)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::executor::RunOutcome;
use orchestrator_core::expression::NoopEvaluator;
use orchestrator_core::model::{BlockId, BlockType, WorkflowDefinition};
use orchestrator_core::virtual_id;
use orchestrator_core::{Executor, ExecutorError};
use orchestrator_blocks::default_handlers;

pub fn build() -> WorkflowDefinition {
    WorkflowDefinition::builder("nested-routing")
        .block("start", BlockType::Starter, "Start")
        .block_with_config(
            "router",
            BlockType::Router,
            "Router",
            serde_json::json!({"default": "cond"}),
        )
        .block_with_config(
            "cond",
            BlockType::Condition,
            "Cond",
            serde_json::json!({
                "marker": true,
                "conditions": [
                    {"id": "func_branch", "when": {"op": "equals", "path": "marker", "value": true}},
                    {"id": "par_branch", "when": {"op": "equals", "path": "marker", "value": false}}
                ]
            }),
        )
        .block("func", BlockType::Custom("function".into()), "Func")
        .block("end", BlockType::Custom("function".into()), "End")
        .block("par", BlockType::Parallel, "Parallel")
        .block("task", BlockType::Custom("function".into()), "Task")
        .connect("start", "router")
        .connect("router", "cond")
        .connect_with_handle("cond", "func", "condition-func_branch")
        .connect_with_handle("cond", "par", "condition-par_branch")
        .connect("func", "end")
        .connect_with_handle("par", "task", "parallel-start-source")
        .parallel("par", vec![BlockId::new("task")], serde_json::json!(["a", "b"]))
        .build()
}

pub async fn run() -> Result<RunOutcome, ExecutorError> {
    let executor = Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))?;
    executor.execute(serde_json::Value::Null, HashMap::new(), HashMap::new()).await
}
