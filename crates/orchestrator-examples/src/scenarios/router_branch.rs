//! Router selects one of two branches; the branch it didn't pick never runs,
//! and a reference to its output resolves empty rather than erroring
//! scenario A).
//!
//! ```text
//!   [start] --> [router] --> [fn1] --\
//!                   \                 --> [combine]
//!                    --> [fn2]  (never executes)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::executor::RunOutcome;
use orchestrator_core::expression::NoopEvaluator;
use orchestrator_core::model::{BlockId, BlockType, WorkflowDefinition};
use orchestrator_core::{Executor, ExecutorError};
use orchestrator_blocks::default_handlers;

pub fn build() -> WorkflowDefinition {
    WorkflowDefinition::builder("router-branch")
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
            "combine",
            BlockType::Custom("function".into()),
            "Combine",
            serde_json::json!({"fromFn1": "<fn1.result>", "fromFn2": "<fn2.result>"}),
        )
        .connect("start", "router")
        .connect("router", "fn1")
        .connect("router", "fn2")
        .connect("fn1", "combine")
        .connect("fn2", "combine")
        .build()
}

pub async fn run() -> Result<RunOutcome, ExecutorError> {
    let executor = Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))?;
    executor.execute(serde_json::Value::Null, HashMap::new(), HashMap::new()).await
}
