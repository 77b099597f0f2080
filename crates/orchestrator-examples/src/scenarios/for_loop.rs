//! A `for` loop of three iterations: two interior blocks reset after each
//! round, a feedback edge hands control back to the loop, and the loop's own
//! output carries one result per iteration once it completes.
//!
//! ```text
//!   [start] --> [loop] --loop-start-source--> [b1] --> [b2] --\
//!                 ^                                            |
//!                 \--------------------- (feedback) -----------/
//!                 |
//!                 \--loop-end-source--> [after]
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::executor::RunOutcome;
use orchestrator_core::expression::NoopEvaluator;
use orchestrator_core::model::{BlockId, BlockType, WorkflowDefinition};
use orchestrator_core::{Executor, ExecutorError};
use orchestrator_blocks::default_handlers;

pub fn build() -> WorkflowDefinition {
    WorkflowDefinition::builder("for-loop")
        .block("start", BlockType::Starter, "Start")
        .block("loop", BlockType::Loop, "Loop")
        .block_with_config(
            "b1",
            BlockType::Custom("function".into()),
            "B1",
            serde_json::json!({"index": "<loop.index>"}),
        )
        .block_with_config(
            "b2",
            BlockType::Custom("function".into()),
            "B2",
            serde_json::json!({"seenIndex": "<b1.result.index>"}),
        )
        .block("after", BlockType::Custom("function".into()), "After")
        .connect("start", "loop")
        .connect_with_handle("loop", "b1", "loop-start-source")
        .connect("b1", "b2")
        .connect("b2", "loop")
        .connect_with_handle("loop", "after", "loop-end-source")
        .for_loop("loop", vec![BlockId::new("b1"), BlockId::new("b2")], 3)
        .build()
}

pub async fn run() -> Result<RunOutcome, ExecutorError> {
    let executor = Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))?;
    executor.execute(serde_json::Value::Null, HashMap::new(), HashMap::new()).await
}
