//! A `forEach` loop over a literal array: one iteration per element, in
//! order, with `<loop.currentItem>` and `<loop.index>` resolving to that
//! iteration's item and position (scenario C).
//!
//! ```text
//!   [start] --> [loop] --loop-start-source--> [tag] --\
//!                 ^                                    |
//!                 \--------- (feedback) ----------------/
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
    WorkflowDefinition::builder("for-each-loop")
        .block("start", BlockType::Starter, "Start")
        .block("loop", BlockType::Loop, "Loop")
        .block_with_config(
            "tag",
            BlockType::Custom("function".into()),
            "Tag",
            serde_json::json!({"item": "<loop.currentItem>", "index": "<loop.index>"}),
        )
        .block("after", BlockType::Custom("function".into()), "After")
        .connect("start", "loop")
        .connect_with_handle("loop", "tag", "loop-start-source")
        .connect("tag", "loop")
        .connect_with_handle("loop", "after", "loop-end-source")
        .for_each_loop("loop", vec![BlockId::new("tag")], serde_json::json!(["a", "b", "c"]))
        .build()
}

pub async fn run() -> Result<RunOutcome, ExecutorError> {
    let executor = Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))?;
    executor.execute(serde_json::Value::Null, HashMap::new(), HashMap::new()).await
}
