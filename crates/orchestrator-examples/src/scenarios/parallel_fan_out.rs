//! A parallel section fans a single block out over a two-element
//! distribution: each iteration runs as its own virtual block id and sees
//! its own `<parallel.currentItem>`; the block after the section only
//! activates once both iterations have settled (scenario D).
//!
//! ```text
//!   [start] --> [par] --parallel-start-source--> [tag]   (x2, one per item)
//!                 \--parallel-end-source--> [after]
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
    WorkflowDefinition::builder("parallel-fan-out")
        .block("start", BlockType::Starter, "Start")
        .block("par", BlockType::Parallel, "Parallel")
        .block_with_config(
            "tag",
            BlockType::Custom("function".into()),
            "Tag",
            serde_json::json!({"item": "<parallel.currentItem>"}),
        )
        .block("after", BlockType::Custom("function".into()), "After")
        .connect("start", "par")
        .connect_with_handle("par", "tag", "parallel-start-source")
        .connect_with_handle("par", "after", "parallel-end-source")
        .parallel("par", vec![BlockId::new("tag")], serde_json::json!(["x", "y"]))
        .build()
}

pub async fn run() -> Result<RunOutcome, ExecutorError> {
    let executor = Executor::new(build(), default_handlers(), Arc::new(NoopEvaluator))?;
    executor.execute(serde_json::Value::Null, HashMap::new(), HashMap::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_one_virtual_tag_per_item_and_settles_before_after() {
        let outcome = run().await.unwrap();
        assert!(outcome.success);

        let par_id = BlockId::new("par");
        assert!(outcome.context.completed_loops.contains(&par_id));
        assert!(outcome
            .context
            .active_execution_path
            .contains(&BlockId::new("after")));

        for (i, item) in ["x", "y"].iter().enumerate() {
            let vid = virtual_id::build_virtual_id(&BlockId::new("tag"), &par_id, i as u32);
            assert!(outcome.context.executed_blocks.contains(&vid));
            let output = outcome.context.block_states[&vid].output.clone().unwrap();
            assert_eq!(output["result"]["item"], serde_json::json!(item));
        }

        let par_output = outcome.context.block_states[&par_id].output.clone().unwrap();
        assert_eq!(par_output["iterations"], serde_json::json!(2));
        assert_eq!(par_output["results"].as_array().unwrap().len(), 2);
    }
}
