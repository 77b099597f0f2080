//! The mutable runtime context a single Executor owns for the lifetime of a run.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::workflow::BlockId;

/// Result recorded for one executed block (original or virtual id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRuntimeState {
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub executed: bool,
    pub duration_ms: u64,
}

impl BlockRuntimeState {
    pub fn success(output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            output: Some(output),
            error: None,
            executed: true,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            executed: true,
            duration_ms,
        }
    }

    pub fn errored(&self) -> bool {
        self.error.is_some()
    }
}

/// Router/condition decisions keyed by the originating block's id (original
/// or virtual, per the block that made the decision).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decisions {
    pub router: HashMap<BlockId, BlockId>,
    pub condition: HashMap<BlockId, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Plain,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVariable {
    pub name: String,
    pub var_type: VariableType,
    pub value: serde_json::Value,
}

/// Per-loop (or parallel) bookkeeping assembled the first time the loop is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopRunState {
    pub max_iterations: u32,
    pub loop_type: crate::model::workflow::LoopType,
    pub for_each_items: Option<serde_json::Value>,
    /// Keyed by `"iteration_{n}"`.
    pub execution_results: HashMap<String, serde_json::Value>,
}

impl LoopRunState {
    pub fn new(
        max_iterations: u32,
        loop_type: crate::model::workflow::LoopType,
        for_each_items: Option<serde_json::Value>,
    ) -> Self {
        Self {
            max_iterations,
            loop_type,
            for_each_items,
            execution_results: HashMap::new(),
        }
    }
}

/// Mapping recorded for a virtual block id: which original block, which
/// parallel section, and which iteration it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelBlockMapping {
    pub original_block_id: BlockId,
    pub parallel_id: BlockId,
    pub iteration_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockLogEntry {
    pub block_id: BlockId,
    pub message: String,
    pub level: String,
}

/// The mutable runtime context a single Executor owns for the lifetime of a
/// run. Never shared across runs; a child workflow execution gets its own
/// instance and never touches its parent's.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub start_time: SystemTime,
    pub block_states: HashMap<BlockId, BlockRuntimeState>,
    pub executed_blocks: HashSet<BlockId>,
    pub active_execution_path: HashSet<BlockId>,
    pub decisions: Decisions,
    pub loop_iterations: HashMap<BlockId, u32>,
    pub loop_items: HashMap<String, serde_json::Value>,
    pub completed_loops: HashSet<BlockId>,
    pub loop_executions: HashMap<BlockId, LoopRunState>,
    pub parallel_block_mapping: HashMap<BlockId, ParallelBlockMapping>,
    pub current_virtual_block_id: Option<BlockId>,
    pub environment_variables: HashMap<String, String>,
    pub workflow_variables: HashMap<String, WorkflowVariable>,
    pub block_logs: Vec<BlockLogEntry>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        environment_variables: HashMap<String, String>,
        workflow_variables: HashMap<String, WorkflowVariable>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            start_time: SystemTime::now(),
            block_states: HashMap::new(),
            executed_blocks: HashSet::new(),
            active_execution_path: HashSet::new(),
            decisions: Decisions::default(),
            loop_iterations: HashMap::new(),
            loop_items: HashMap::new(),
            completed_loops: HashSet::new(),
            loop_executions: HashMap::new(),
            parallel_block_mapping: HashMap::new(),
            current_virtual_block_id: None,
            environment_variables,
            workflow_variables,
            block_logs: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn log(&mut self, block_id: BlockId, level: &str, message: impl Into<String>) {
        self.block_logs.push(BlockLogEntry {
            block_id,
            level: level.to_string(),
            message: message.into(),
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn items_key(loop_or_parallel_id: &BlockId) -> String {
        format!("{loop_or_parallel_id}_items")
    }

    pub fn iteration_item_key(parallel_id: &BlockId, iteration: u32) -> String {
        format!("{parallel_id}_iteration_{iteration}")
    }

    pub fn iteration_result_key(iteration: u32) -> String {
        format!("iteration_{iteration}")
    }

    /// Discards all runtime traces of `id` — used by the LoopManager to reset
    /// interior blocks between iterations.
    pub fn forget_block(&mut self, id: &BlockId) {
        self.block_states.remove(id);
        self.executed_blocks.remove(id);
        self.active_execution_path.remove(id);
        self.decisions.router.remove(id);
        self.decisions.condition.remove(id);
    }
}
