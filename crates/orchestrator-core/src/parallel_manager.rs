//! ParallelManager: fans a block subgraph out over a distribution,
//! scheduling each node per iteration as a virtual block, and aggregates
//! outputs once every iteration has fully executed.

use std::collections::HashSet;

use crate::connection_utils;
use crate::expression::{self, ExpressionEvaluator};
use crate::model::workflow::{BlockType, HANDLE_ERROR, HANDLE_PARALLEL_END, HANDLE_PARALLEL_START, HANDLE_SOURCE};
use crate::model::{BlockId, ExecutionContext, ParallelSpec, WorkflowDefinition};
use crate::virtual_id;

pub struct ParallelManager<'a> {
    workflow: &'a WorkflowDefinition,
}

impl<'a> ParallelManager<'a> {
    pub fn new(workflow: &'a WorkflowDefinition) -> Self {
        Self { workflow }
    }

    /// Initializes (on first sight) and completes (once every iteration's
    /// reachable nodes have executed) every parallel section currently in
    /// the active path. Call after `PathTracker::update_execution_paths`.
    pub fn process_parallel_completions(&self, evaluator: &dyn ExpressionEvaluator, ctx: &mut ExecutionContext) {
        let parallel_ids: Vec<BlockId> = self.workflow.parallels.keys().cloned().collect();
        for parallel_id in parallel_ids {
            if ctx.executed_blocks.contains(&parallel_id) {
                self.ensure_initialized(&parallel_id, evaluator, ctx);
            }
            if ctx.loop_iterations.contains_key(&parallel_id) {
                self.maybe_complete(&parallel_id, ctx);
            }
        }
    }

    /// Evaluates the distribution, stores items/count, and
    /// activate each iteration's entry nodes as virtual blocks.
    fn ensure_initialized(&self, parallel_id: &BlockId, evaluator: &dyn ExpressionEvaluator, ctx: &mut ExecutionContext) {
        if ctx.loop_iterations.contains_key(parallel_id) {
            return;
        }
        let Some(spec) = self.workflow.parallels.get(parallel_id) else {
            return;
        };

        let items = expression::resolve_collection(&spec.distribution, evaluator, ctx).unwrap_or_default();
        let count = items.len() as u32;

        ctx.loop_items
            .insert(ExecutionContext::items_key(parallel_id), serde_json::Value::Array(items.clone()));
        ctx.loop_iterations.insert(parallel_id.clone(), count);
        for (i, item) in items.into_iter().enumerate() {
            ctx.loop_items
                .insert(ExecutionContext::iteration_item_key(parallel_id, i as u32), item);
        }

        if count == 0 {
            self.complete(parallel_id, 0, ctx);
            return;
        }

        let entry_targets: Vec<BlockId> = connection_utils::outgoing(parallel_id, &self.workflow.connections)
            .into_iter()
            .filter(|c| c.handle() == HANDLE_PARALLEL_START)
            .map(|c| c.target.clone())
            .collect();

        for iteration in 0..count {
            for target in &entry_targets {
                let virtual_target = virtual_id::build_virtual_id(target, parallel_id, iteration);
                ctx.active_execution_path.insert(virtual_target);
                ctx.parallel_block_mapping.insert(
                    virtual_id::build_virtual_id(target, parallel_id, iteration),
                    crate::model::context::ParallelBlockMapping {
                        original_block_id: target.clone(),
                        parallel_id: parallel_id.clone(),
                        iteration_index: iteration,
                    },
                );
            }
        }
    }

    fn maybe_complete(&self, parallel_id: &BlockId, ctx: &mut ExecutionContext) {
        if ctx.completed_loops.contains(parallel_id) {
            return;
        }
        let Some(spec) = self.workflow.parallels.get(parallel_id) else {
            return;
        };
        let count = *ctx.loop_iterations.get(parallel_id).unwrap_or(&0);
        if count == 0 {
            return;
        }
        let all_done = (0..count).all(|i| self.iteration_reachable_nodes_executed(spec, parallel_id, i, ctx));
        if all_done {
            self.complete(parallel_id, count, ctx);
        }
    }

    /// Same reachability walk as `LoopManager::all_reachable_blocks_executed`,
    /// but keyed by the virtual id of one specific iteration.
    fn iteration_reachable_nodes_executed(
        &self,
        spec: &ParallelSpec,
        parallel_id: &BlockId,
        iteration: u32,
        ctx: &ExecutionContext,
    ) -> bool {
        let scope: HashSet<BlockId> = spec.nodes.iter().cloned().collect();
        if scope.is_empty() {
            return true;
        }

        let entry_points: Vec<BlockId> = spec
            .nodes
            .iter()
            .filter(|n| connection_utils::is_entry_point(n, &scope, &self.workflow.connections))
            .cloned()
            .collect();

        let mut reached: HashSet<BlockId> = HashSet::new();
        let mut stack = entry_points;
        while let Some(node) = stack.pop() {
            if !reached.insert(node.clone()) {
                continue;
            }
            let virtual_node = virtual_id::build_virtual_id(&node, parallel_id, iteration);
            let Some(block) = self.workflow.block(&node) else {
                continue;
            };
            let errored = ctx.block_states.get(&virtual_node).is_some_and(|s| s.errored());

            match block.block_type {
                BlockType::Router => {
                    if let Some(target) = ctx.decisions.router.get(&virtual_node) {
                        let original_target = virtual_id::extract_original_id(target);
                        if scope.contains(&original_target) {
                            stack.push(original_target);
                        }
                    }
                }
                BlockType::Condition => {
                    if let Some(condition_id) = ctx.decisions.condition.get(&virtual_node) {
                        let handle = crate::model::condition_handle(condition_id);
                        for c in connection_utils::outgoing(&node, &self.workflow.connections) {
                            if c.handle() == handle && scope.contains(&c.target) {
                                stack.push(c.target.clone());
                            }
                        }
                    }
                }
                _ => {
                    for c in connection_utils::outgoing(&node, &self.workflow.connections) {
                        if !scope.contains(&c.target) {
                            continue;
                        }
                        let handle = c.handle();
                        let follow = if handle == HANDLE_ERROR {
                            errored
                        } else if handle == HANDLE_SOURCE || handle.is_empty() {
                            !errored
                        } else {
                            true
                        };
                        if follow {
                            stack.push(c.target.clone());
                        }
                    }
                }
            }
        }

        reached.iter().all(|n| {
            let virtual_node = virtual_id::build_virtual_id(n, parallel_id, iteration);
            ctx.executed_blocks.contains(&virtual_node)
        })
    }

    /// Aggregates every iteration's reached-node outputs and
    /// activate `parallel-end-source` edges.
    fn complete(&self, parallel_id: &BlockId, count: u32, ctx: &mut ExecutionContext) {
        ctx.completed_loops.insert(parallel_id.clone());

        let spec = self.workflow.parallels.get(parallel_id).cloned();
        let results: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                let mut per_node = serde_json::Map::new();
                if let Some(spec) = &spec {
                    for node in &spec.nodes {
                        let virtual_node = virtual_id::build_virtual_id(node, parallel_id, i);
                        if let Some(state) = ctx.block_states.get(&virtual_node) {
                            per_node.insert(
                                node.as_str().to_string(),
                                state.output.clone().unwrap_or(serde_json::Value::Null),
                            );
                        }
                    }
                }
                serde_json::Value::Object(per_node)
            })
            .collect();

        let output = serde_json::json!({
            "parallelId": parallel_id.as_str(),
            "iterations": count,
            "completed": true,
            "results": results,
        });

        ctx.block_states.insert(
            parallel_id.clone(),
            crate::model::BlockRuntimeState::success(output, 0),
        );
        ctx.executed_blocks.insert(parallel_id.clone());

        for c in connection_utils::outgoing(parallel_id, &self.workflow.connections) {
            if c.handle() == HANDLE_PARALLEL_END {
                ctx.active_execution_path.insert(c.target.clone());
            }
        }
    }
}
