//! LoopManager: iteration-complete detection, interior reset, and
//! per-iteration result aggregation for `Loop` blocks.

use std::collections::HashSet;

use crate::connection_utils;
use crate::expression::{self, ExpressionEvaluator};
use crate::model::workflow::{BlockType, HANDLE_ERROR, HANDLE_LOOP_END, HANDLE_SOURCE};
use crate::model::{BlockId, ExecutionContext, LoopRunState, LoopSpec, LoopType, WorkflowDefinition};

pub struct LoopManager<'a> {
    workflow: &'a WorkflowDefinition,
}

impl<'a> LoopManager<'a> {
    pub fn new(workflow: &'a WorkflowDefinition) -> Self {
        Self { workflow }
    }

    /// Drives every loop currently in the active path one step: detects
    /// iteration completion, resets for the next pass, or completes and
    /// aggregates. Call after `PathTracker::update_execution_paths`.
    pub fn process_loop_iterations(&self, evaluator: &dyn ExpressionEvaluator, ctx: &mut ExecutionContext) {
        let loop_ids: Vec<BlockId> = self.workflow.loops.keys().cloned().collect();
        for loop_id in loop_ids {
            if ctx.completed_loops.contains(&loop_id) {
                continue;
            }
            if !ctx.executed_blocks.contains(&loop_id) {
                continue;
            }
            self.process_one(&loop_id, evaluator, ctx);
        }
    }

    fn process_one(&self, loop_id: &BlockId, evaluator: &dyn ExpressionEvaluator, ctx: &mut ExecutionContext) {
        let Some(spec) = self.workflow.loops.get(loop_id) else {
            return;
        };

        if !ctx.loop_executions.contains_key(loop_id) {
            let max_iterations = self.determine_max_iterations(loop_id, spec, evaluator, ctx);
            ctx.loop_iterations.insert(loop_id.clone(), 0);
            ctx.loop_executions.insert(
                loop_id.clone(),
                LoopRunState::new(max_iterations, spec.loop_type, spec.for_each_items.clone()),
            );

            // A collection that resolves empty (or a `for` loop asked for zero
            // iterations) completes on its first check, before any interior
            // node runs — undo path_tracker's loop-start-source activation so
            // the body never actually executes.
            if max_iterations == 0 {
                for node in &spec.nodes {
                    ctx.active_execution_path.remove(node);
                }
                self.complete_loop(loop_id, spec, 0, 0, ctx);
                return;
            }
        }

        if !self.all_reachable_blocks_executed(spec, ctx) {
            return;
        }

        let iteration = *ctx.loop_iterations.get(loop_id).unwrap_or(&0);
        if let Some(output) = self.current_block_output(spec, ctx) {
            self.store_iteration_result(ctx, loop_id, iteration, output);
        }

        let max_iterations = ctx
            .loop_executions
            .get(loop_id)
            .map(|s| s.max_iterations)
            .unwrap_or(0);

        if iteration + 1 < max_iterations {
            self.advance_iteration(loop_id, spec, ctx);
        } else {
            self.complete_loop(loop_id, spec, iteration, max_iterations, ctx);
        }
    }

    /// The value recorded for this iteration: the output of the loop body's
    /// exit node(s) — the interior nodes with no outgoing edge back into the
    /// loop's own scope. A single exit node contributes its output directly;
    /// more than one is combined into an object keyed by block id.
    fn current_block_output(&self, spec: &LoopSpec, ctx: &ExecutionContext) -> Option<serde_json::Value> {
        let exits = self.exit_points(spec);
        match exits.as_slice() {
            [] => None,
            [only] => ctx.block_states.get(only).and_then(|s| s.output.clone()),
            many => {
                let mut map = serde_json::Map::new();
                for node in many {
                    let output = ctx
                        .block_states
                        .get(node)
                        .and_then(|s| s.output.clone())
                        .unwrap_or(serde_json::Value::Null);
                    map.insert(node.as_str().to_string(), output);
                }
                Some(serde_json::Value::Object(map))
            }
        }
    }

    fn exit_points(&self, spec: &LoopSpec) -> Vec<BlockId> {
        let scope: HashSet<BlockId> = spec.nodes.iter().cloned().collect();
        spec.nodes
            .iter()
            .filter(|node| {
                connection_utils::outgoing(node, &self.workflow.connections)
                    .into_iter()
                    .all(|c| !scope.contains(&c.target))
            })
            .cloned()
            .collect()
    }

    /// Stores a single iteration's result.
    fn store_iteration_result(
        &self,
        ctx: &mut ExecutionContext,
        loop_id: &BlockId,
        iteration: u32,
        output: serde_json::Value,
    ) {
        let key = ExecutionContext::iteration_result_key(iteration);
        if let Some(state) = ctx.loop_executions.get_mut(loop_id) {
            match state.execution_results.get_mut(&key) {
                None => {
                    state.execution_results.insert(key, output);
                }
                Some(existing @ serde_json::Value::Array(_)) => {
                    if let serde_json::Value::Array(arr) = existing {
                        arr.push(output);
                    }
                }
                Some(existing) => {
                    let prior = existing.clone();
                    *existing = serde_json::Value::Array(vec![prior, output]);
                }
            }
        }
    }

    /// Determines the loop's `maxIterations`.
    fn determine_max_iterations(
        &self,
        loop_id: &BlockId,
        spec: &LoopSpec,
        evaluator: &dyn ExpressionEvaluator,
        ctx: &ExecutionContext,
    ) -> u32 {
        match spec.loop_type {
            LoopType::For => spec.iterations.unwrap_or_else(LoopSpec::default_for_iterations),
            LoopType::ForEach => {
                let items_key = ExecutionContext::items_key(loop_id);
                if let Some(stored) = ctx.loop_items.get(&items_key) {
                    return expression::resolve_collection(stored, evaluator, ctx)
                        .map(|items| items.len() as u32)
                        .unwrap_or(0);
                }
                let Some(raw) = &spec.for_each_items else {
                    return 0;
                };
                expression::resolve_collection(raw, evaluator, ctx)
                    .map(|items| items.len() as u32)
                    .unwrap_or(0)
            }
        }
    }

    /// Iteration-complete detection (`allReachableBlocksExecuted`).
    fn all_reachable_blocks_executed(&self, spec: &LoopSpec, ctx: &ExecutionContext) -> bool {
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
            let Some(block) = self.workflow.block(&node) else {
                continue;
            };
            let errored = ctx.block_states.get(&node).is_some_and(|s| s.errored());

            match block.block_type {
                BlockType::Router => {
                    if let Some(target) = ctx.decisions.router.get(&node) {
                        if scope.contains(target) {
                            stack.push(target.clone());
                        }
                    }
                }
                BlockType::Condition => {
                    if let Some(condition_id) = ctx.decisions.condition.get(&node) {
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

        reached.iter().all(|n| ctx.executed_blocks.contains(n))
    }

    /// Iteration advance (not at max).
    fn advance_iteration(&self, loop_id: &BlockId, spec: &LoopSpec, ctx: &mut ExecutionContext) {
        if let Some(n) = ctx.loop_iterations.get_mut(loop_id) {
            *n += 1;
        }
        for node in &spec.nodes {
            ctx.forget_block(node);
        }
        ctx.forget_block(loop_id);
        ctx.active_execution_path.insert(loop_id.clone());
    }

    /// Completion (at max).
    fn complete_loop(
        &self,
        loop_id: &BlockId,
        spec: &LoopSpec,
        iteration: u32,
        max_iterations: u32,
        ctx: &mut ExecutionContext,
    ) {
        ctx.completed_loops.insert(loop_id.clone());

        let results: Vec<serde_json::Value> = (0..max_iterations)
            .map(|i| {
                let key = ExecutionContext::iteration_result_key(i);
                ctx.loop_executions
                    .get(loop_id)
                    .and_then(|s| s.execution_results.get(&key).cloned())
                    .unwrap_or(serde_json::Value::Null)
            })
            .collect();

        let output = serde_json::json!({
            "loopId": loop_id.as_str(),
            "currentIteration": iteration,
            "maxIterations": max_iterations,
            "loopType": match spec.loop_type { LoopType::For => "for", LoopType::ForEach => "forEach" },
            "completed": true,
            "results": results,
            "message": format!("loop {loop_id} completed after {max_iterations} iteration(s)"),
        });

        ctx.block_states.insert(
            loop_id.clone(),
            crate::model::BlockRuntimeState::success(output, 0),
        );
        ctx.executed_blocks.insert(loop_id.clone());

        for c in connection_utils::outgoing(loop_id, &self.workflow.connections) {
            if c.handle() == HANDLE_LOOP_END {
                ctx.active_execution_path.insert(c.target.clone());
            }
        }
    }
}
