//! PathTracker: maintains the active-execution-path set and reacts to
//! executed blocks by activating downstream paths per routing decisions.
//!
//! Holds no mutable state of its own — every method takes the workflow by
//! reference and the `ExecutionContext` it mutates. Cheap to construct once
//! per layer from the `Executor`.

use std::collections::HashSet;

use crate::connection_utils;
use crate::model::workflow::{parse_condition_handle, BlockCategory, BlockType, HANDLE_ERROR, HANDLE_LOOP_START, HANDLE_SOURCE};
use crate::model::{BlockId, Connection, ExecutionContext, WorkflowDefinition};
use crate::routing;
use crate::virtual_id;

pub struct PathTracker<'a> {
    workflow: &'a WorkflowDefinition,
}

impl<'a> PathTracker<'a> {
    pub fn new(workflow: &'a WorkflowDefinition) -> Self {
        Self { workflow }
    }

    /// Maps `id` to the virtual form matching `reference`'s parallel iteration,
    /// when `reference` is itself virtual and `id` is a node of that same
    /// parallel section. Used to keep decision/active-path lookups namespaced
    /// consistently inside one iteration ("virtual-block routing").
    pub(crate) fn namespaced(&self, reference: &BlockId, id: &BlockId) -> BlockId {
        let Some((_, parallel_id, iteration)) = virtual_id::decode(reference) else {
            return id.clone();
        };
        let same_parallel = self
            .workflow
            .parallels
            .get(&parallel_id)
            .is_some_and(|spec| spec.nodes.contains(id));
        if same_parallel {
            virtual_id::build_virtual_id(id, &parallel_id, iteration)
        } else {
            id.clone()
        }
    }

    /// True if `block_id` (original or virtual) is already in the active path,
    /// or becomes active through one of its incoming edges.
    pub fn is_in_active_path(&self, block_id: &BlockId, ctx: &ExecutionContext) -> bool {
        if ctx.active_execution_path.contains(block_id) {
            return true;
        }
        let original = virtual_id::extract_original_id(block_id);
        connection_utils::incoming(&original, &self.workflow.connections)
            .into_iter()
            .any(|c| self.is_edge_active(block_id, c, ctx))
    }

    fn is_edge_active(&self, target_id: &BlockId, conn: &Connection, ctx: &ExecutionContext) -> bool {
        let source_key = self.namespaced(target_id, &conn.source);
        let handle = conn.handle();

        if let Some(condition_id) = parse_condition_handle(handle) {
            return ctx.executed_blocks.contains(&source_key)
                && ctx
                    .decisions
                    .condition
                    .get(&source_key)
                    .is_some_and(|id| id == condition_id);
        }

        if let Some(source_block) = self.workflow.block(&conn.source)
            && matches!(source_block.block_type, BlockType::Router)
        {
            return ctx.executed_blocks.contains(&source_key)
                && ctx.decisions.router.get(&source_key) == Some(target_id);
        }

        ctx.active_execution_path.contains(&source_key) && ctx.executed_blocks.contains(&source_key)
    }

    /// Processes every block that just settled this layer (the main
    /// dispatch). `executed_ids` may contain virtual ids.
    pub fn update_execution_paths(&self, executed_ids: &[BlockId], ctx: &mut ExecutionContext) {
        for id in executed_ids {
            self.update_for_block(id, ctx);
        }
    }

    fn update_for_block(&self, executed_id: &BlockId, ctx: &mut ExecutionContext) {
        let original = virtual_id::extract_original_id(executed_id);
        let Some(block) = self.workflow.block(&original).cloned() else {
            return;
        };
        let is_virtual = virtual_id::is_virtual(executed_id);
        let prev_virtual = ctx.current_virtual_block_id.clone();
        if is_virtual {
            ctx.current_virtual_block_id = Some(executed_id.clone());
        }

        match block.block_type {
            BlockType::Router => self.handle_router(executed_id, ctx),
            BlockType::Condition => self.handle_condition(executed_id, &original, ctx),
            BlockType::Loop => self.handle_loop(executed_id, &original, ctx),
            _ => self.handle_regular_or_parallel(executed_id, &original, ctx),
        }

        ctx.current_virtual_block_id = prev_virtual;
    }

    fn handle_router(&self, executed_id: &BlockId, ctx: &mut ExecutionContext) {
        let Some(target) = ctx
            .block_states
            .get(executed_id)
            .and_then(|s| s.output.as_ref())
            .and_then(|o| o.get("selectedPath"))
            .and_then(|p| p.get("blockId"))
            .and_then(|v| v.as_str())
            .map(BlockId::new)
        else {
            return;
        };
        let routed_target = self.namespaced(executed_id, &target);
        ctx.decisions.router.insert(executed_id.clone(), routed_target.clone());
        ctx.active_execution_path.insert(routed_target.clone());
        if self
            .workflow
            .block(&target)
            .is_some_and(|b| matches!(b.category(), BlockCategory::Regular))
        {
            self.selective_activate(&routed_target, executed_id, ctx);
        }
    }

    fn handle_condition(&self, executed_id: &BlockId, original: &BlockId, ctx: &mut ExecutionContext) {
        let Some(condition_id) = ctx
            .block_states
            .get(executed_id)
            .and_then(|s| s.output.as_ref())
            .and_then(|o| o.get("selectedConditionId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            return;
        };
        ctx.decisions.condition.insert(executed_id.clone(), condition_id.clone());
        let handle = crate::model::condition_handle(&condition_id);
        let targets: Vec<BlockId> = connection_utils::outgoing(original, &self.workflow.connections)
            .into_iter()
            .filter(|c| c.handle() == handle)
            .map(|c| c.target.clone())
            .collect();
        for target in targets {
            let routed_target = self.namespaced(executed_id, &target);
            ctx.active_execution_path.insert(routed_target.clone());
            if self
                .workflow
                .block(&target)
                .is_some_and(|b| matches!(b.category(), BlockCategory::Regular))
            {
                self.selective_activate(&routed_target, executed_id, ctx);
            }
        }
    }

    fn handle_loop(&self, executed_id: &BlockId, original: &BlockId, ctx: &mut ExecutionContext) {
        for c in connection_utils::outgoing(original, &self.workflow.connections) {
            if c.handle() == HANDLE_LOOP_START {
                let target = self.namespaced(executed_id, &c.target);
                ctx.active_execution_path.insert(target);
            }
        }
    }

    fn handle_regular_or_parallel(&self, executed_id: &BlockId, original: &BlockId, ctx: &mut ExecutionContext) {
        let errored = ctx
            .block_states
            .get(executed_id)
            .is_some_and(|s| s.errored());
        let outgoing: Vec<Connection> = connection_utils::outgoing(original, &self.workflow.connections)
            .into_iter()
            .cloned()
            .collect();
        for c in &outgoing {
            let Some(target_block) = self.workflow.block(&c.target) else {
                continue;
            };
            if routing::should_skip_connection(c.handle(), &target_block.block_type) {
                continue;
            }
            if self.crosses_unfinished_loop_boundary(original, &c.target, ctx) {
                continue;
            }
            let handle = c.handle();
            let activates = if handle == HANDLE_ERROR {
                errored
            } else if handle == HANDLE_SOURCE || handle.is_empty() {
                !errored
            } else {
                true
            };
            if !activates {
                continue;
            }
            let target = self.namespaced(executed_id, &c.target);
            ctx.active_execution_path.insert(target);
        }
    }

    /// True iff `source` belongs to a loop that `target` is outside of, and
    /// that loop hasn't completed yet.
    fn crosses_unfinished_loop_boundary(&self, source: &BlockId, target: &BlockId, ctx: &ExecutionContext) -> bool {
        let Some(loop_spec) = self.workflow.loop_containing(source) else {
            return false;
        };
        if loop_spec.nodes.contains(target) {
            return false;
        }
        !ctx.completed_loops.contains(&loop_spec.id)
    }

    /// Recursive BFS ("Selective downstream activation"): follows
    /// unskipped outgoing edges from `start`, activating every new
    /// regular-category target reached, and stopping descent at routing or
    /// flow-control targets.
    fn selective_activate(&self, start: &BlockId, reference: &BlockId, ctx: &mut ExecutionContext) {
        let mut stack = vec![start.clone()];
        let mut visited: HashSet<BlockId> = HashSet::new();
        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            ctx.active_execution_path.insert(node.clone());
            let original = virtual_id::extract_original_id(&node);
            for c in connection_utils::outgoing(&original, &self.workflow.connections) {
                let Some(target_block) = self.workflow.block(&c.target) else {
                    continue;
                };
                if routing::should_skip_connection(c.handle(), &target_block.block_type) {
                    continue;
                }
                if matches!(target_block.category(), BlockCategory::Regular) {
                    let routed = self.namespaced(reference, &c.target);
                    stack.push(routed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, BlockType, LoopSpec, LoopType};
    use std::collections::HashMap;

    fn block(id: &str, ty: BlockType) -> Block {
        Block {
            id: BlockId::new(id),
            block_type: ty,
            name: id.to_string(),
            config: serde_json::Value::Null,
            enabled: true,
        }
    }

    fn router_workflow() -> WorkflowDefinition {
        let mut blocks = HashMap::new();
        blocks.insert(BlockId::new("start"), block("start", BlockType::Starter));
        blocks.insert(BlockId::new("router"), block("router", BlockType::Router));
        blocks.insert(
            BlockId::new("fn1"),
            block("fn1", BlockType::Custom("function".into())),
        );
        blocks.insert(
            BlockId::new("fn2"),
            block("fn2", BlockType::Custom("function".into())),
        );
        blocks.insert(
            BlockId::new("agent"),
            block("agent", BlockType::Custom("agent".into())),
        );
        WorkflowDefinition {
            id: "wf".into(),
            version: 1,
            blocks,
            connections: vec![
                Connection::new("start", "router"),
                Connection::new("router", "fn1"),
                Connection::new("router", "fn2"),
                Connection::new("fn1", "agent"),
                Connection::new("fn2", "agent"),
            ],
            loops: HashMap::new(),
            parallels: HashMap::new(),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", HashMap::new(), HashMap::new())
    }

    #[test]
    fn router_selects_one_branch_and_skips_the_other() {
        let wf = router_workflow();
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.block_states.insert(
            BlockId::new("router"),
            crate::model::BlockRuntimeState::success(
                serde_json::json!({"selectedPath": {"blockId": "fn1"}}),
                1,
            ),
        );
        c.executed_blocks.insert(BlockId::new("router"));
        tracker.update_execution_paths(&[BlockId::new("router")], &mut c);

        assert!(c.active_execution_path.contains(&BlockId::new("fn1")));
        assert!(!c.active_execution_path.contains(&BlockId::new("fn2")));
        // Agent got pre-activated via selective activation from fn1.
        assert!(c.active_execution_path.contains(&BlockId::new("agent")));
        assert_eq!(
            c.decisions.router.get(&BlockId::new("router")),
            Some(&BlockId::new("fn1"))
        );
    }

    #[test]
    fn is_in_active_path_true_via_router_decision_without_explicit_insertion() {
        let wf = router_workflow();
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.executed_blocks.insert(BlockId::new("router"));
        c.decisions
            .router
            .insert(BlockId::new("router"), BlockId::new("fn1"));
        assert!(tracker.is_in_active_path(&BlockId::new("fn1"), &c));
        assert!(!tracker.is_in_active_path(&BlockId::new("fn2"), &c));
    }

    #[test]
    fn condition_activates_only_matching_branch_handle() {
        let mut wf = router_workflow();
        wf.blocks.get_mut(&BlockId::new("router")).unwrap().block_type = BlockType::Condition;
        wf.connections = vec![
            Connection::new("start", "router"),
            Connection::new("router", "fn1").with_handle("condition-a"),
            Connection::new("router", "fn2").with_handle("condition-b"),
        ];
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.block_states.insert(
            BlockId::new("router"),
            crate::model::BlockRuntimeState::success(
                serde_json::json!({"selectedConditionId": "a"}),
                1,
            ),
        );
        c.executed_blocks.insert(BlockId::new("router"));
        tracker.update_execution_paths(&[BlockId::new("router")], &mut c);

        assert!(c.active_execution_path.contains(&BlockId::new("fn1")));
        assert!(!c.active_execution_path.contains(&BlockId::new("fn2")));
        assert_eq!(
            c.decisions.condition.get(&BlockId::new("router")),
            Some(&"a".to_string())
        );
    }

    #[test]
    fn error_handle_only_activates_when_source_erred() {
        let mut wf = router_workflow();
        wf.connections = vec![
            Connection::new("start", "fn1"),
            Connection::new("fn1", "fn2"),
            Connection::new("fn1", "agent").with_handle("error"),
        ];
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.block_states
            .insert(BlockId::new("fn1"), crate::model::BlockRuntimeState::success(serde_json::json!({}), 1));
        tracker.update_execution_paths(&[BlockId::new("fn1")], &mut c);
        assert!(c.active_execution_path.contains(&BlockId::new("fn2")));
        assert!(!c.active_execution_path.contains(&BlockId::new("agent")));
    }

    #[test]
    fn error_handle_activates_error_edge_on_failure() {
        let mut wf = router_workflow();
        wf.connections = vec![
            Connection::new("start", "fn1"),
            Connection::new("fn1", "fn2"),
            Connection::new("fn1", "agent").with_handle("error"),
        ];
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.block_states
            .insert(BlockId::new("fn1"), crate::model::BlockRuntimeState::failure("boom", 1));
        tracker.update_execution_paths(&[BlockId::new("fn1")], &mut c);
        assert!(!c.active_execution_path.contains(&BlockId::new("fn2")));
        assert!(c.active_execution_path.contains(&BlockId::new("agent")));
    }

    #[test]
    fn loop_block_activates_only_loop_start_edge() {
        let mut blocks = HashMap::new();
        blocks.insert(BlockId::new("loop1"), block("loop1", BlockType::Loop));
        blocks.insert(
            BlockId::new("b1"),
            block("b1", BlockType::Custom("function".into())),
        );
        blocks.insert(
            BlockId::new("after"),
            block("after", BlockType::Custom("function".into())),
        );
        let wf = WorkflowDefinition {
            id: "wf".into(),
            version: 1,
            blocks,
            connections: vec![
                Connection::new("loop1", "b1").with_handle("loop-start-source"),
                Connection::new("loop1", "after").with_handle("loop-end-source"),
            ],
            loops: HashMap::from([(
                BlockId::new("loop1"),
                LoopSpec {
                    id: BlockId::new("loop1"),
                    nodes: vec![BlockId::new("b1")],
                    iterations: Some(3),
                    loop_type: LoopType::For,
                    for_each_items: None,
                },
            )]),
            parallels: HashMap::new(),
        };
        let tracker = PathTracker::new(&wf);
        let mut c = ctx();
        c.block_states
            .insert(BlockId::new("loop1"), crate::model::BlockRuntimeState::success(serde_json::json!({}), 1));
        tracker.update_execution_paths(&[BlockId::new("loop1")], &mut c);
        assert!(c.active_execution_path.contains(&BlockId::new("b1")));
        assert!(!c.active_execution_path.contains(&BlockId::new("after")));
    }

    #[test]
    fn loop_interior_edge_to_outside_skipped_until_loop_completes() {
        let mut blocks = HashMap::new();
        blocks.insert(BlockId::new("loop1"), block("loop1", BlockType::Loop));
        blocks.insert(
            BlockId::new("b1"),
            block("b1", BlockType::Custom("function".into())),
        );
        blocks.insert(
            BlockId::new("outside"),
            block("outside", BlockType::Custom("function".into())),
        );
        let wf = WorkflowDefinition {
            id: "wf".into(),
            version: 1,
            blocks,
            connections: vec![Connection::new("b1", "outside")],
            loops: HashMap::from([(
                BlockId::new("loop1"),
                LoopSpec {
                    id: BlockId::new("loop1"),
                    nodes: vec![BlockId::new("b1")],
                    iterations: Some(1),
                    loop_type: LoopType::For,
                    for_each_items: None,
                },
            )]),
            parallels: HashMap::new(),
        };
        let tracker = PathTracker::new(&wf);

        let mut not_completed = ctx();
        not_completed.block_states.insert(
            BlockId::new("b1"),
            crate::model::BlockRuntimeState::success(serde_json::json!({}), 1),
        );
        tracker.update_execution_paths(&[BlockId::new("b1")], &mut not_completed);
        assert!(!not_completed.active_execution_path.contains(&BlockId::new("outside")));

        let mut completed = ctx();
        completed.completed_loops.insert(BlockId::new("loop1"));
        completed.block_states.insert(
            BlockId::new("b1"),
            crate::model::BlockRuntimeState::success(serde_json::json!({}), 1),
        );
        tracker.update_execution_paths(&[BlockId::new("b1")], &mut completed);
        assert!(completed.active_execution_path.contains(&BlockId::new("outside")));
    }
}
