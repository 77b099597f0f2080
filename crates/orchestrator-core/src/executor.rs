//! Executor: drives a validated workflow to completion layer by layer.
//!
//! Owns the `ExecutionContext` for the run. Each tick computes the next
//! ready layer, resolves inputs, dispatches handlers concurrently, installs
//! their outputs, then hands off to PathTracker/LoopManager/ParallelManager
//! to update paths before the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::{Map, Value};

use crate::connection_utils;
use crate::expression::ExpressionEvaluator;
use crate::handler::{BlockHandlerRegistry, HandlerError, HandlerOutput};
use crate::input_resolver::{self, format::FormattingContext};
use crate::loop_manager::LoopManager;
use crate::model::workflow::HANDLE_ERROR;
use crate::model::{
    BlockId, BlockRuntimeState, BlockType, ExecutionContext, WorkflowDefinition,
    WorkflowValidationError, WorkflowVariable,
};
use crate::parallel_manager::ParallelManager;
use crate::path_tracker::PathTracker;
use crate::virtual_id;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("workflow validation failed: {0}")]
    Validation(#[from] WorkflowValidationError),
    #[error("input resolution failed for block {block}: {source}")]
    Resolution {
        block: BlockId,
        source: crate::input_resolver::ResolveError,
    },
    #[error("run cancelled")]
    Cancelled,
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Observes executor-visible lifecycle events ("mutable global UI stores
/// referenced from the Executor"). Default no-op. A child execution always
/// gets a no-op observer so it never publishes through a parent-owned signal.
pub trait ExecutionObserver: Send + Sync {
    fn layer_started(&self, _layer: &[BlockId]) {}
    fn block_settled(&self, _id: &BlockId, _state: &BlockRuntimeState) {}
    fn run_finished(&self, _success: bool) {}
}

pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Outcome of a completed (or naturally terminated) run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub context: ExecutionContext,
}

/// Returned by [`Executor::step`]: either the layer that just ran, or the
/// final outcome once nothing more is ready.
pub enum StepOutcome {
    Continued { layer: Vec<BlockId> },
    Finished(RunOutcome),
}

type Layer = Vec<BlockId>;

pub struct Executor {
    workflow: WorkflowDefinition,
    handlers: BlockHandlerRegistry,
    evaluator: Arc<dyn ExpressionEvaluator>,
    observer: Arc<dyn ExecutionObserver>,
    is_child_execution: bool,
    is_debugging: bool,
}

impl Executor {
    /// Validates `workflow` and builds an Executor for it. Construction-time
    /// validation is repeated in [`Executor::initialize`].
    pub fn new(
        workflow: WorkflowDefinition,
        handlers: BlockHandlerRegistry,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Result<Self, ExecutorError> {
        workflow.validate()?;
        Ok(Self {
            workflow,
            handlers,
            evaluator,
            observer: Arc::new(NoopObserver),
            is_child_execution: false,
            is_debugging: false,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        if self.is_child_execution {
            self.observer = Arc::new(NoopObserver);
        }
        self
    }

    /// Marks this Executor as driving a child (sub-workflow) run. Forces a
    /// no-op observer so no UI-visible signal leaks from the inner run.
    pub fn as_child_execution(mut self) -> Self {
        self.is_child_execution = true;
        self.observer = Arc::new(NoopObserver);
        self
    }

    pub fn with_debugging(mut self, debugging: bool) -> Self {
        self.is_debugging = debugging;
        self
    }

    pub fn is_child_execution(&self) -> bool {
        self.is_child_execution
    }

    pub fn is_debugging(&self) -> bool {
        self.is_debugging
    }

    /// `cancel(executionId)`. The executor identifies runs by the
    /// caller's own `ExecutionContext` handle rather than an opaque id.
    pub fn cancel(&self, ctx: &ExecutionContext) {
        ctx.cancellation.cancel();
    }

    /// Builds the initial context: starter marked executed and active, paths
    /// settled once so the first `next_execution_layer` has something to see.
    pub fn initialize(
        &self,
        initial_input: Value,
        environment_variables: HashMap<String, String>,
        workflow_variables: HashMap<String, WorkflowVariable>,
    ) -> Result<ExecutionContext, ExecutorError> {
        self.workflow.validate()?;
        let mut ctx =
            ExecutionContext::new(self.workflow.id.clone(), environment_variables, workflow_variables);
        let starter = self
            .workflow
            .starter()
            .ok_or_else(|| ExecutorError::Invariant("validated workflow has no starter".into()))?;
        let starter_id = starter.id.clone();
        ctx.block_states
            .insert(starter_id.clone(), BlockRuntimeState::success(initial_input, 0));
        ctx.executed_blocks.insert(starter_id.clone());
        ctx.active_execution_path.insert(starter_id.clone());
        self.settle_layer(&[starter_id], &mut ctx);
        Ok(ctx)
    }

    /// Runs to completion without stopping between layers. For debug-mode
    /// single-stepping, drive [`Executor::initialize`] and
    /// [`Executor::continue_execution`] directly instead.
    pub async fn execute(
        &self,
        initial_input: Value,
        environment_variables: HashMap<String, String>,
        workflow_variables: HashMap<String, WorkflowVariable>,
    ) -> Result<RunOutcome, ExecutorError> {
        let mut ctx = self.initialize(initial_input, environment_variables, workflow_variables)?;
        loop {
            match self.step(&mut ctx).await? {
                StepOutcome::Continued { .. } => continue,
                StepOutcome::Finished(outcome) => return Ok(outcome),
            }
        }
    }

    /// Advances exactly one layer. Returns `Finished` once no block is ready.
    /// This is the "continuation handle" of debug mode: the caller
    /// holds `ctx` and calls this again to drive the next layer.
    pub async fn step(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, ExecutorError> {
        if ctx.is_cancelled() {
            self.observer.run_finished(false);
            return Err(ExecutorError::Cancelled);
        }
        let layer = self.next_execution_layer(ctx);
        if layer.is_empty() {
            let outcome = self.finish(ctx)?;
            return Ok(StepOutcome::Finished(outcome));
        }
        self.observer.layer_started(&layer);
        self.run_layer(&layer, ctx).await?;
        Ok(StepOutcome::Continued { layer })
    }

    /// `continueExecution(executionId)`: alias for [`Executor::step`],
    /// named to match the external debug-control interface.
    pub async fn continue_execution(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, ExecutorError> {
        self.step(ctx).await
    }

    fn finish(&self, ctx: &ExecutionContext) -> Result<RunOutcome, ExecutorError> {
        self.check_invariants(ctx)?;
        let success = self.compute_success(ctx);
        self.observer.run_finished(success);
        Ok(RunOutcome {
            success,
            context: ctx.clone(),
        })
    }

    /// A block that errored on a path with no wired `error` handle makes
    /// the whole run unsuccessful; an errored block whose error edge fired
    /// chose its own outcome and does not.
    fn compute_success(&self, ctx: &ExecutionContext) -> bool {
        !ctx.executed_blocks.iter().any(|id| {
            ctx.block_states.get(id).is_some_and(|s| s.errored()) && !self.has_wired_error_handle(id)
        })
    }

    fn has_wired_error_handle(&self, id: &BlockId) -> bool {
        let original = virtual_id::extract_original_id(id);
        connection_utils::outgoing(&original, &self.workflow.connections)
            .into_iter()
            .any(|c| c.handle() == HANDLE_ERROR)
    }

    /// Invariant: every block left in the active path by the time the run
    /// settles must have executed, unless it belongs to a loop/parallel
    /// section that never completed (in which case it was legitimately
    /// reset mid-iteration and is expected to run again next tick — which
    /// only reaches `finish` if the whole run is terminating regardless).
    fn check_invariants(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        for id in &ctx.active_execution_path {
            if ctx.executed_blocks.contains(id) {
                continue;
            }
            let original = virtual_id::extract_original_id(id);
            if let Some(loop_spec) = self.workflow.loop_containing(&original)
                && !ctx.completed_loops.contains(&loop_spec.id)
            {
                continue;
            }
            if let Some(par_spec) = self.workflow.parallel_containing(&original)
                && !ctx.completed_loops.contains(&par_spec.id)
            {
                continue;
            }
            return Err(ExecutorError::Invariant(format!(
                "block {id} is in the active path but never executed"
            )));
        }
        Ok(())
    }

    /// "Next execution layer": a block is ready once every incoming
    /// edge whose source is itself on the active path has settled. Sources
    /// off the active path never block readiness (satisfied by inactivity).
    fn next_execution_layer(&self, ctx: &ExecutionContext) -> Layer {
        let tracker = PathTracker::new(&self.workflow);
        let mut ready: Layer = ctx
            .active_execution_path
            .iter()
            .filter(|id| !ctx.executed_blocks.contains(*id))
            .filter(|id| {
                let original = virtual_id::extract_original_id(id);
                self.workflow.block(&original).is_some_and(|b| b.enabled)
            })
            .filter(|id| self.is_ready(id, &tracker, ctx))
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ready
    }

    fn is_ready(&self, target_id: &BlockId, tracker: &PathTracker, ctx: &ExecutionContext) -> bool {
        let original = virtual_id::extract_original_id(target_id);
        connection_utils::incoming(&original, &self.workflow.connections)
            .into_iter()
            .all(|c| {
                let source_key = tracker.namespaced(target_id, &c.source);
                !ctx.active_execution_path.contains(&source_key) || ctx.executed_blocks.contains(&source_key)
            })
    }

    /// Resolves inputs and dispatches handlers for one layer, then installs
    /// results and settles paths. The "settled all" rule: a failing block
    /// never aborts the layer, it just records its own error.
    async fn run_layer(&self, layer: &Layer, ctx: &mut ExecutionContext) -> Result<(), ExecutorError> {
        let mut resolved_by_id: HashMap<BlockId, Value> = HashMap::with_capacity(layer.len());
        for id in layer {
            let original = virtual_id::extract_original_id(id);
            let Some(block) = self.workflow.block(&original) else {
                continue;
            };
            let params: Map<String, Value> = block.config.as_object().cloned().unwrap_or_default();
            let resolved = input_resolver::resolve_params(
                &self.workflow,
                ctx,
                self.evaluator.as_ref(),
                block,
                &[],
                &HashMap::new(),
                FormattingContext::for_block_type(block.block_type.as_str()),
                &params,
            )
            .map_err(|source| ExecutorError::Resolution {
                block: id.clone(),
                source,
            })?;
            resolved_by_id.insert(id.clone(), Value::Object(resolved));
        }

        type Settled = (BlockId, u64, Result<HandlerOutput, HandlerError>);
        let mut futures_vec: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Settled> + Send>>> =
            Vec::with_capacity(layer.len());

        for id in layer {
            let original = virtual_id::extract_original_id(id);
            let block = self
                .workflow
                .block(&original)
                .cloned()
                .expect("validated workflow references only existing blocks");
            let resolved = resolved_by_id.remove(id).unwrap_or(Value::Null);
            let id = id.clone();
            let start = Instant::now();

            match &block.block_type {
                BlockType::Loop | BlockType::Parallel => {
                    futures_vec.push(Box::pin(async move {
                        (id, start.elapsed().as_millis() as u64, Ok(HandlerOutput::success(Value::Null)))
                    }));
                }
                _ => {
                    let Some(handler) = self.handlers.find(block.block_type.as_str()).cloned() else {
                        let type_name = block.block_type.as_str().to_string();
                        futures_vec.push(Box::pin(async move {
                            (
                                id,
                                start.elapsed().as_millis() as u64,
                                Err(HandlerError::Other(format!(
                                    "no handler registered for block type {type_name}"
                                ))),
                            )
                        }));
                        continue;
                    };
                    let ctx_snapshot = ctx.clone();
                    futures_vec.push(Box::pin(async move {
                        let outcome =
                            tokio::task::spawn_blocking(move || handler.execute(&block, &resolved, &ctx_snapshot))
                                .await;
                        let outcome = match outcome {
                            Ok(result) => result,
                            Err(join_err) => Err(HandlerError::Other(format!(
                                "handler task panicked: {join_err}"
                            ))),
                        };
                        (id, start.elapsed().as_millis() as u64, outcome)
                    }));
                }
            }
        }

        let settled = join_all(futures_vec).await;
        for (id, duration_ms, result) in settled {
            let state = match result {
                Ok(output) => match output.error {
                    Some(err) => BlockRuntimeState::failure(err, duration_ms),
                    None => BlockRuntimeState::success(output.output, duration_ms),
                },
                Err(err) => BlockRuntimeState::failure(err.to_string(), duration_ms),
            };
            self.observer.block_settled(&id, &state);
            ctx.block_states.insert(id.clone(), state);
            ctx.executed_blocks.insert(id);
        }

        self.settle_layer(layer, ctx);
        Ok(())
    }

    /// The post-layer linearization point: path tracking, then loop, then
    /// parallel bookkeeping, in that order so a loop/parallel that just
    /// completed activates its exit edge before the next layer is computed.
    fn settle_layer(&self, layer: &[BlockId], ctx: &mut ExecutionContext) {
        let tracker = PathTracker::new(&self.workflow);
        tracker.update_execution_paths(layer, ctx);
        let loop_mgr = LoopManager::new(&self.workflow);
        loop_mgr.process_loop_iterations(self.evaluator.as_ref(), ctx);
        let parallel_mgr = ParallelManager::new(&self.workflow);
        parallel_mgr.process_parallel_completions(self.evaluator.as_ref(), ctx);
    }
}
