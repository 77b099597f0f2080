//! Built-in block handlers for the orchestrator:
//! function, api, agent, response, router, condition, and the `workflow`
//! flow-control handler that runs a nested execution. `loop`/`parallel`
//! need no handler of their own — the Executor special-cases them and
//! PathTracker/LoopManager/ParallelManager drive their activation.

mod agent;
mod api;
mod child_workflow;
mod condition;
mod evaluator;
mod function;
mod predicate;
mod response;
mod router;

pub use agent::{harness_from_env, AgentBlockHandler};
pub use api::{ApiBlockHandler, ApiRequestError, ApiRequester, ApiResponse, ReqwestApiRequester};
pub use child_workflow::WorkflowBlockHandler;
pub use condition::ConditionBlockHandler;
pub use evaluator::EvaluatorBlockHandler;
pub use function::{FunctionBlockHandler, FunctionRunner, TemplateFunctionRunner};
pub use predicate::Predicate;
pub use response::{HandlebarsResponseRenderer, ResponseBlockHandler, ResponseRenderer};
pub use router::RouterBlockHandler;

pub use orchestrator_core::handler::{BlockHandler, BlockHandlerRegistry, EchoHandler, HandlerError, HandlerOutput};
pub use orchestrator_core::{Block, BlockId, Executor, ExecutorError, WorkflowDefinition};

use std::sync::Arc;

use orchestrator_ai_harness::Harness;
use orchestrator_core::expression::{ExpressionEvaluator, NoopEvaluator};

/// Registry with every handler that needs no external wiring (function,
/// response, router, condition, evaluator over [`NoopEvaluator`]) plus `api`
/// over the real `reqwest` client. Use [`default_handlers_with_evaluator`] to
/// plug in a real expression evaluator, or [`default_handlers_with_agent`] to
/// add `agent`/`workflow`, which need a `Harness` and a shared registry.
pub fn default_handlers() -> BlockHandlerRegistry {
    default_handlers_with_evaluator(Arc::new(NoopEvaluator))
}

/// [`default_handlers`] with `evaluator` wired to a caller-supplied
/// [`ExpressionEvaluator`] instead of the structured-JSON-only default.
pub fn default_handlers_with_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> BlockHandlerRegistry {
    let mut registry = BlockHandlerRegistry::new();
    registry.register(Arc::new(FunctionBlockHandler::new(Arc::new(TemplateFunctionRunner))));
    registry.register(Arc::new(ResponseBlockHandler::new(Arc::new(HandlebarsResponseRenderer))));
    registry.register(Arc::new(RouterBlockHandler));
    registry.register(Arc::new(ConditionBlockHandler));
    registry.register(Arc::new(ApiBlockHandler::new(Arc::new(ReqwestApiRequester))));
    registry.register(Arc::new(EvaluatorBlockHandler::new(evaluator)));
    registry
}

/// [`default_handlers_with_evaluator`] plus `agent` (via `harness`) and
/// `workflow`. The `workflow` handler's child registry is a snapshot taken
/// before it is itself added, so nested workflows run with every handler but
/// cannot recurse into further `workflow` blocks — one level of sub-workflow
/// nesting.
pub fn default_handlers_with_agent(
    harness: Harness,
    evaluator: Arc<dyn ExpressionEvaluator>,
    runtime: tokio::runtime::Handle,
) -> BlockHandlerRegistry {
    let mut registry = default_handlers_with_evaluator(evaluator.clone());
    registry.register(Arc::new(AgentBlockHandler::new(harness, runtime.clone())));
    let child_registry = registry.clone();
    registry.register(Arc::new(WorkflowBlockHandler::new(child_registry, evaluator, runtime)));
    registry
}
