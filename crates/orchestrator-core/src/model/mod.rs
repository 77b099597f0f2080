//! Static workflow data model and the mutable runtime context it is executed against.

pub mod builder;
pub mod context;
pub mod workflow;

pub use builder::WorkflowDefinitionBuilder;
pub use context::{
    BlockLogEntry, BlockRuntimeState, Decisions, ExecutionContext, LoopRunState, VariableType,
    WorkflowVariable,
};
pub use workflow::{
    Block, BlockCategory, BlockId, BlockType, Connection, LoopSpec, LoopType, ParallelSpec,
    WorkflowDefinition, WorkflowValidationError, condition_handle, parse_condition_handle,
    HANDLE_ERROR, HANDLE_LOOP_END, HANDLE_LOOP_START, HANDLE_PARALLEL_END, HANDLE_PARALLEL_START,
    HANDLE_SOURCE,
};
