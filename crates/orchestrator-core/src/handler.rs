//! Block handler contract: the interface concrete block types satisfy.
//!
//! The engine knows nothing about what a `function` or `agent` block actually
//! does — it only knows how to look up a handler by block type string and
//! call it with resolved inputs. Concrete handlers live in orchestrator-blocks.

use std::sync::Arc;

use serde_json::Value;

use crate::model::{Block, ExecutionContext};

/// What a handler hands back to the Executor after running a block.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub output: Value,
    /// Set when the block itself considers its own run a failure (as
    /// opposed to the handler call returning `Err`, which is an
    /// infrastructure-level failure). Both are recorded identically on the
    /// block's runtime state.
    pub error: Option<String>,
    /// Whether this block produced a stream the engine should forward.
    /// Streaming content itself is out of scope; this is a marker only.
    pub stream: bool,
}

impl HandlerOutput {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
            stream: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(error.into()),
            stream: false,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum HandlerError {
    #[error("{0}")]
    Other(String),
}

/// A concrete block implementation. `execute` runs synchronously and is
/// dispatched through `spawn_blocking` by the Executor so a slow handler
/// never blocks the async runtime.
pub trait BlockHandler: Send + Sync {
    fn supports(&self, block_type: &str) -> bool;

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Looks up handlers by block type. Registration order doesn't matter; the
/// first handler whose `supports` returns true wins, so callers should avoid
/// registering two handlers for the same type.
#[derive(Default, Clone)]
pub struct BlockHandlerRegistry {
    handlers: Vec<Arc<dyn BlockHandler>>,
}

impl BlockHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn BlockHandler>) {
        self.handlers.push(handler);
    }

    pub fn find(&self, block_type: &str) -> Option<&Arc<dyn BlockHandler>> {
        self.handlers.iter().find(|h| h.supports(block_type))
    }
}

/// Passes resolved inputs through unchanged. Useful as a default for block
/// types the caller doesn't care to implement, and as the reference handler
/// in this crate's own executor tests.
pub struct EchoHandler;

impl BlockHandler for EchoHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "echo"
    }

    fn execute(
        &self,
        _block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::success(resolved_inputs.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockId, BlockType};

    fn block(id: &str, ty: BlockType) -> Block {
        Block {
            id: BlockId::new(id),
            block_type: ty,
            name: id.to_string(),
            config: Value::Null,
            enabled: true,
        }
    }

    #[test]
    fn registry_finds_by_supports() {
        let mut registry = BlockHandlerRegistry::new();
        registry.register(Arc::new(EchoHandler));
        assert!(registry.find("echo").is_some());
        assert!(registry.find("function").is_none());
    }

    #[test]
    fn echo_handler_passes_input_through() {
        let handler = EchoHandler;
        let block = block("e1", BlockType::Custom("echo".into()));
        let ctx = ExecutionContext::new("wf", Default::default(), Default::default());
        let out = handler
            .execute(&block, &serde_json::json!({"a": 1}), &ctx)
            .unwrap();
        assert_eq!(out.output, serde_json::json!({"a": 1}));
    }
}
