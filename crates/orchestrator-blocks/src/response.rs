//! Response block handler: the workflow's terminal output formatter.
//! Renders `config.template` against resolved params with an injected
//! renderer; passes params through unchanged when no template is configured.

use std::sync::Arc;

use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

pub trait ResponseRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, String>;
}

pub struct ResponseBlockHandler {
    renderer: Arc<dyn ResponseRenderer>,
}

impl ResponseBlockHandler {
    pub fn new(renderer: Arc<dyn ResponseRenderer>) -> Self {
        Self { renderer }
    }
}

impl BlockHandler for ResponseBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "response"
    }

    fn execute(
        &self,
        _block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let Some(template) = resolved_inputs.get("template").and_then(|v| v.as_str()) else {
            return Ok(HandlerOutput::success(resolved_inputs.clone()));
        };
        match self.renderer.render(template, resolved_inputs) {
            Ok(text) => Ok(HandlerOutput::success(Value::String(text))),
            Err(message) => Ok(HandlerOutput::failure(message)),
        }
    }
}

pub struct HandlebarsResponseRenderer;

impl ResponseRenderer for HandlebarsResponseRenderer {
    fn render(&self, template: &str, data: &Value) -> Result<String, String> {
        let reg = handlebars::Handlebars::new();
        reg.render_template(template, data).map_err(|e| e.to_string())
    }
}
