//! Agent block handler: runs one LLM turn through orchestrator-ai-harness,
//! delegating the actual call to the harness's async, provider-agnostic
//! `Harness`/`Session`/`RunBuilder` API instead of hand-rolling the HTTP call.

use std::sync::Arc;

use orchestrator_ai_harness::{Harness, ModelRef, SessionConfig};
use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

pub struct AgentBlockHandler {
    harness: Harness,
    runtime: tokio::runtime::Handle,
}

impl AgentBlockHandler {
    /// `runtime` drives the harness's async run; pass the handle of the
    /// runtime the Executor itself runs on (handlers execute on a
    /// `spawn_blocking` thread, so blocking it on an async call is safe).
    pub fn new(harness: Harness, runtime: tokio::runtime::Handle) -> Self {
        Self { harness, runtime }
    }
}

impl BlockHandler for AgentBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "agent"
    }

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let provider = block
            .config
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or("openai");
        let model = block
            .config
            .get("model")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::Other("agent block requires config.model".into()))?;
        let system_prompt = resolved_inputs
            .get("systemPrompt")
            .and_then(|v| v.as_str())
            .or_else(|| block.config.get("systemPrompt").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();
        let user_text = resolved_inputs
            .get("prompt")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| resolved_inputs.to_string());

        let harness = self.harness.clone();
        let model_ref = ModelRef::new(provider, model);
        let session_name = block.name.clone();
        let result: Result<String, orchestrator_ai_harness::HarnessError> =
            self.runtime.block_on(async move {
                harness
                    .session(SessionConfig::named(session_name))
                    .run(model_ref)
                    .system_prompt(system_prompt)
                    .user_text(user_text)
                    .collect_text()
                    .await
            });

        match result {
            Ok(text) => Ok(HandlerOutput::success(serde_json::json!({ "result": text }))),
            Err(e) => Ok(HandlerOutput::failure(e.to_string())),
        }
    }
}

/// Builds a `Harness` with whichever providers have credentials available in
/// the environment. Providers without a usable env var are skipped rather
/// than failing the whole registration.
pub fn harness_from_env() -> Result<Harness, orchestrator_ai_harness::HarnessError> {
    let mut builder = Harness::builder();
    if let Ok(config) = orchestrator_ai_harness::vendors::openai::OpenAiClientConfig::from_env() {
        let provider = orchestrator_ai_harness::vendors::openai::OpenAiProvider::new(config)?;
        builder = builder.register_provider(Arc::new(provider));
    }
    builder.build()
}
