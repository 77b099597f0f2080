//! Router block handler: picks one outgoing block from
//! `config.routes`, evaluating each route's predicate against this block's
//! resolved params in order and falling back to `config.default`. Reports
//! its pick as `{"selectedPath": {"blockId": ...}}`, the shape PathTracker
//! reads to drive activation.

use serde::Deserialize;
use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

use crate::predicate::Predicate;

#[derive(Debug, Clone, Deserialize)]
struct Route {
    #[serde(rename = "when")]
    predicate: Predicate,
    target: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RouterConfig {
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    default: Option<String>,
}

pub struct RouterBlockHandler;

impl BlockHandler for RouterBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "router"
    }

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let config: RouterConfig = serde_json::from_value(block.config.clone())
            .map_err(|e| HandlerError::Other(format!("invalid router config: {e}")))?;

        let selected = config
            .routes
            .iter()
            .find(|route| route.predicate.eval(resolved_inputs))
            .map(|route| route.target.clone())
            .or(config.default);

        match selected {
            Some(target) => Ok(HandlerOutput::success(
                serde_json::json!({"selectedPath": {"blockId": target}}),
            )),
            None => Ok(HandlerOutput::failure("router matched no route and has no default")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::model::BlockType;

    fn block(config: Value) -> Block {
        Block {
            id: "router1".into(),
            block_type: BlockType::Router,
            name: "Router1".into(),
            config,
            enabled: true,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Default::default(), Default::default())
    }

    #[test]
    fn selects_the_first_matching_route() {
        let handler = RouterBlockHandler;
        let config = serde_json::json!({
            "routes": [
                {"when": {"op": "greater_than", "path": "score", "value": 100}, "target": "high"},
                {"when": {"op": "greater_than", "path": "score", "value": 0}, "target": "low"}
            ],
            "default": "fallback"
        });
        let out = handler
            .execute(&block(config), &serde_json::json!({"score": 10}), &ctx())
            .unwrap();
        assert_eq!(out.output["selectedPath"]["blockId"], serde_json::json!("low"));
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let handler = RouterBlockHandler;
        let config = serde_json::json!({
            "routes": [{"when": {"op": "exists", "path": "missing"}, "target": "x"}],
            "default": "fallback"
        });
        let out = handler
            .execute(&block(config), &Value::Null, &ctx())
            .unwrap();
        assert_eq!(out.output["selectedPath"]["blockId"], serde_json::json!("fallback"));
    }
}
