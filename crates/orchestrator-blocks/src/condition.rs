//! Condition block handler: evaluates `config.conditions`
//! in order against this block's resolved params and reports the first match's
//! id as `{"selectedConditionId": ..., "conditionResult": true}`, the shape
//! PathTracker reads to activate the matching `condition-<id>` outgoing edge.
//! Same predicate language as the router handler, one branch id per entry
//! instead of one target block per entry.

use serde::Deserialize;
use serde_json::Value;

use orchestrator_core::handler::{BlockHandler, HandlerError, HandlerOutput};
use orchestrator_core::model::{Block, ExecutionContext};

use crate::predicate::Predicate;

#[derive(Debug, Clone, Deserialize)]
struct ConditionBranch {
    id: String,
    #[serde(rename = "when")]
    predicate: Predicate,
}

#[derive(Debug, Clone, Deserialize)]
struct ConditionConfig {
    #[serde(default)]
    conditions: Vec<ConditionBranch>,
    #[serde(default)]
    default: Option<String>,
}

pub struct ConditionBlockHandler;

impl BlockHandler for ConditionBlockHandler {
    fn supports(&self, block_type: &str) -> bool {
        block_type == "condition"
    }

    fn execute(
        &self,
        block: &Block,
        resolved_inputs: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let config: ConditionConfig = serde_json::from_value(block.config.clone())
            .map_err(|e| HandlerError::Other(format!("invalid condition config: {e}")))?;

        let matched = config
            .conditions
            .iter()
            .find(|branch| branch.predicate.eval(resolved_inputs))
            .map(|branch| branch.id.clone());

        match matched.or(config.default) {
            Some(id) => Ok(HandlerOutput::success(serde_json::json!({
                "selectedConditionId": id,
                "conditionResult": true,
            }))),
            None => Ok(HandlerOutput::failure(
                "condition matched no branch and has no default",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::model::BlockType;

    fn block(config: Value) -> Block {
        Block {
            id: "cond1".into(),
            block_type: BlockType::Condition,
            name: "Cond1".into(),
            config,
            enabled: true,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("wf", Default::default(), Default::default())
    }

    #[test]
    fn selects_the_first_matching_branch() {
        let handler = ConditionBlockHandler;
        let config = serde_json::json!({
            "conditions": [
                {"id": "big", "when": {"op": "greater_than", "path": "score", "value": 100}},
                {"id": "small", "when": {"op": "greater_than", "path": "score", "value": 0}}
            ],
            "default": "fallback"
        });
        let out = handler
            .execute(&block(config), &serde_json::json!({"score": 10}), &ctx())
            .unwrap();
        assert_eq!(out.output["selectedConditionId"], serde_json::json!("small"));
        assert_eq!(out.output["conditionResult"], serde_json::json!(true));
    }

    #[test]
    fn falls_back_to_default_branch() {
        let handler = ConditionBlockHandler;
        let config = serde_json::json!({
            "conditions": [{"id": "x", "when": {"op": "exists", "path": "missing"}}],
            "default": "fallback"
        });
        let out = handler
            .execute(&block(config), &Value::Null, &ctx())
            .unwrap();
        assert_eq!(out.output["selectedConditionId"], serde_json::json!("fallback"));
    }

    #[test]
    fn no_match_and_no_default_is_a_block_error() {
        let handler = ConditionBlockHandler;
        let config = serde_json::json!({
            "conditions": [{"id": "x", "when": {"op": "exists", "path": "missing"}}]
        });
        let out = handler.execute(&block(config), &Value::Null, &ctx()).unwrap();
        assert!(out.error.is_some());
    }
}
