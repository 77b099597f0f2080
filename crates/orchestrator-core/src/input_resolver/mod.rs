//! InputResolver: replaces placeholders inside a block's configured
//! parameters with concrete values drawn from the `ExecutionContext`.
//!
//! Ties together the tokenizer ([`grammar`]), the tagged-value path
//! interpreter ([`crate::value`]), conditional sub-block filtering
//! ([`schema`]), and contextual formatting ([`format`]) into the single
//! entry point [`resolve_params`].

pub mod format;
pub mod grammar;
pub mod schema;

use std::collections::HashMap;
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::connection_utils;
use crate::expression::ExpressionEvaluator;
use crate::model::{Block, BlockId, ExecutionContext, WorkflowDefinition};
use crate::value::{self, PathError};
use crate::virtual_id;
use format::FormattingContext;
use grammar::{Reference, Token};
use schema::ParamSchemaEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Json,
    Plain,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("missing environment variable {0}")]
    MissingEnvVar(String),
    #[error("reference to disabled block {0}")]
    DisabledBlockReference(String),
    #[error("reference to {block}{path}: {source}")]
    Path {
        block: String,
        path: String,
        source: PathError,
    },
}

/// Result of resolving one reference token, before splicing/formatting.
enum RefResolution {
    Value(Value),
    /// Accessible but not on the active path: substitutes to empty string.
    EmptyInactive,
    /// Unknown/inaccessible reference: left as literal text, logged at warn.
    Literal,
}

/// The set of blocks accessible to `block_id` per the accessibility rule:
/// direct predecessors, the starter, and fellow members of any loop/parallel
/// `block_id` belongs to.
pub fn accessible_blocks(workflow: &WorkflowDefinition, block_id: &BlockId) -> HashSet<BlockId> {
    let mut set = HashSet::new();
    for c in connection_utils::incoming(block_id, &workflow.connections) {
        set.insert(c.source.clone());
    }
    if let Some(starter) = workflow.starter() {
        set.insert(starter.id.clone());
    }
    if let Some(loop_spec) = workflow.loop_containing(block_id) {
        set.extend(loop_spec.nodes.iter().cloned());
        set.insert(loop_spec.id.clone());
    }
    if let Some(par) = workflow.parallel_containing(block_id) {
        set.extend(par.nodes.iter().cloned());
        set.insert(par.id.clone());
    }
    set
}

/// The effective block-state key for `target`, translated to the virtual id
/// of the same iteration when `current` is running inside a parallel section
/// and `target` is also a member of that same parallel ("virtual-block
/// routing").
fn effective_state_key(workflow: &WorkflowDefinition, ctx: &ExecutionContext, target: &BlockId) -> BlockId {
    let Some(current_virtual) = &ctx.current_virtual_block_id else {
        return target.clone();
    };
    let Some((_, parallel_id, iteration)) = virtual_id::decode(current_virtual) else {
        return target.clone();
    };
    let same_parallel = workflow
        .parallels
        .get(&parallel_id)
        .is_some_and(|spec| spec.nodes.contains(target));
    if same_parallel {
        virtual_id::build_virtual_id(target, &parallel_id, iteration)
    } else {
        target.clone()
    }
}

fn resolve_block_reference(
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    current_block: &Block,
    reference: &str,
    path: &str,
) -> Result<RefResolution, ResolveError> {
    let Some(target) = workflow.find_by_name_or_alias(reference) else {
        tracing::warn!(reference, "unknown block reference; left as literal");
        return Ok(RefResolution::Literal);
    };
    if !target.enabled {
        return Err(ResolveError::DisabledBlockReference(target.name.clone()));
    }
    let accessible = accessible_blocks(workflow, &current_block.id);
    if !accessible.contains(&target.id) {
        tracing::warn!(
            target = %target.id,
            from = %current_block.id,
            "block reference outside accessible set; left as literal"
        );
        return Ok(RefResolution::Literal);
    }
    let key = effective_state_key(workflow, ctx, &target.id);
    let Some(state) = ctx.block_states.get(&key) else {
        return Ok(RefResolution::EmptyInactive);
    };
    let output = state.output.clone().unwrap_or(Value::Null);
    if path.is_empty() {
        return Ok(RefResolution::Value(output));
    }
    let resolved = value::resolve_path_str(&output, path).map_err(|e| ResolveError::Path {
        block: target.name.clone(),
        path: path.to_string(),
        source: e,
    })?;
    Ok(RefResolution::Value(resolved.clone()))
}

fn loop_iteration_index(ctx: &ExecutionContext, loop_id: &BlockId) -> u32 {
    ctx.loop_iterations.get(loop_id).copied().unwrap_or(1).saturating_sub(1)
}

fn resolve_loop_reference(
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    current_block: &Block,
    reference: &Reference,
) -> Result<RefResolution, ResolveError> {
    let Some(loop_spec) = workflow.loop_containing(&current_block.id) else {
        tracing::warn!(block = %current_block.id, "loop reference outside any loop; left as literal");
        return Ok(RefResolution::Literal);
    };
    let index = loop_iteration_index(ctx, &loop_spec.id);
    let items_key = ExecutionContext::items_key(&loop_spec.id);
    let items = ctx.loop_items.get(&items_key).cloned().unwrap_or(Value::Null);
    match reference {
        Reference::LoopIndex => Ok(RefResolution::Value(Value::from(index))),
        Reference::LoopItems => Ok(RefResolution::Value(items)),
        Reference::LoopCurrentItem { path } => {
            let item = items
                .as_array()
                .and_then(|items| items.get(index as usize))
                .cloned()
                .unwrap_or(Value::Null);
            if path.is_empty() {
                return Ok(RefResolution::Value(item));
            }
            let resolved = value::resolve_path_str(&item, path).map_err(|e| ResolveError::Path {
                block: loop_spec.id.to_string(),
                path: path.clone(),
                source: e,
            })?;
            Ok(RefResolution::Value(resolved.clone()))
        }
        _ => unreachable!("resolve_loop_reference called with non-loop reference"),
    }
}

fn resolve_parallel_reference(
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    current_block: &Block,
    reference: &Reference,
) -> Result<RefResolution, ResolveError> {
    let Some(parallel_spec) = workflow.parallel_containing(&current_block.id) else {
        tracing::warn!(block = %current_block.id, "parallel reference outside any parallel; left as literal");
        return Ok(RefResolution::Literal);
    };
    let Some(current_virtual) = &ctx.current_virtual_block_id else {
        tracing::warn!(block = %current_block.id, "parallel reference outside a running iteration; left as literal");
        return Ok(RefResolution::Literal);
    };
    let Some((_, parallel_id, iteration)) = virtual_id::decode(current_virtual) else {
        return Ok(RefResolution::Literal);
    };
    if parallel_id != parallel_spec.id {
        return Ok(RefResolution::Literal);
    }
    let items_key = ExecutionContext::items_key(&parallel_id);
    let items = ctx.loop_items.get(&items_key).cloned().unwrap_or(Value::Null);
    match reference {
        Reference::ParallelIndex => Ok(RefResolution::Value(Value::from(iteration))),
        Reference::ParallelItems => Ok(RefResolution::Value(items)),
        Reference::ParallelCurrentItem { path } => {
            let item_key = ExecutionContext::iteration_item_key(&parallel_id, iteration);
            let item = ctx.loop_items.get(&item_key).cloned().unwrap_or(Value::Null);
            if path.is_empty() {
                return Ok(RefResolution::Value(item));
            }
            let resolved = value::resolve_path_str(&item, path).map_err(|e| ResolveError::Path {
                block: parallel_spec.id.to_string(),
                path: path.clone(),
                source: e,
            })?;
            Ok(RefResolution::Value(resolved.clone()))
        }
        _ => unreachable!("resolve_parallel_reference called with non-parallel reference"),
    }
}

fn resolve_reference(
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    evaluator: &dyn ExpressionEvaluator,
    current_block: &Block,
    reference: &Reference,
) -> Result<RefResolution, ResolveError> {
    let _ = evaluator; // reserved: forEachItems/distribution evaluation happens in LoopManager/ParallelManager, not here.
    match reference {
        Reference::Env { name } => match ctx.environment_variables.get(name) {
            Some(v) => Ok(RefResolution::Value(Value::String(v.clone()))),
            None => Err(ResolveError::MissingEnvVar(name.clone())),
        },
        Reference::Variable { name } => match ctx.workflow_variables.get(name) {
            Some(var) => Ok(RefResolution::Value(var.value.clone())),
            None => {
                tracing::warn!(name, "unknown workflow variable; left as literal");
                Ok(RefResolution::Literal)
            }
        },
        Reference::Block { reference, path } => {
            resolve_block_reference(workflow, ctx, current_block, reference, path)
        }
        Reference::LoopIndex | Reference::LoopItems | Reference::LoopCurrentItem { .. } => {
            resolve_loop_reference(workflow, ctx, current_block, reference)
        }
        Reference::ParallelIndex | Reference::ParallelItems | Reference::ParallelCurrentItem { .. } => {
            resolve_parallel_reference(workflow, ctx, current_block, reference)
        }
    }
}

/// Resolves every reference in `text`. A single token spanning the whole
/// string resolves to its native JSON type (so e.g. a block reference to an
/// object stays an object); anything else splices formatted text.
fn resolve_text(
    text: &str,
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    evaluator: &dyn ExpressionEvaluator,
    current_block: &Block,
    formatting: FormattingContext,
) -> Result<Value, ResolveError> {
    let tokens: Vec<Token> = grammar::scan(text);
    if tokens.is_empty() {
        return Ok(Value::String(text.to_string()));
    }
    if tokens.len() == 1 && tokens[0].start == 0 && tokens[0].end == text.len() {
        return Ok(match resolve_reference(workflow, ctx, evaluator, current_block, &tokens[0].reference)? {
            RefResolution::Value(v) => v,
            RefResolution::EmptyInactive => Value::String(String::new()),
            RefResolution::Literal => Value::String(text.to_string()),
        });
    }

    let mut result = String::with_capacity(text.len());
    let mut last = 0usize;
    for tok in &tokens {
        result.push_str(&text[last..tok.start]);
        match resolve_reference(workflow, ctx, evaluator, current_block, &tok.reference)? {
            RefResolution::Value(v) => {
                result.push_str(&format::format_value_for_context(&v, formatting));
            }
            RefResolution::EmptyInactive => {}
            RefResolution::Literal => result.push_str(&tok.raw),
        }
        last = tok.end;
    }
    result.push_str(&text[last..]);
    Ok(Value::String(result))
}

fn is_table_shaped(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| item.get("cells").is_some_and(|c| c.is_object()))
}

fn resolve_value(
    value: &Value,
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    evaluator: &dyn ExpressionEvaluator,
    current_block: &Block,
    formatting: FormattingContext,
) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => resolve_text(s, workflow, ctx, evaluator, current_block, formatting),
        Value::Array(items) if is_table_shaped(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let mut obj = item.as_object().cloned().unwrap_or_default();
                if let Some(Value::Object(cells)) = obj.get("cells").cloned() {
                    let mut resolved_cells = Map::new();
                    for (k, v) in cells {
                        resolved_cells.insert(k, resolve_value(&v, workflow, ctx, evaluator, current_block, formatting)?);
                    }
                    obj.insert("cells".to_string(), Value::Object(resolved_cells));
                }
                out.push(Value::Object(obj));
            }
            Ok(Value::Array(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, workflow, ctx, evaluator, current_block, formatting)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, workflow, ctx, evaluator, current_block, formatting)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn coerce(value: Value, param_type: ParamType) -> Value {
    match param_type {
        ParamType::Plain => value,
        ParamType::String => Value::String(format::value_to_plain_string(&value)),
        ParamType::Number => match &value {
            Value::Number(_) => value,
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(Value::from_f64).unwrap_or(value),
            _ => value,
        },
        ParamType::Boolean => match &value {
            Value::Bool(_) => value,
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value,
            },
            _ => value,
        },
        ParamType::Json => match &value {
            Value::String(s) => serde_json::from_str(s).unwrap_or(value),
            _ => value,
        },
    }
}

/// Resolves every parameter of `params` against `ctx`, applying (in order)
/// conditional sub-block filtering, reference resolution, and per-parameter
/// type coercion. `formatting` picks the contextual-formatting rules that
/// apply when a reference is spliced into a larger string.
#[allow(clippy::too_many_arguments)]
pub fn resolve_params(
    workflow: &WorkflowDefinition,
    ctx: &ExecutionContext,
    evaluator: &dyn ExpressionEvaluator,
    current_block: &Block,
    schema: &[ParamSchemaEntry],
    param_types: &HashMap<String, ParamType>,
    formatting: FormattingContext,
    params: &Map<String, Value>,
) -> Result<Map<String, Value>, ResolveError> {
    let filtered = schema::filter_conditional_params(schema, params);
    let mut out = Map::with_capacity(filtered.len());
    for (key, v) in filtered {
        let resolved = resolve_value(&v, workflow, ctx, evaluator, current_block, formatting)?;
        let coerced = match param_types.get(&key) {
            Some(t) => coerce(resolved, *t),
            None => resolved,
        };
        out.insert(key, coerced);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::NoopEvaluator;
    use crate::model::{BlockCategory, BlockRuntimeState, BlockType, Connection, WorkflowVariable};
    use std::collections::HashMap as Map2;

    fn block(id: &str, block_type: BlockType) -> Block {
        Block {
            id: BlockId::new(id),
            block_type,
            name: id.to_string(),
            config: Value::Null,
            enabled: true,
        }
    }

    fn workflow() -> WorkflowDefinition {
        let mut blocks = Map2::new();
        blocks.insert(BlockId::new("start"), block("start", BlockType::Starter));
        blocks.insert(BlockId::new("fn1"), block("fn1", BlockType::Custom("function".into())));
        blocks.insert(BlockId::new("fn2"), block("fn2", BlockType::Custom("function".into())));
        WorkflowDefinition {
            id: "wf".into(),
            version: 1,
            blocks,
            connections: vec![
                Connection::new("start", "fn1"),
                Connection::new("fn1", "fn2"),
            ],
            loops: Map2::new(),
            parallels: Map2::new(),
        }
    }

    fn ctx_with(fn1_output: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        ctx.block_states.insert(
            BlockId::new("fn1"),
            BlockRuntimeState::success(fn1_output, 1),
        );
        ctx.executed_blocks.insert(BlockId::new("fn1"));
        ctx.active_execution_path.insert(BlockId::new("fn1"));
        ctx
    }

    #[test]
    fn whole_token_block_reference_preserves_native_type() {
        let wf = workflow();
        let ctx = ctx_with(serde_json::json!({"result": "hi"}));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let resolved = resolve_text(
            "<fn1.result>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("hi".to_string()));
    }

    #[test]
    fn partial_match_splices_formatted_text() {
        let wf = workflow();
        let ctx = ctx_with(serde_json::json!({"result": "hi"}));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let resolved = resolve_text(
            "value: <fn1.result>!",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("value: hi!".to_string()));
    }

    #[test]
    fn inaccessible_block_left_as_literal() {
        let wf = workflow();
        let mut ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        ctx.block_states.insert(
            BlockId::new("fn2"),
            BlockRuntimeState::success(serde_json::json!("x"), 1),
        );
        let start = block("start", BlockType::Starter);
        // fn1 cannot see fn2's output (fn2 is downstream, not an accessible predecessor).
        let resolved = resolve_text(
            "<fn2.result>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &start,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("<fn2.result>".to_string()));
    }

    #[test]
    fn inactive_accessible_block_resolves_to_empty_string() {
        let wf = workflow();
        let ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let resolved = resolve_text(
            "<fn1.result>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String(String::new()));
    }

    #[test]
    fn missing_env_var_is_a_hard_error() {
        let wf = workflow();
        let ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        let start = block("start", BlockType::Starter);
        let err = resolve_text("{{API_KEY}}", &wf, &ctx, &NoopEvaluator, &start, FormattingContext::Plain)
            .unwrap_err();
        assert_eq!(err, ResolveError::MissingEnvVar("API_KEY".to_string()));
    }

    #[test]
    fn disabled_block_reference_is_a_hard_error() {
        let mut wf = workflow();
        wf.blocks.get_mut(&BlockId::new("fn1")).unwrap().enabled = false;
        let ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let err = resolve_text("<fn1>", &wf, &ctx, &NoopEvaluator, &fn2, FormattingContext::Plain).unwrap_err();
        assert_eq!(err, ResolveError::DisabledBlockReference("fn1".to_string()));
    }

    #[test]
    fn out_of_bounds_path_is_a_hard_error() {
        let wf = workflow();
        let ctx = ctx_with(serde_json::json!({"items": [1, 2]}));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let err = resolve_text(
            "<fn1.items[5]>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Path { .. }));
    }

    #[test]
    fn workflow_variable_resolves_typed_value() {
        let wf = workflow();
        let mut variables = Map2::new();
        variables.insert(
            "greeting".to_string(),
            WorkflowVariable {
                name: "greeting".to_string(),
                var_type: crate::model::VariableType::String,
                value: serde_json::json!("hello"),
            },
        );
        let ctx = ExecutionContext::new("wf", Map2::new(), variables);
        let start = block("start", BlockType::Starter);
        let resolved = resolve_text(
            "<variable.greeting>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &start,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("hello".to_string()));
    }

    #[test]
    fn unknown_variable_left_as_literal() {
        let wf = workflow();
        let ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        let start = block("start", BlockType::Starter);
        let resolved = resolve_text(
            "<variable.missing>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &start,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("<variable.missing>".to_string()));
    }

    #[test]
    fn loop_current_item_resolves_from_items_and_iteration_counter() {
        let mut wf = workflow();
        wf.loops.insert(
            BlockId::new("loop1"),
            crate::model::LoopSpec {
                id: BlockId::new("loop1"),
                nodes: vec![BlockId::new("fn2")],
                iterations: None,
                loop_type: crate::model::LoopType::ForEach,
                for_each_items: None,
            },
        );
        let mut ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        ctx.loop_items.insert(
            ExecutionContext::items_key(&BlockId::new("loop1")),
            serde_json::json!(["a", "b", "c"]),
        );
        ctx.loop_iterations.insert(BlockId::new("loop1"), 2); // 2nd start => index 1
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let item = resolve_text("<loop.currentItem>", &wf, &ctx, &NoopEvaluator, &fn2, FormattingContext::Plain)
            .unwrap();
        assert_eq!(item, Value::String("b".to_string()));
        let index = resolve_text("<loop.index>", &wf, &ctx, &NoopEvaluator, &fn2, FormattingContext::Plain)
            .unwrap();
        assert_eq!(index, Value::from(1u32));
    }

    #[test]
    fn parallel_current_item_uses_virtual_block_iteration() {
        let mut wf = workflow();
        wf.parallels.insert(
            BlockId::new("par1"),
            crate::model::ParallelSpec {
                id: BlockId::new("par1"),
                nodes: vec![BlockId::new("fn2")],
                distribution: serde_json::json!(["x", "y"]),
            },
        );
        let mut ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        ctx.loop_items.insert(
            ExecutionContext::iteration_item_key(&BlockId::new("par1"), 1),
            serde_json::json!("y"),
        );
        ctx.current_virtual_block_id = Some(BlockId::new("fn2_parallel_par1_iteration_1"));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let item = resolve_text(
            "<parallel.currentItem>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(item, Value::String("y".to_string()));
    }

    #[test]
    fn virtual_block_routing_resolves_same_parallel_sibling_iteration_state() {
        let mut wf = workflow();
        wf.parallels.insert(
            BlockId::new("par1"),
            crate::model::ParallelSpec {
                id: BlockId::new("par1"),
                nodes: vec![BlockId::new("fn1"), BlockId::new("fn2")],
                distribution: serde_json::json!(["x", "y"]),
            },
        );
        let mut ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        ctx.block_states.insert(
            BlockId::new("fn1_parallel_par1_iteration_1"),
            BlockRuntimeState::success(serde_json::json!({"result": "iter1"}), 1),
        );
        ctx.current_virtual_block_id = Some(BlockId::new("fn2_parallel_par1_iteration_1"));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let resolved = resolve_text(
            "<fn1.result>",
            &wf,
            &ctx,
            &NoopEvaluator,
            &fn2,
            FormattingContext::Plain,
        )
        .unwrap();
        assert_eq!(resolved, Value::String("iter1".to_string()));
    }

    #[test]
    fn param_coercion_parses_numbers_and_booleans() {
        let wf = workflow();
        let ctx = ExecutionContext::new("wf", Map2::new(), Map2::new());
        let start = block("start", BlockType::Starter);
        let mut params = Map::new();
        params.insert("count".to_string(), Value::String("42".to_string()));
        params.insert("enabled".to_string(), Value::String("true".to_string()));
        let mut types = Map2::new();
        types.insert("count".to_string(), ParamType::Number);
        types.insert("enabled".to_string(), ParamType::Boolean);
        let resolved = resolve_params(
            &wf,
            &ctx,
            &NoopEvaluator,
            &start,
            &[],
            &types,
            FormattingContext::Plain,
            &params,
        )
        .unwrap();
        assert_eq!(resolved.get("count"), Some(&Value::from(42.0)));
        assert_eq!(resolved.get("enabled"), Some(&Value::Bool(true)));
    }

    #[test]
    fn table_shaped_array_resolves_each_cell() {
        let wf = workflow();
        let ctx = ctx_with(serde_json::json!({"result": "hi"}));
        let fn2 = block("fn2", BlockType::Custom("function".into()));
        let table = serde_json::json!([
            {"cells": {"a": "<fn1.result>", "b": "plain"}}
        ]);
        let resolved = resolve_value(&table, &wf, &ctx, &NoopEvaluator, &fn2, FormattingContext::Plain).unwrap();
        assert_eq!(resolved[0]["cells"]["a"], Value::String("hi".to_string()));
        assert_eq!(resolved[0]["cells"]["b"], Value::String("plain".to_string()));
    }
}
