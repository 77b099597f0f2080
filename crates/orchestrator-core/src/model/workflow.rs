//! The static, immutable-during-a-run workflow definition.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A block identifier, unique within its owning workflow.
///
/// Backed by a string rather than an opaque handle: virtual identities for
/// parallel iterations are built by string concatenation (see
/// [`crate::virtual_id`]) and must round-trip through serialization formats
/// a loader hands the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Static classification used by [`crate::routing`] to decide activation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Regular,
    Routing,
    FlowControl,
}

/// Open-ended block type. `Custom` covers regular block kinds the engine
/// doesn't need to know the internals of (function, api, agent, response,
/// evaluator, ...) — their handlers live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Starter,
    Router,
    Condition,
    Loop,
    Parallel,
    /// Sub-workflow invocation block.
    Workflow,
    Custom(String),
}

impl BlockType {
    pub fn category(&self) -> BlockCategory {
        match self {
            BlockType::Starter | BlockType::Custom(_) => BlockCategory::Regular,
            BlockType::Router | BlockType::Condition => BlockCategory::Routing,
            BlockType::Loop | BlockType::Parallel | BlockType::Workflow => {
                BlockCategory::FlowControl
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Starter => "starter",
            BlockType::Router => "router",
            BlockType::Condition => "condition",
            BlockType::Loop => "loop",
            BlockType::Parallel => "parallel",
            BlockType::Workflow => "workflow",
            BlockType::Custom(s) => s.as_str(),
        }
    }
}

/// Trigger aliases resolvable through `<start.*>`-style block references.
pub const TRIGGER_ALIASES: &[&str] = &["start", "api", "chat", "manual"];

/// Default success handle.
pub const HANDLE_SOURCE: &str = "source";
/// Fires when the source block errored.
pub const HANDLE_ERROR: &str = "error";
/// Loop entry edge from the loop block into its interior.
pub const HANDLE_LOOP_START: &str = "loop-start-source";
/// Loop exit edge, activated by the LoopManager on completion.
pub const HANDLE_LOOP_END: &str = "loop-end-source";
/// Parallel entry edge from the parallel block into its interior.
pub const HANDLE_PARALLEL_START: &str = "parallel-start-source";
/// Parallel exit edge, activated by the ParallelManager on completion.
pub const HANDLE_PARALLEL_END: &str = "parallel-end-source";
/// Prefix for condition-branch handles (`condition-<conditionId>`).
pub const CONDITION_HANDLE_PREFIX: &str = "condition-";

pub fn condition_handle(condition_id: &str) -> String {
    format!("{CONDITION_HANDLE_PREFIX}{condition_id}")
}

pub fn parse_condition_handle(handle: &str) -> Option<&str> {
    handle.strip_prefix(CONDITION_HANDLE_PREFIX)
}

/// Normalize a block name for lookup: lowercase, whitespace stripped.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub block_type: BlockType,
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Block {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn category(&self) -> BlockCategory {
        self.block_type.category()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: BlockId,
    pub target: BlockId,
    #[serde(default, rename = "sourceHandle")]
    pub source_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<BlockId>, target: impl Into<BlockId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// The effective handle, defaulting to [`HANDLE_SOURCE`] when unset.
    pub fn handle(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(HANDLE_SOURCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    For,
    ForEach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSpec {
    pub id: BlockId,
    pub nodes: Vec<BlockId>,
    #[serde(default)]
    pub iterations: Option<u32>,
    pub loop_type: LoopType,
    /// A literal collection (array/object) or a string expression, evaluated
    /// per the two-phase `maxIterations` determination.
    #[serde(default)]
    pub for_each_items: Option<serde_json::Value>,
}

impl LoopSpec {
    pub fn default_for_iterations() -> u32 {
        5
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelSpec {
    pub id: BlockId,
    pub nodes: Vec<BlockId>,
    /// A literal collection or a string expression yielding one; one
    /// iteration runs per element.
    pub distribution: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub blocks: HashMap<BlockId, Block>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub loops: HashMap<BlockId, LoopSpec>,
    #[serde(default)]
    pub parallels: HashMap<BlockId, ParallelSpec>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum WorkflowValidationError {
    #[error("workflow must have exactly one enabled starter block, found {0}")]
    StarterCount(usize),
    #[error("starter block {0} must not have incoming connections")]
    StarterHasIncoming(BlockId),
    #[error("starter block {0} must have at least one outgoing connection")]
    StarterHasNoOutgoing(BlockId),
    #[error("connection references unknown block {0}")]
    DanglingConnection(BlockId),
    #[error("duplicate block id {0}")]
    DuplicateBlockId(BlockId),
    #[error("duplicate normalized block name {0:?}")]
    DuplicateBlockName(String),
    #[error("block {0} depends on disabled block {1} via a must-consume input")]
    DisabledDependency(BlockId, BlockId),
    #[error("loop {0} references unknown node {1}")]
    LoopReferencesUnknownNode(BlockId, BlockId),
    #[error("parallel {0} references unknown node {1}")]
    ParallelReferencesUnknownNode(BlockId, BlockId),
}

impl WorkflowDefinition {
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// The workflow's unique enabled starter block, if validation holds.
    pub fn starter(&self) -> Option<&Block> {
        self.blocks
            .values()
            .find(|b| b.enabled && matches!(b.block_type, BlockType::Starter))
    }

    pub fn find_by_name_or_alias(&self, reference: &str) -> Option<&Block> {
        let needle = normalize_name(reference);
        if TRIGGER_ALIASES.contains(&needle.as_str()) {
            if let Some(starter) = self.starter() {
                return Some(starter);
            }
        }
        if let Some(block) = self.blocks.get(&BlockId::new(reference)) {
            return Some(block);
        }
        self.blocks.values().find(|b| b.normalized_name() == needle)
    }

    pub fn loop_containing(&self, block_id: &BlockId) -> Option<&LoopSpec> {
        self.loops.values().find(|l| l.nodes.contains(block_id))
    }

    pub fn parallel_containing(&self, block_id: &BlockId) -> Option<&ParallelSpec> {
        self.parallels
            .values()
            .find(|p| p.nodes.contains(block_id))
    }

    /// Validates the invariants: exactly one enabled starter with no
    /// incoming edges and at least one outgoing edge (triggers excepted via
    /// zero-outgoing allowance), every connection endpoint resolves, no
    /// duplicate ids/names, every loop/parallel node exists.
    pub fn validate(&self) -> Result<(), WorkflowValidationError> {
        let starters: Vec<&Block> = self
            .blocks
            .values()
            .filter(|b| b.enabled && matches!(b.block_type, BlockType::Starter))
            .collect();
        if starters.len() != 1 {
            return Err(WorkflowValidationError::StarterCount(starters.len()));
        }
        let starter = starters[0];

        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for block in self.blocks.values() {
            if !seen_ids.insert(&block.id) {
                return Err(WorkflowValidationError::DuplicateBlockId(block.id.clone()));
            }
            if !seen_names.insert(block.normalized_name()) {
                return Err(WorkflowValidationError::DuplicateBlockName(
                    block.normalized_name(),
                ));
            }
        }

        for conn in &self.connections {
            if !self.blocks.contains_key(&conn.source) {
                return Err(WorkflowValidationError::DanglingConnection(
                    conn.source.clone(),
                ));
            }
            if !self.blocks.contains_key(&conn.target) {
                return Err(WorkflowValidationError::DanglingConnection(
                    conn.target.clone(),
                ));
            }
        }

        let starter_has_incoming = self.connections.iter().any(|c| c.target == starter.id);
        if starter_has_incoming {
            return Err(WorkflowValidationError::StarterHasIncoming(
                starter.id.clone(),
            ));
        }
        let starter_has_outgoing = self.connections.iter().any(|c| c.source == starter.id);
        if !starter_has_outgoing {
            return Err(WorkflowValidationError::StarterHasNoOutgoing(
                starter.id.clone(),
            ));
        }

        for (loop_id, spec) in &self.loops {
            for node in &spec.nodes {
                if !self.blocks.contains_key(node) {
                    return Err(WorkflowValidationError::LoopReferencesUnknownNode(
                        loop_id.clone(),
                        node.clone(),
                    ));
                }
            }
        }
        for (parallel_id, spec) in &self.parallels {
            for node in &spec.nodes {
                if !self.blocks.contains_key(node) {
                    return Err(WorkflowValidationError::ParallelReferencesUnknownNode(
                        parallel_id.clone(),
                        node.clone(),
                    ));
                }
            }
        }

        for conn in &self.connections {
            if let Some(target_block) = self.blocks.get(&conn.target)
                && !target_block.enabled
            {
                continue;
            }
            if let Some(source_block) = self.blocks.get(&conn.source)
                && !source_block.enabled
                && conn.handle() == HANDLE_SOURCE
            {
                return Err(WorkflowValidationError::DisabledDependency(
                    conn.target.clone(),
                    conn.source.clone(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, block_type: BlockType) -> Block {
        Block {
            id: BlockId::new(id),
            block_type,
            name: id.to_string(),
            config: serde_json::Value::Null,
            enabled: true,
        }
    }

    fn simple_workflow() -> WorkflowDefinition {
        let mut blocks = HashMap::new();
        blocks.insert(BlockId::new("start"), block("start", BlockType::Starter));
        blocks.insert(
            BlockId::new("fn1"),
            block("fn1", BlockType::Custom("function".into())),
        );
        WorkflowDefinition {
            id: "wf".into(),
            version: 1,
            blocks,
            connections: vec![Connection::new("start", "fn1")],
            loops: HashMap::new(),
            parallels: HashMap::new(),
        }
    }

    #[test]
    fn validates_a_simple_workflow() {
        assert!(simple_workflow().validate().is_ok());
    }

    #[test]
    fn rejects_missing_starter() {
        let mut wf = simple_workflow();
        wf.blocks.remove(&BlockId::new("start"));
        wf.connections.clear();
        assert!(matches!(
            wf.validate(),
            Err(WorkflowValidationError::StarterCount(0))
        ));
    }

    #[test]
    fn rejects_starter_with_incoming_edge() {
        let mut wf = simple_workflow();
        wf.connections.push(Connection::new("fn1", "start"));
        assert!(matches!(
            wf.validate(),
            Err(WorkflowValidationError::StarterHasIncoming(_))
        ));
    }

    #[test]
    fn rejects_dangling_connection() {
        let mut wf = simple_workflow();
        wf.connections.push(Connection::new("start", "ghost"));
        assert!(matches!(
            wf.validate(),
            Err(WorkflowValidationError::DanglingConnection(_))
        ));
    }

    #[test]
    fn normalizes_names_for_lookup() {
        let wf = simple_workflow();
        assert!(wf.find_by_name_or_alias("FN1").is_some());
        assert!(wf.find_by_name_or_alias("start").is_some());
    }

    #[test]
    fn condition_handle_round_trips() {
        let h = condition_handle("abc123");
        assert_eq!(parse_condition_handle(&h), Some("abc123"));
    }
}
