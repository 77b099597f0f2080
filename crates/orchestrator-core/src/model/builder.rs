//! Fluent builder for [`WorkflowDefinition`]: string block ids, loop/parallel
//! specs keyed by block, connections carrying an optional handle.

use std::collections::HashMap;

use serde_json::Value;

use super::workflow::{
    Block, BlockId, BlockType, Connection, LoopSpec, LoopType, ParallelSpec, WorkflowDefinition,
};

#[derive(Debug, Default)]
pub struct WorkflowDefinitionBuilder {
    id: String,
    version: u32,
    blocks: HashMap<BlockId, Block>,
    connections: Vec<Connection>,
    loops: HashMap<BlockId, LoopSpec>,
    parallels: HashMap<BlockId, ParallelSpec>,
}

impl WorkflowDefinitionBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            blocks: HashMap::new(),
            connections: Vec::new(),
            loops: HashMap::new(),
            parallels: HashMap::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn block(mut self, id: impl Into<BlockId>, block_type: BlockType, name: impl Into<String>) -> Self {
        let id = id.into();
        self.blocks.insert(
            id.clone(),
            Block {
                id,
                block_type,
                name: name.into(),
                config: Value::Null,
                enabled: true,
            },
        );
        self
    }

    /// Same as [`Self::block`], additionally attaching a config payload.
    pub fn block_with_config(
        mut self,
        id: impl Into<BlockId>,
        block_type: BlockType,
        name: impl Into<String>,
        config: Value,
    ) -> Self {
        let id = id.into();
        self.blocks.insert(
            id.clone(),
            Block {
                id,
                block_type,
                name: name.into(),
                config,
                enabled: true,
            },
        );
        self
    }

    /// Disables the most recently added block with this id. Panics if it
    /// wasn't added first — intended for test/demo fixtures, not a loader.
    pub fn disabled(mut self, id: impl Into<BlockId>) -> Self {
        let id = id.into();
        let block = self
            .blocks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("block {id} must be added before it can be disabled"));
        block.enabled = false;
        self
    }

    pub fn connect(mut self, source: impl Into<BlockId>, target: impl Into<BlockId>) -> Self {
        self.connections.push(Connection::new(source, target));
        self
    }

    pub fn connect_with_handle(
        mut self,
        source: impl Into<BlockId>,
        target: impl Into<BlockId>,
        handle: impl Into<String>,
    ) -> Self {
        self.connections.push(Connection::new(source, target).with_handle(handle));
        self
    }

    /// Registers a `for` loop over `iterations` rounds of `nodes`.
    pub fn for_loop(mut self, id: impl Into<BlockId>, nodes: Vec<BlockId>, iterations: u32) -> Self {
        let id = id.into();
        self.loops.insert(
            id.clone(),
            LoopSpec {
                id,
                nodes,
                iterations: Some(iterations),
                loop_type: LoopType::For,
                for_each_items: None,
            },
        );
        self
    }

    /// Registers a `forEach` loop over `nodes`, one iteration per element of
    /// `items` (a literal array/object or a string expression).
    pub fn for_each_loop(mut self, id: impl Into<BlockId>, nodes: Vec<BlockId>, items: Value) -> Self {
        let id = id.into();
        self.loops.insert(
            id.clone(),
            LoopSpec {
                id,
                nodes,
                iterations: None,
                loop_type: LoopType::ForEach,
                for_each_items: Some(items),
            },
        );
        self
    }

    pub fn parallel(mut self, id: impl Into<BlockId>, nodes: Vec<BlockId>, distribution: Value) -> Self {
        let id = id.into();
        self.parallels.insert(id.clone(), ParallelSpec { id, nodes, distribution });
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.id,
            version: self.version,
            blocks: self.blocks,
            connections: self.connections,
            loops: self.loops,
            parallels: self.parallels,
        }
    }
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_router_workflow_with_a_disabled_branch() {
        let wf = WorkflowDefinition::builder("wf")
            .block("start", BlockType::Starter, "Start")
            .block_with_config(
                "router",
                BlockType::Router,
                "Router",
                serde_json::json!({"target": "fn1"}),
            )
            .block("fn1", BlockType::Custom("function".into()), "Fn1")
            .block("fn2", BlockType::Custom("function".into()), "Fn2")
            .disabled("fn2")
            .connect("start", "router")
            .connect("router", "fn1")
            .connect("router", "fn2")
            .build();

        assert_eq!(wf.blocks.len(), 4);
        assert_eq!(wf.connections.len(), 3);
        assert!(wf.validate().is_ok());
        assert!(!wf.block(&BlockId::new("fn2")).unwrap().enabled);
    }

    #[test]
    fn builds_a_loop_and_a_parallel_section() {
        let wf = WorkflowDefinition::builder("wf")
            .block("start", BlockType::Starter, "Start")
            .block("loop1", BlockType::Loop, "Loop")
            .block("task", BlockType::Custom("function".into()), "Task")
            .block("par1", BlockType::Parallel, "Parallel")
            .block("ptask", BlockType::Custom("function".into()), "PTask")
            .connect("start", "loop1")
            .connect_with_handle("loop1", "task", "loop-start-source")
            .connect_with_handle("loop1", "par1", "loop-end-source")
            .connect_with_handle("par1", "ptask", "parallel-start-source")
            .for_loop("loop1", vec![BlockId::new("task")], 3)
            .parallel("par1", vec![BlockId::new("ptask")], serde_json::json!(["a", "b"]))
            .build();

        assert_eq!(wf.loops[&BlockId::new("loop1")].iterations, Some(3));
        assert_eq!(wf.parallels[&BlockId::new("par1")].distribution, serde_json::json!(["a", "b"]));
    }
}
