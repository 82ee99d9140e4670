//! Fixtures shared by the unit tests.

use std::ops::{Deref, DerefMut};

use crate::{
    builder::{BuilderOptions, IrBuilder},
    bytecode::MethodCode,
    ir::{DataType, Graph, GraphChecker, GraphMode, Inst, Opcode},
    runtime::{MethodDesc, MethodPtr, StaticRuntime},
    utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
    Result,
};

/// Adjacency-list graph rooted at node 0, for exercising the graph algorithms.
pub(crate) struct TestGraph {
    succs: Vec<Vec<NodeId>>,
    preds: Vec<Vec<NodeId>>,
}

impl TestGraph {
    pub(crate) fn new(nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut succs = vec![Vec::new(); nodes];
        let mut preds = vec![Vec::new(); nodes];
        for &(from, to) in edges {
            succs[from].push(NodeId::new(to));
            preds[to].push(NodeId::new(from));
        }
        TestGraph { succs, preds }
    }
}

impl GraphBase for TestGraph {
    fn node_count(&self) -> usize {
        self.succs.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.succs.len()).map(NodeId::new)
    }
}

impl Successors for TestGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.succs[node.index()].iter().copied()
    }
}

impl Predecessors for TestGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.preds[node.index()].iter().copied()
    }
}

impl RootedGraph for TestGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}

/// A [`StaticRuntime`] holding the method under test as method id 0.
pub(crate) struct TestRuntime {
    runtime: StaticRuntime,
    pub(crate) method: MethodPtr,
}

impl TestRuntime {
    /// A static method of class 0 without registers.
    pub(crate) fn with_method(args: &[DataType], ret: DataType) -> Self {
        Self::with_desc(MethodDesc::new("test", args, ret))
    }

    pub(crate) fn with_desc(desc: MethodDesc) -> Self {
        let mut runtime = StaticRuntime::new();
        let method = runtime.add_method(0, desc);
        TestRuntime { runtime, method }
    }
}

impl Deref for TestRuntime {
    type Target = StaticRuntime;

    fn deref(&self) -> &StaticRuntime {
        &self.runtime
    }
}

impl DerefMut for TestRuntime {
    fn deref_mut(&mut self) -> &mut StaticRuntime {
        &mut self.runtime
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds with the default options and verifies the result.
pub(crate) fn build(runtime: &TestRuntime, code: &MethodCode) -> Result<Graph> {
    build_with(runtime, code, BuilderOptions::default(), GraphMode::default())
}

pub(crate) fn build_with(
    runtime: &TestRuntime,
    code: &MethodCode,
    options: BuilderOptions,
    mode: GraphMode,
) -> Result<Graph> {
    init_logging();
    let graph = IrBuilder::new(&runtime.runtime, runtime.method, code)
        .options(options)
        .mode(mode)
        .build()?;
    GraphChecker::new(&graph).check()?;
    Ok(graph)
}

/// Opcodes of all placed instructions, block by block in reverse postorder.
pub(crate) fn opcodes(graph: &Graph) -> Vec<Opcode> {
    graph.instructions().map(Inst::opcode).collect()
}

/// First placed instruction with `opcode`.
pub(crate) fn find(graph: &Graph, opcode: Opcode) -> Option<&Inst> {
    graph.instructions().find(|inst| inst.opcode() == opcode)
}
