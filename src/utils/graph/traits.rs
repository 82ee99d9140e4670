//! Views of a directed graph used by the traversal, dominance and loop code.
//!
//! [`ir::Graph`](crate::ir::Graph) implements all of them; tests implement them for
//! small adjacency-list graphs.

use crate::utils::graph::NodeId;

/// Dense node numbering.
pub trait GraphBase {
    /// Number of nodes. Every index below it names a node, reachable or not.
    fn node_count(&self) -> usize;

    /// All nodes by ascending index.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Outgoing edges.
pub trait Successors: GraphBase {
    /// Targets of the edges leaving `node`, in insertion order.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Incoming edges.
pub trait Predecessors: GraphBase {
    /// Sources of the edges entering `node`, in insertion order.
    ///
    /// Phi input `i` belongs to predecessor `i`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a start node.
pub trait RootedGraph: Successors + Predecessors {
    /// The node every traversal starts from.
    fn entry(&self) -> NodeId;
}
