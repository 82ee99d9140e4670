//! Dominance.
//!
//! Block `d` dominates block `n` when no path from the entry reaches `n` without passing
//! through `d`. Each block other than the entry has one immediate dominator, the closest
//! of its strict dominators; linking every block to it forms the dominator tree.
//!
//! The tree is computed with the iterative scheme of Cooper, Harvey and Kennedy: walk
//! the blocks in reverse postorder, set each immediate dominator to the common ancestor
//! of its already processed predecessors, and repeat until nothing changes. Bytecode
//! graphs are small and mostly reducible, so two or three sweeps are typical.

use crate::utils::graph::{
    algorithms::traversal::reverse_postorder, NodeId, Predecessors, RootedGraph, Successors,
};

/// Immediate dominators of every block reachable from an entry.
///
/// Blocks the entry cannot reach have no immediate dominator; such a block dominates
/// only itself.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// Root of the tree.
    #[inline]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Parent of `node` in the tree, `None` for the entry and for unreachable blocks.
    #[inline]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Whether `a` is `b` or one of its ancestors in the tree.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        let mut current = Some(b);
        while let Some(node) = current {
            if node == a {
                return true;
            }
            current = self.immediate_dominator(node);
        }
        false
    }
}

/// Builds the dominator tree of the blocks reachable from `entry`.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let mut idom: Vec<Option<NodeId>> = vec![None; graph.node_count()];
    if entry.index() >= idom.len() {
        return DominatorTree { entry, idom };
    }

    let rpo = reverse_postorder(graph, entry);
    let mut order = vec![usize::MAX; idom.len()];
    for (number, node) in rpo.iter().enumerate() {
        order[node.index()] = number;
    }

    // Self-loop on the entry stops the ancestor walk in common_dominator
    idom[entry.index()] = Some(entry);

    loop {
        let mut changed = false;
        for &node in &rpo[1..] {
            let candidate = graph
                .predecessors(node)
                .filter(|pred| idom[pred.index()].is_some())
                .reduce(|acc, pred| common_dominator(&idom, &order, acc, pred));
            if candidate.is_some() && candidate != idom[node.index()] {
                idom[node.index()] = candidate;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    idom[entry.index()] = None;
    DominatorTree { entry, idom }
}

/// Builds the dominator tree rooted at the graph's own entry.
pub fn compute_dominators_rooted<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    compute_dominators(graph, graph.entry())
}

/// Nearest common ancestor of `a` and `b` in the partially built tree.
fn common_dominator(
    idom: &[Option<NodeId>],
    order: &[usize],
    mut a: NodeId,
    mut b: NodeId,
) -> NodeId {
    while a != b {
        if order[a.index()] > order[b.index()] {
            match idom[a.index()] {
                Some(up) => a = up,
                None => return b,
            }
        } else {
            match idom[b.index()] {
                Some(up) => b = up,
                None => return a,
            }
        }
    }
    a
}
