//! Depth-first block orders.
//!
//! Successors are followed in edge order, so both orders are stable for a given graph.

use crate::utils::graph::{NodeId, Successors};

/// Blocks reachable from `start`, each listed after everything it reaches first.
///
/// Returns an empty order when `start` is not a node of `graph`.
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let count = graph.node_count();
    if start.index() >= count {
        return Vec::new();
    }

    let mut seen = vec![false; count];
    let mut order = Vec::with_capacity(count);
    // Each frame holds a block and the successors it has left to explore
    let mut frames: Vec<(NodeId, std::vec::IntoIter<NodeId>)> = Vec::new();

    seen[start.index()] = true;
    frames.push((start, successors_of(graph, start)));
    while let Some((block, pending)) = frames.last_mut() {
        match pending.find(|succ| !seen[succ.index()]) {
            Some(next) => {
                seen[next.index()] = true;
                frames.push((next, successors_of(graph, next)));
            }
            None => {
                order.push(*block);
                frames.pop();
            }
        }
    }
    order
}

/// Blocks reachable from `start`, each ahead of its successors except across back edges.
///
/// This is the order in which the builder visits blocks: a merge block comes after all of
/// its forward predecessors.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

fn successors_of<G: Successors>(graph: &G, block: NodeId) -> std::vec::IntoIter<NodeId> {
    graph.successors(block).collect::<Vec<_>>().into_iter()
}
