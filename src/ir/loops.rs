//! Loop analysis.
//!
//! Every retreating edge `latch -> header` found during a reverse postorder walk opens a
//! loop. The builder relies on three blocks around it:
//!
//! ```text
//!     [pre-header]       only predecessor of the header outside the loop
//!          |
//!     [header] <------+  dominates the body of a reducible loop
//!          |          |
//!     [body ...] -----+  latches jump back to the header
//!          |
//!     [post-exit]        only exit block, entered from the loop alone
//! ```
//!
//! A loop whose header does not dominate one of its latches is irreducible. It gets no
//! pre-header and no post-exit, and its header is treated like any other merge point.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::utils::graph::{
    algorithms::{reverse_postorder, DominatorTree},
    GraphBase, NodeId, Predecessors, Successors,
};

/// An edge from inside a loop to a block outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// Source of the edge, inside the loop
    pub from: NodeId,
    /// Target of the edge, outside the loop
    pub to: NodeId,
}

/// One loop of the graph.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// Target of the back edges
    pub header: NodeId,

    /// Blocks of the loop, header included
    pub body: FxHashSet<NodeId>,

    /// Sources of the back edges, in discovery order
    pub latches: Vec<NodeId>,

    /// The header's single predecessor outside the loop
    pub preheader: Option<NodeId>,

    /// Edges leaving the loop, ordered by source block
    pub exits: Vec<LoopExit>,

    /// The single exit block, if all its predecessors are in the loop
    pub post_exit: Option<NodeId>,

    /// Number of enclosing loops
    pub depth: usize,

    /// Header of the innermost enclosing loop
    pub parent: Option<NodeId>,

    /// Entered at more than one block
    pub irreducible: bool,
}

impl LoopInfo {
    /// A loop consisting of `header` alone.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        LoopInfo {
            header,
            body: std::iter::once(header).collect(),
            latches: Vec::new(),
            preheader: None,
            exits: Vec::new(),
            post_exit: None,
            depth: 0,
            parent: None,
            irreducible: false,
        }
    }

    /// Whether `block` belongs to the loop.
    #[must_use]
    pub fn contains(&self, block: NodeId) -> bool {
        self.body.contains(&block)
    }
}

/// All loops of a graph, ordered by header.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<LoopInfo>,
    by_header: FxHashMap<NodeId, usize>,
}

impl LoopForest {
    /// Number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Whether the graph has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loops, ordered by header.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Iterates over the loops, ordered by header.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter()
    }

    /// The loop whose header is `header`.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&LoopInfo> {
        self.by_header.get(&header).map(|&index| &self.loops[index])
    }

    /// Whether `block` is the pre-header of a reducible loop.
    #[must_use]
    pub fn is_preheader(&self, block: NodeId) -> bool {
        self.loops
            .iter()
            .any(|l| !l.irreducible && l.preheader == Some(block))
    }

    /// Whether `block` is the post-exit block of a reducible loop.
    #[must_use]
    pub fn is_post_exit(&self, block: NodeId) -> bool {
        self.loops
            .iter()
            .any(|l| !l.irreducible && l.post_exit == Some(block))
    }
}

/// Finds the loops reachable from the entry of `dominators`.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let rpo = reverse_postorder(graph, dominators.entry());
    let mut order = vec![usize::MAX; graph.node_count()];
    for (number, block) in rpo.iter().enumerate() {
        order[block.index()] = number;
    }

    let mut loops: Vec<LoopInfo> = Vec::new();
    let mut by_header: FxHashMap<NodeId, usize> = FxHashMap::default();
    for &latch in &rpo {
        for header in graph.successors(latch) {
            let reducible = dominators.dominates(header, latch);
            if !reducible && order[header.index()] > order[latch.index()] {
                continue;
            }

            let index = *by_header.entry(header).or_insert_with(|| {
                loops.push(LoopInfo::new(header));
                loops.len() - 1
            });
            let info = &mut loops[index];
            info.latches.push(latch);
            info.irreducible |= !reducible;

            let first = order[header.index()];
            collect_body(graph, info, latch, |block| {
                order[block.index()] != usize::MAX && order[block.index()] >= first
            });
        }
    }

    for info in &mut loops {
        find_preheader(graph, info);
        find_exits(graph, info);
    }
    nest(&mut loops);

    loops.sort_by_key(|l| l.header.index());
    let by_header = loops
        .iter()
        .enumerate()
        .map(|(index, l)| (l.header, index))
        .collect();
    LoopForest { loops, by_header }
}

/// Adds every block reaching `latch` without crossing the header.
///
/// `in_scope` bounds the walk for irreducible loops, whose header does not cut the paths
/// from the entry.
fn collect_body<G, F>(graph: &G, info: &mut LoopInfo, latch: NodeId, in_scope: F)
where
    G: Predecessors,
    F: Fn(NodeId) -> bool,
{
    let mut stack = vec![latch];
    while let Some(block) = stack.pop() {
        if !info.body.insert(block) {
            continue;
        }
        stack.extend(
            graph
                .predecessors(block)
                .filter(|&pred| !info.body.contains(&pred) && in_scope(pred)),
        );
    }
}

fn find_preheader<G: Predecessors>(graph: &G, info: &mut LoopInfo) {
    if info.irreducible {
        return;
    }
    let outside: Vec<NodeId> = graph
        .predecessors(info.header)
        .filter(|&pred| !info.contains(pred))
        .collect();
    info.preheader = match outside.as_slice() {
        [pred] => Some(*pred),
        _ => None,
    };
}

fn find_exits<G: Successors + Predecessors>(graph: &G, info: &mut LoopInfo) {
    let mut body: Vec<NodeId> = info.body.iter().copied().collect();
    body.sort();

    info.exits.clear();
    for from in body {
        for to in graph.successors(from) {
            if !info.contains(to) {
                info.exits.push(LoopExit { from, to });
            }
        }
    }

    let mut targets: Vec<NodeId> = info.exits.iter().map(|exit| exit.to).collect();
    targets.sort();
    targets.dedup();
    info.post_exit = match targets.as_slice() {
        [only] if !info.irreducible && graph.predecessors(*only).all(|p| info.contains(p)) => {
            Some(*only)
        }
        _ => None,
    };
}

/// Sets `parent` to the smallest other loop containing the header, then derives depths.
fn nest(loops: &mut [LoopInfo]) {
    let parents: Vec<Option<usize>> = (0..loops.len())
        .map(|inner| {
            (0..loops.len())
                .filter(|&outer| outer != inner && loops[outer].contains(loops[inner].header))
                .min_by_key(|&outer| loops[outer].body.len())
        })
        .collect();

    for inner in 0..loops.len() {
        loops[inner].parent = parents[inner].map(|outer| loops[outer].header);

        let mut depth = 0;
        let mut current = parents[inner];
        while let Some(outer) = current {
            depth += 1;
            if depth > loops.len() {
                break;
            }
            current = parents[outer];
        }
        loops[inner].depth = depth;
    }
}
