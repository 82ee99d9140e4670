//! Basic blocks of the IR graph.

use bitflags::bitflags;

use crate::{ir::InstId, utils::graph::NodeId};

bitflags! {
    /// Structural properties of a basic block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u16 {
        /// Entry block holding constants and parameters
        const START = 0x0001;
        /// Exit block every return and throw flows into
        const END = 0x0002;
        /// First block of an exception handler, holds the catch-phis
        const CATCH_BEGIN = 0x0004;
        /// Block only reachable through exception edges
        const CATCH = 0x0008;
        /// Block placed in front of a protected range
        const TRY_BEGIN = 0x0010;
        /// Block inside a protected range
        const TRY = 0x0020;
        /// Loop header entered by on-stack replacement
        const OSR_ENTRY = 0x0040;
        /// Pre-header inserted by loop analysis, holds no bytecode
        const LOOP_PREHEADER = 0x0080;
    }
}

/// A basic block.
///
/// Phis are kept apart from the other instructions; catch-phis are ordinary instructions at
/// the head of a catch-begin block. Predecessor order is significant: the i-th input of a
/// phi flows in along the edge from the i-th predecessor.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: NodeId,
    pub(crate) guest_pc: Option<u32>,
    pub(crate) bytecode_end: Option<u32>,
    pub(crate) preds: Vec<NodeId>,
    pub(crate) succs: Vec<NodeId>,
    pub(crate) phis: Vec<InstId>,
    pub(crate) insts: Vec<InstId>,
    pub(crate) flags: BlockFlags,
    pub(crate) try_id: Option<usize>,
}

impl BasicBlock {
    pub(crate) fn new(id: NodeId, guest_pc: Option<u32>) -> Self {
        BasicBlock {
            id,
            guest_pc,
            bytecode_end: None,
            preds: Vec::new(),
            succs: Vec::new(),
            phis: Vec::new(),
            insts: Vec::new(),
            flags: BlockFlags::empty(),
            try_id: None,
        }
    }

    /// Block id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Bytecode offset the block starts at.
    #[must_use]
    pub fn guest_pc(&self) -> Option<u32> {
        self.guest_pc
    }

    /// Bytecode range `[start, end)` covered by the block, `None` for auxiliary blocks.
    #[must_use]
    pub fn bytecode_range(&self) -> Option<(u32, u32)> {
        match (self.guest_pc, self.bytecode_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Returns true for blocks that hold no bytecode of their own.
    #[must_use]
    pub fn is_auxiliary(&self) -> bool {
        self.bytecode_range().is_none()
    }

    /// Predecessors in edge order.
    #[must_use]
    pub fn preds(&self) -> &[NodeId] {
        &self.preds
    }

    /// Successors in edge order. For a conditional branch, the first successor is the
    /// taken target and the second the fall-through.
    #[must_use]
    pub fn succs(&self) -> &[NodeId] {
        &self.succs
    }

    /// Phi instructions.
    #[must_use]
    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    /// Non-phi instructions in program order.
    #[must_use]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Phis followed by the other instructions.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.phis.iter().chain(self.insts.iter()).copied()
    }

    /// Flags.
    #[must_use]
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// Index of the try block this block belongs to.
    #[must_use]
    pub fn try_id(&self) -> Option<usize> {
        self.try_id
    }

    /// Returns true for the entry block.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.flags.contains(BlockFlags::START)
    }

    /// Returns true for the exit block.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.flags.contains(BlockFlags::END)
    }

    /// Returns true for the first block of an exception handler.
    #[must_use]
    pub fn is_catch_begin(&self) -> bool {
        self.flags.contains(BlockFlags::CATCH_BEGIN)
    }

    /// Returns true for blocks only reachable by exception edges.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags.contains(BlockFlags::CATCH)
    }

    /// Returns true for blocks in front of a protected range.
    #[must_use]
    pub fn is_try_begin(&self) -> bool {
        self.flags.contains(BlockFlags::TRY_BEGIN)
    }

    /// Returns true for blocks inside a protected range.
    #[must_use]
    pub fn is_try(&self) -> bool {
        self.flags.contains(BlockFlags::TRY)
    }

    /// Returns true for blocks with no edges that are neither start nor end.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.preds.is_empty() && self.succs.is_empty() && !self.is_start() && !self.is_end()
    }

    /// Position of `pred` in the predecessor list.
    #[must_use]
    pub fn pred_index(&self, pred: NodeId) -> Option<usize> {
        self.preds.iter().position(|&p| p == pred)
    }
}
