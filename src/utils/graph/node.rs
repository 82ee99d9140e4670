//! Block identifiers.

use std::fmt;

/// Index of a basic block in a [`Graph`](crate::ir::Graph), or of a node in any graph
/// the [`algorithms`](super::algorithms) run on.
///
/// Blocks are numbered from zero in creation order and keep their number when they
/// become unreachable.
///
/// ```rust
/// use irscope::utils::graph::NodeId;
///
/// let bb = NodeId::new(3);
/// assert_eq!(bb.index(), 3);
/// assert_eq!(bb.to_string(), "bb3");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Wraps a raw block index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Position of the block in per-block tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}
