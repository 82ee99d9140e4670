//! Graph algorithms used by the control flow analysis.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`reverse_postorder`] - Reverse postorder traversal (block visiting order of the builder)
//! - [`postorder`] - Postorder traversal
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Compute the dominator tree
//! - [`DominatorTree`] - Result of dominator computation
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Postorder/RPO | O(V + E) | Block ordering, SSA construction |
//! | Dominators | O(V + E) per sweep | Loop analysis, save-state pruning, phi checks |

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, compute_dominators_rooted, DominatorTree};
pub use traversal::{postorder, reverse_postorder};
