//! Generic directed graph infrastructure.
//!
//! This module provides the strongly-typed [`NodeId`], the traits graph algorithms are
//! written against, and the [`algorithms`] themselves (traversal orders and dominators).
//! The concrete control flow graph lives in [`crate::ir::Graph`], which implements all of
//! the traits defined here.

pub mod algorithms;
mod node;
mod traits;

pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
