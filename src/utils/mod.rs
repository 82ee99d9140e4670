//! Shared utilities used by the IR and the builder.

pub mod graph;
