//! SSA graph construction from register/accumulator bytecode.
//!
//! The builder turns the bytecode of one method into an [`ir::Graph`](crate::ir::Graph) in a
//! single pass over its control flow graph, then hands the graph to the [`PhiResolver`].
//!
//! # Architecture
//!
//! - [`IrBuilder`] - Entry point: limit checks, block construction, the reverse postorder
//!   walk and the final fix-up
//! - `InstBuilder` - Per-block definition tables, phi insertion, save states and one
//!   constructor per bytecode instruction shape
//! - [`PhiResolver`] - Types, prunes and removes the phis the walk created
//! - [`BuilderOptions`] - Limits and switches of one build
//!
//! # Definitions
//!
//! Every block owns a table mapping each virtual register to the IR instruction currently
//! defining it. Registers come first, then arguments, then the accumulator, then (for
//! dynamic methods) the environment slots. On block entry the table is reconciled with the
//! predecessors:
//!
//! - catch-begin blocks start from their catch-phis
//! - reducible loop headers get a phi for every register live in the pre-header
//! - blocks with a single predecessor copy its table
//! - merge blocks get a phi wherever the predecessors disagree or one is not visited yet
//!
//! Phi inputs are filled in only after the walk, when every predecessor table is final.
//!
//! # Usage
//!
//! ```rust
//! use irscope::{
//!     builder::{BuilderOptions, IrBuilder},
//!     bytecode::{MethodAssembler, Opcode},
//!     ir::DataType,
//!     runtime::{MethodDesc, StaticRuntime},
//! };
//!
//! let mut runtime = StaticRuntime::new();
//! let method = runtime.add_method(
//!     0,
//!     MethodDesc::new("max", &[DataType::Int32, DataType::Int32], DataType::Int32),
//! );
//! let code = MethodAssembler::new()
//!     .lda(0)
//!     .jump(Opcode::Jge, &[1], "done")
//!     .lda(1)
//!     .label("done")
//!     .ret()
//!     .finish()?;
//!
//! let graph = IrBuilder::new(&runtime, method, &code)
//!     .options(BuilderOptions::default())
//!     .build()?;
//! assert!(graph.instructions().any(|inst| inst.is_phi()));
//! # Ok::<(), irscope::Error>(())
//! ```

mod arrays;
mod blocks;
mod calls;
mod dispatch;
mod inst_builder;
mod intrinsics;
mod ir_builder;
mod objects;
mod options;
mod phi_resolver;
mod scalar;

pub use ir_builder::IrBuilder;
pub use options::BuilderOptions;
pub use phi_resolver::PhiResolver;

use rayon::prelude::*;

use crate::{
    bytecode::MethodCode,
    ir::{Graph, GraphMode},
    runtime::{MethodPtr, RuntimeInterface},
    Result,
};

/// Builds the graphs of several methods in parallel.
///
/// Every method gets its own graph; the runtime is shared. Results are returned in the
/// order of `methods`, and one failing method does not affect the others.
pub fn build_graphs(
    runtime: &dyn RuntimeInterface,
    methods: &[(MethodPtr, &MethodCode)],
    options: BuilderOptions,
    mode: GraphMode,
) -> Vec<Result<Graph>> {
    methods
        .par_iter()
        .map(|&(method, code)| {
            IrBuilder::new(runtime, method, code)
                .options(options)
                .mode(mode)
                .build()
        })
        .collect()
}
