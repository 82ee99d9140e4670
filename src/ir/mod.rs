//! The SSA intermediate representation produced by the builder.
//!
//! A [`Graph`] is a control flow graph of [`BasicBlock`]s holding [`Inst`]s. Values are
//! referenced by [`InstId`]; both directions of every def-use edge are recorded, as
//! [`Input`]s on the consumer and [`User`]s on the producer.
//!
//! # Key Components
//!
//! - [`Graph`] - Instruction arena, blocks and the analyses computed over them
//! - [`Inst`] / [`InstData`] - Instructions and their opcode specific payload
//! - [`BasicBlock`] - Blocks with separate phi and instruction lists
//! - [`LoopForest`] - Natural loops with pre-headers and post-exits
//! - [`GraphChecker`] - Structural verification of a finished graph
//!
//! # Examples
//!
//! ```rust
//! use irscope::{ir::{DataType, Graph, GraphMode}, runtime::MethodPtr};
//!
//! let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
//! let zero = graph.find_or_create_int(0);
//! assert_eq!(graph.inst(zero).ty(), Some(DataType::Int64));
//! assert_eq!(graph.find_or_create_int(0), zero);
//! ```

mod block;
mod checker;
mod dump;
mod graph;
mod inst;
mod loops;
mod opcode;
mod types;

pub use block::{BasicBlock, BlockFlags};
pub use checker::GraphChecker;
pub use graph::{Graph, GraphMode};
pub use inst::{
    ConstValue, EnvSlot, Input, Inst, InstData, InstFlags, InstId, User, VRegKind,
    VirtualRegister,
};
pub use loops::{LoopExit, LoopForest, LoopInfo};
pub use opcode::Opcode;
pub use types::{ConditionCode, DataType};
