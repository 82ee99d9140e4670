//! Input bytecode of the builder.
//!
//! Methods are sequences of [`BytecodeInstruction`]s over a register file plus an implicit
//! accumulator, with an exception table of [`TryBlock`]s. Decoding a binary format is left
//! to the embedder; [`MethodCode::new`] validates what it produces, and [`MethodAssembler`]
//! builds methods from a symbolic listing.
//!
//! # Key Components
//!
//! - [`Opcode`] / [`BytecodeFlags`] - The instruction set and its control flow properties
//! - [`BytecodeInstruction`] - One decoded instruction
//! - [`MethodCode`] - Validated method body with its exception table
//! - [`MethodAssembler`] - Label based construction of method bodies

mod assembler;
mod instruction;
mod method;
mod opcode;

pub use assembler::MethodAssembler;
pub use instruction::BytecodeInstruction;
pub use method::{CatchBlock, MethodCode, TryBlock};
pub use opcode::{BytecodeFlags, Opcode};
