//! # irscope Prelude
//!
//! Re-exports of the types needed to build a graph. Bytecode and IR both have an opcode
//! enum; the bytecode one is exported as `BytecodeOpcode`.
//!
//! ```rust
//! use irscope::prelude::*;
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all irscope operations
pub use crate::Error;

/// The result type used throughout irscope
pub use crate::Result;

// ================================================================================================
// Graph Construction
// ================================================================================================

pub use crate::builder::{build_graphs, BuilderOptions, IrBuilder, PhiResolver};

// ================================================================================================
// Bytecode
// ================================================================================================

pub use crate::bytecode::{
    BytecodeInstruction, MethodAssembler, MethodCode, Opcode as BytecodeOpcode,
};

// ================================================================================================
// Intermediate Representation
// ================================================================================================

pub use crate::ir::{
    ConditionCode, DataType, Graph, GraphChecker, GraphMode, Inst, InstData, InstId, Opcode,
};

// ================================================================================================
// Runtime
// ================================================================================================

pub use crate::runtime::{
    FieldDesc, MethodDesc, MethodPtr, RuntimeInterface, SlotKind, StaticRuntime,
    UnresolvedTypes,
};
