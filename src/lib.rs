// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # irscope
//!
//! An incremental SSA IR builder for register/accumulator bytecode.
//!
//! `irscope` translates the bytecode of one method at a time into a control flow graph of
//! SSA instructions. Definitions of virtual registers and of the accumulator are tracked
//! per basic block while the blocks are visited in reverse postorder; phis are created at
//! merge points and loop headers and resolved once the whole graph exists. Calls, field
//! accesses and class loads that cannot be resolved at compile time are expressed as
//! runtime-resolution instruction pairs backed by a shared table of slots.
//!
//! ## Features
//!
//! - **Single pass construction** - one reverse postorder walk, no separate SSA renaming
//! - **Deoptimization support** - save states capture every live virtual register
//! - **Exception flow** - try/catch ranges become try-begin and catch-begin blocks with catch-phis
//! - **Phi resolution** - typing, save-state pruning and dead-phi removal in one finishing pass
//! - **Parallel builds** - many methods at once with [`builder::build_graphs`]
//!
//! ## Quick Start
//!
//! ```rust
//! use irscope::prelude::*;
//!
//! let mut runtime = StaticRuntime::new();
//! let method = runtime.add_method(
//!     0,
//!     MethodDesc::new("add", &[DataType::Int32, DataType::Int32], DataType::Int32),
//! );
//! let code = MethodAssembler::new()
//!     .lda(0)
//!     .emit(BytecodeOpcode::Add2, &[1])
//!     .ret()
//!     .finish()?;
//!
//! let graph = IrBuilder::new(&runtime, method, &code).build()?;
//! println!("{graph}");
//! # Ok::<(), irscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`bytecode`] - Bytecode instructions, method bodies and an assembler for building them
//! - [`runtime`] - The queries the builder asks about methods, fields and classes
//! - [`ir`] - The SSA graph: instructions, blocks, loops and verification
//! - [`builder`] - Graph construction and phi resolution
//! - [`utils`] - Generic graph algorithms
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Building a graph either succeeds completely or returns an [`Error`]:
//!
//! ```rust
//! use irscope::{prelude::*, Error};
//!
//! let mut runtime = StaticRuntime::new();
//! let method = runtime.add_method(0, MethodDesc::new("f", &[], DataType::Int32).registers(1));
//! let code = MethodAssembler::new().lda(0).ret().finish()?;
//!
//! match IrBuilder::new(&runtime, method, &code).build() {
//!     Err(Error::UndefinedRegister { vreg, .. }) => assert_eq!(vreg, 0),
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! # Ok::<(), irscope::Error>(())
//! ```
#[macro_use]
pub(crate) mod error;

pub mod builder;
pub mod bytecode;
pub mod ir;
pub mod prelude;
pub mod runtime;
pub mod utils;

#[cfg(test)]
pub(crate) mod test;

/// `irscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `irscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
