//! The bytecode of one method together with its exception table.

use rustc_hash::FxHashSet;

use crate::{bytecode::BytecodeInstruction, Result};

/// One `catch` clause of a try block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchBlock {
    /// Offset of the first handler instruction
    pub handler_pc: u32,
    /// Type id of the caught exception class, `None` for catch-all
    pub type_id: Option<u32>,
}

/// A protected range and its handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    /// First protected offset
    pub start_pc: u32,
    /// Offset right after the last protected instruction
    pub end_pc: u32,
    /// Handlers in declaration order
    pub catches: Vec<CatchBlock>,
}

impl TryBlock {
    /// Returns true if `pc` is inside the protected range.
    #[must_use]
    pub fn contains(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

/// Validated bytecode of a method.
///
/// Instructions are contiguous and sorted by offset, every jump target and every try
/// boundary falls on an instruction boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCode {
    instructions: Vec<BytecodeInstruction>,
    try_blocks: Vec<TryBlock>,
    size: u32,
}

impl MethodCode {
    /// Validates and wraps decoded instructions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if instructions overlap or leave gaps, if a jump
    /// leaves the method or lands inside an instruction, or if a try block or handler does
    /// not start on an instruction boundary.
    pub fn new(instructions: Vec<BytecodeInstruction>, try_blocks: Vec<TryBlock>) -> Result<Self> {
        let mut expected = 0u32;
        for inst in &instructions {
            if inst.pc != expected {
                return Err(malformed_error!(
                    "instruction {} expected at {:#x}",
                    inst,
                    expected
                ));
            }
            if inst.size == 0 {
                return Err(malformed_error!("instruction {} has no size", inst));
            }
            expected = inst.next_pc();
        }
        let size = expected;
        let boundaries: FxHashSet<u32> = instructions.iter().map(|inst| inst.pc).collect();

        for inst in instructions.iter().filter(|inst| inst.opcode.is_jump()) {
            match inst.jump_target() {
                Some(target) if boundaries.contains(&target) => {}
                _ => return Err(malformed_error!("invalid jump target of {}", inst)),
            }
        }

        for (index, try_block) in try_blocks.iter().enumerate() {
            if try_block.start_pc >= try_block.end_pc
                || !boundaries.contains(&try_block.start_pc)
                || (try_block.end_pc != size && !boundaries.contains(&try_block.end_pc))
            {
                return Err(malformed_error!(
                    "try block {} has an invalid range [{:#x}, {:#x})",
                    index,
                    try_block.start_pc,
                    try_block.end_pc
                ));
            }
            if try_block.catches.is_empty() {
                return Err(malformed_error!("try block {} has no handler", index));
            }
            if let Some(catch) = try_block
                .catches
                .iter()
                .find(|catch| !boundaries.contains(&catch.handler_pc))
            {
                return Err(malformed_error!(
                    "handler of try block {} starts inside an instruction at {:#x}",
                    index,
                    catch.handler_pc
                ));
            }
        }

        Ok(MethodCode {
            instructions,
            try_blocks,
            size,
        })
    }

    /// Instructions in offset order.
    #[must_use]
    pub fn instructions(&self) -> &[BytecodeInstruction] {
        &self.instructions
    }

    /// The exception table.
    #[must_use]
    pub fn try_blocks(&self) -> &[TryBlock] {
        &self.try_blocks
    }

    /// Size of the bytecode in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Index of the instruction starting at `pc`.
    #[must_use]
    pub fn index_of(&self, pc: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&pc, |inst| inst.pc)
            .ok()
    }

    /// The instruction starting at `pc`.
    #[must_use]
    pub fn instruction_at(&self, pc: u32) -> Option<&BytecodeInstruction> {
        self.index_of(pc).map(|index| &self.instructions[index])
    }

    /// Instructions starting at `pc`, in offset order.
    pub fn iter_from(&self, pc: u32) -> impl Iterator<Item = &BytecodeInstruction> {
        let start = self.index_of(pc).unwrap_or(self.instructions.len());
        self.instructions[start..].iter()
    }

    /// Try blocks whose protected range contains `pc`.
    pub fn try_blocks_at(&self, pc: u32) -> impl Iterator<Item = (usize, &TryBlock)> {
        self.try_blocks
            .iter()
            .enumerate()
            .filter(move |(_, try_block)| try_block.contains(pc))
    }
}
