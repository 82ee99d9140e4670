//! A decoded bytecode instruction.

use std::fmt;

use crate::{
    bytecode::{BytecodeFlags, Opcode},
    Result,
};

/// One bytecode instruction with its operands.
///
/// Operands are kept in decoded form: register numbers, an immediate, a symbol id (method,
/// field, type, string or literal array, depending on the opcode) and the relative offset
/// of a jump. Floating point immediates hold the bit pattern of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeInstruction {
    /// Offset of the instruction in the method bytecode
    pub pc: u32,
    /// Encoded size in bytes
    pub size: u32,
    /// Opcode
    pub opcode: Opcode,
    /// Register operands
    pub vregs: Vec<u16>,
    /// Immediate operand
    pub imm: Option<i64>,
    /// Symbol id operand
    pub id: Option<u32>,
    /// Jump offset relative to `pc`
    pub offset: Option<i32>,
}

impl BytecodeInstruction {
    /// Offset of the following instruction.
    #[must_use]
    pub fn next_pc(&self) -> u32 {
        self.pc + self.size
    }

    /// Static properties of the opcode.
    #[must_use]
    pub fn flags(&self) -> BytecodeFlags {
        self.opcode.flags()
    }

    /// Register operand `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the operand is missing.
    pub fn vreg(&self, index: usize) -> Result<usize> {
        self.vregs
            .get(index)
            .map(|&vreg| usize::from(vreg))
            .ok_or_else(|| {
                malformed_error!("{} at {:#x} has no register operand {}", self.opcode, self.pc, index)
            })
    }

    /// The immediate operand.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the operand is missing.
    pub fn imm(&self) -> Result<i64> {
        self.imm
            .ok_or_else(|| malformed_error!("{} at {:#x} has no immediate", self.opcode, self.pc))
    }

    /// The symbol id operand.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the operand is missing.
    pub fn id(&self) -> Result<u32> {
        self.id
            .ok_or_else(|| malformed_error!("{} at {:#x} has no id operand", self.opcode, self.pc))
    }

    /// Absolute target of a jump.
    #[must_use]
    pub fn jump_target(&self) -> Option<u32> {
        let offset = self.offset?;
        self.pc.checked_add_signed(offset)
    }
}

impl fmt::Display for BytecodeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: {}", self.pc, self.opcode)?;
        let mut separator = " ";
        for vreg in &self.vregs {
            write!(f, "{separator}v{vreg}")?;
            separator = ", ";
        }
        if let Some(id) = self.id {
            write!(f, "{separator}id{id}")?;
            separator = ", ";
        }
        if let Some(imm) = self.imm {
            write!(f, "{separator}{imm:#x}")?;
            separator = ", ";
        }
        if let Some(target) = self.jump_target() {
            write!(f, "{separator}-> {target:#x}")?;
        }
        Ok(())
    }
}
