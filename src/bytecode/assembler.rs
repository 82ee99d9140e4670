//! Label based construction of method bytecode.
//!
//! [`MethodAssembler`] lays instructions out one after another, assigns offsets and patches
//! jumps and exception ranges that refer to labels once every label is known.
//!
//! # Examples
//!
//! ```rust
//! use irscope::bytecode::{MethodAssembler, Opcode};
//!
//! // r0 = 10; do { r0 -= 1 } while (r0 != 0); return r0
//! let code = MethodAssembler::new()
//!     .movi(0, 10)
//!     .label("loop")
//!     .lda(0)
//!     .emit_imm(Opcode::Subi, &[], 1)
//!     .sta(0)
//!     .jump(Opcode::Jnez, &[], "loop")
//!     .lda(0)
//!     .ret()
//!     .finish()?;
//!
//! assert_eq!(code.instructions().len(), 7);
//! # Ok::<(), irscope::Error>(())
//! ```

use rustc_hash::FxHashMap;

use crate::{
    bytecode::{BytecodeInstruction, CatchBlock, MethodCode, Opcode, TryBlock},
    Error, Result,
};

/// A jump whose offset is resolved in [`MethodAssembler::finish`].
#[derive(Debug, Clone)]
struct LabelFixup {
    /// Target label
    label: String,
    /// Index of the jump instruction
    instruction: usize,
}

/// A try block whose bounds and handlers are still labels.
#[derive(Debug, Clone)]
struct PendingTry {
    start: String,
    end: String,
    catches: Vec<(String, Option<u32>)>,
}

/// Builder for [`MethodCode`].
///
/// Every method consumes and returns the assembler so programs read top to bottom. Errors
/// such as a label defined twice are recorded and reported by [`MethodAssembler::finish`].
#[derive(Debug, Default)]
pub struct MethodAssembler {
    instructions: Vec<BytecodeInstruction>,
    labels: FxHashMap<String, usize>,
    fixups: Vec<LabelFixup>,
    try_blocks: Vec<PendingTry>,
    error: Option<Error>,
}

impl MethodAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `name` at the current position.
    #[must_use]
    pub fn label(mut self, name: &str) -> Self {
        if self.labels.contains_key(name) {
            self.fail(malformed_error!("label '{}' is defined twice", name));
        } else {
            self.labels.insert(name.to_string(), self.instructions.len());
        }
        self
    }

    /// Appends an instruction with register operands only.
    #[must_use]
    pub fn emit(self, opcode: Opcode, vregs: &[u16]) -> Self {
        self.push(opcode, vregs, None, None)
    }

    /// Appends an instruction with an immediate.
    #[must_use]
    pub fn emit_imm(self, opcode: Opcode, vregs: &[u16], imm: i64) -> Self {
        self.push(opcode, vregs, Some(imm), None)
    }

    /// Appends an instruction referring to a method, field, type, string or literal array.
    #[must_use]
    pub fn emit_id(self, opcode: Opcode, vregs: &[u16], id: u32) -> Self {
        self.push(opcode, vregs, None, Some(id))
    }

    /// Appends an instruction with both an id and an immediate, like `call.acc`.
    #[must_use]
    pub fn emit_id_imm(self, opcode: Opcode, vregs: &[u16], id: u32, imm: i64) -> Self {
        self.push(opcode, vregs, Some(imm), Some(id))
    }

    /// Appends a jump to `label`.
    #[must_use]
    pub fn jump(mut self, opcode: Opcode, vregs: &[u16], label: &str) -> Self {
        if !opcode.is_jump() {
            self.fail(malformed_error!("{} is not a jump", opcode));
            return self;
        }
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            instruction: self.instructions.len(),
        });
        let mut assembler = self.push(opcode, vregs, None, None);
        if let Some(last) = assembler.instructions.last_mut() {
            last.offset = Some(0);
        }
        assembler
    }

    /// Protects the range `[start, end)` with handlers given as `(label, type id)` pairs.
    #[must_use]
    pub fn try_block(mut self, start: &str, end: &str, catches: &[(&str, Option<u32>)]) -> Self {
        self.try_blocks.push(PendingTry {
            start: start.to_string(),
            end: end.to_string(),
            catches: catches
                .iter()
                .map(|&(label, type_id)| (label.to_string(), type_id))
                .collect(),
        });
        self
    }

    /// `movi vd, imm`
    #[must_use]
    pub fn movi(self, vd: u16, imm: i64) -> Self {
        self.emit_imm(Opcode::Movi, &[vd], imm)
    }

    /// `mov vd, vs`
    #[must_use]
    pub fn mov(self, vd: u16, vs: u16) -> Self {
        self.emit(Opcode::Mov, &[vd, vs])
    }

    /// `lda vs`
    #[must_use]
    pub fn lda(self, vs: u16) -> Self {
        self.emit(Opcode::Lda, &[vs])
    }

    /// `ldai imm`
    #[must_use]
    pub fn ldai(self, imm: i64) -> Self {
        self.emit_imm(Opcode::Ldai, &[], imm)
    }

    /// `sta vd`
    #[must_use]
    pub fn sta(self, vd: u16) -> Self {
        self.emit(Opcode::Sta, &[vd])
    }

    /// `call id, vregs`
    #[must_use]
    pub fn call(self, method_id: u32, vregs: &[u16]) -> Self {
        self.emit_id(Opcode::Call, vregs, method_id)
    }

    /// `jmp label`
    #[must_use]
    pub fn jmp(self, label: &str) -> Self {
        self.jump(Opcode::Jmp, &[], label)
    }

    /// `return`
    #[must_use]
    pub fn ret(self) -> Self {
        self.emit(Opcode::Return, &[])
    }

    /// `return.void`
    #[must_use]
    pub fn ret_void(self) -> Self {
        self.emit(Opcode::ReturnVoid, &[])
    }

    /// Resolves labels and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for labels defined twice or never defined, and for any
    /// violation reported by [`MethodCode::new`].
    pub fn finish(self) -> Result<MethodCode> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut instructions = self.instructions;
        let end_pc = instructions.last().map_or(0, BytecodeInstruction::next_pc);
        let label_pc = |name: &str| -> Result<u32> {
            let index = *self
                .labels
                .get(name)
                .ok_or_else(|| malformed_error!("undefined label '{}'", name))?;
            Ok(instructions.get(index).map_or(end_pc, |inst| inst.pc))
        };

        let mut offsets = Vec::with_capacity(self.fixups.len());
        for fixup in &self.fixups {
            let target = label_pc(&fixup.label)?;
            let pc = instructions[fixup.instruction].pc;
            let offset = i64::from(target) - i64::from(pc);
            let offset = i32::try_from(offset)
                .map_err(|_| malformed_error!("jump to '{}' is out of range", fixup.label))?;
            offsets.push((fixup.instruction, offset));
        }

        let mut try_blocks = Vec::with_capacity(self.try_blocks.len());
        for pending in &self.try_blocks {
            let mut catches = Vec::with_capacity(pending.catches.len());
            for (label, type_id) in &pending.catches {
                catches.push(CatchBlock {
                    handler_pc: label_pc(label)?,
                    type_id: *type_id,
                });
            }
            try_blocks.push(TryBlock {
                start_pc: label_pc(&pending.start)?,
                end_pc: label_pc(&pending.end)?,
                catches,
            });
        }

        for (index, offset) in offsets {
            instructions[index].offset = Some(offset);
        }
        MethodCode::new(instructions, try_blocks)
    }

    fn push(mut self, opcode: Opcode, vregs: &[u16], imm: Option<i64>, id: Option<u32>) -> Self {
        let pc = self
            .instructions
            .last()
            .map_or(0, BytecodeInstruction::next_pc);
        let size = encoded_size(opcode, vregs, imm, id);
        self.instructions.push(BytecodeInstruction {
            pc,
            size,
            opcode,
            vregs: vregs.to_vec(),
            imm,
            id,
            offset: None,
        });
        self
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Size of the encoding: one opcode byte, one byte per register (two for wide
/// registers), four or eight immediate bytes, two id bytes and two offset bytes.
fn encoded_size(opcode: Opcode, vregs: &[u16], imm: Option<i64>, id: Option<u32>) -> u32 {
    let registers: u32 = vregs.iter().map(|&v| if v > 0xff { 2 } else { 1 }).sum();
    let immediate = match imm {
        Some(_) if opcode.has_wide_immediate() => 8,
        Some(_) => 4,
        None => 0,
    };
    let id = if id.is_some() { 2 } else { 0 };
    let offset = if opcode.is_jump() { 2 } else { 0 };
    1 + registers + immediate + id + offset
}
