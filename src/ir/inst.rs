//! IR instructions and their operands.
//!
//! Instructions live in the arena of their [`Graph`](crate::ir::Graph) and refer to each
//! other by [`InstId`]. Every edge is stored twice: as an [`Input`] on the consumer and as a
//! [`User`] on the producer, and the graph keeps both sides in sync.

use std::fmt;

use bitflags::bitflags;

use crate::{
    ir::{ConditionCode, DataType, Opcode},
    runtime::{ClassPtr, FieldPtr, IntrinsicId, MethodPtr},
    utils::graph::NodeId,
};

/// Index of an instruction in the graph arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstId(pub(crate) usize);

impl InstId {
    /// Creates an id from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        InstId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstId({})", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Which kind of slot a save-state input stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VRegKind {
    /// A method register or argument
    Vreg,
    /// The accumulator
    Acc,
    /// One of the environment slots of a dynamic method
    Env(EnvSlot),
}

/// Environment slots of dynamic methods, in slot order after the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvSlot {
    /// The function object being executed
    ThisFunc,
    /// The constant pool of the function
    ConstPool,
    /// The lexical environment
    LexEnv,
}

impl EnvSlot {
    /// Number of environment slots of a dynamic method.
    pub const COUNT: usize = 3;

    /// Slot at position `index` after the accumulator.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<EnvSlot> {
        match index {
            0 => Some(EnvSlot::ThisFunc),
            1 => Some(EnvSlot::ConstPool),
            2 => Some(EnvSlot::LexEnv),
            _ => None,
        }
    }

    /// Position of this slot after the accumulator.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            EnvSlot::ThisFunc => 0,
            EnvSlot::ConstPool => 1,
            EnvSlot::LexEnv => 2,
        }
    }
}

/// The virtual register a save-state input was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualRegister {
    /// Index in the definition table
    pub index: usize,
    /// Kind of slot
    pub kind: VRegKind,
}

impl VirtualRegister {
    /// Largest register count a method may use.
    pub const MAX_NUM_VIRT_REGS: usize = u16::MAX as usize;

    /// Creates a register tag.
    #[must_use]
    pub const fn new(index: usize, kind: VRegKind) -> Self {
        VirtualRegister { index, kind }
    }

    /// Returns true for the accumulator slot.
    #[must_use]
    pub const fn is_acc(&self) -> bool {
        matches!(self.kind, VRegKind::Acc)
    }

    /// Returns true for environment slots.
    #[must_use]
    pub const fn is_env(&self) -> bool {
        matches!(self.kind, VRegKind::Env(_))
    }
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VRegKind::Vreg => write!(f, "vr{}", self.index),
            VRegKind::Acc => write!(f, "acc"),
            VRegKind::Env(slot) => write!(f, "env{}", slot.index()),
        }
    }
}

/// An operand of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    /// The producing instruction
    pub inst: InstId,
    /// Type the consumer reads the operand as, `None` when the consumer does not care
    pub ty: Option<DataType>,
    /// Register tag, only set on save-state inputs
    pub vreg: Option<VirtualRegister>,
}

/// A back reference from a producer to one operand slot of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct User {
    /// The consuming instruction
    pub inst: InstId,
    /// Operand index inside the consumer
    pub index: usize,
}

/// Value of a `Constant` instruction.
///
/// Floating point values are stored as their bit patterns so constants can be interned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// Integer literal, of any source width
    Int64(i64),
    /// Bits of an `f32`
    Float32(u32),
    /// Bits of an `f64`
    Float64(u64),
}

impl ConstValue {
    /// Creates a single precision constant.
    #[must_use]
    pub fn from_f32(value: f32) -> Self {
        ConstValue::Float32(value.to_bits())
    }

    /// Creates a double precision constant.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        ConstValue::Float64(value.to_bits())
    }

    /// Type of the constant instruction holding this value.
    #[must_use]
    pub const fn data_type(self) -> DataType {
        match self {
            ConstValue::Int64(_) => DataType::Int64,
            ConstValue::Float32(_) => DataType::Float32,
            ConstValue::Float64(_) => DataType::Float64,
        }
    }

    /// The raw 64-bit pattern of the value.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn raw_bits(self) -> u64 {
        match self {
            ConstValue::Int64(value) => value as u64,
            ConstValue::Float32(bits) => bits as u64,
            ConstValue::Float64(bits) => bits,
        }
    }

    /// The integer value, if this is an integer constant.
    #[must_use]
    pub const fn as_int(self) -> Option<i64> {
        match self {
            ConstValue::Int64(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConstValue::Int64(value) => write!(f, "{value:#x}"),
            ConstValue::Float32(bits) => write!(f, "{}", f32::from_bits(bits)),
            ConstValue::Float64(bits) => write!(f, "{}", f64::from_bits(bits)),
        }
    }
}

/// Opcode specific payload of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InstData {
    /// No payload
    None,
    /// Literal value of a `Constant`
    Constant(ConstValue),
    /// Position of a `Parameter` in the argument list
    Parameter {
        /// Argument index, `this` included
        arg_number: usize,
    },
    /// Register a `Phi` merges
    Phi {
        /// Virtual register index the phi was created for
        linear_number: usize,
    },
    /// A catch-phi and the throwing instructions its inputs came from
    CatchPhi {
        /// Set for the accumulator slot, which holds the thrown object
        is_acc: bool,
        /// Throwing instruction for every input, in input order
        throwables: Vec<InstId>,
    },
    /// Compared operands and condition
    Compare {
        /// Condition code
        cc: ConditionCode,
        /// Type of the compared operands
        operands: DataType,
    },
    /// Conditional branch on a zero comparison
    IfImm {
        /// Condition code
        cc: ConditionCode,
        /// Type of the compared operand
        operands: DataType,
        /// Immediate compared against
        imm: i64,
    },
    /// Operand type of a `Cast` or `Cmp`
    Operands(DataType),
    /// Call target
    Call {
        /// Method id in the caller's bytecode
        method_id: u32,
        /// Resolved method, if any
        method: Option<MethodPtr>,
    },
    /// Intrinsic kind of an `Intrinsic`
    Intrinsic(IntrinsicId),
    /// Accessed field
    Field {
        /// Field id in the caller's bytecode
        field_id: u32,
        /// Resolved field, if any
        field: Option<FieldPtr>,
        /// Volatile access
        volatile: bool,
    },
    /// Class or type operand
    Class {
        /// Type id in the caller's bytecode
        type_id: u32,
        /// Resolved class, if any
        class: Option<ClassPtr>,
    },
    /// String or literal array id
    Literal {
        /// Id in the caller's bytecode
        id: u32,
    },
    /// Array filled from a literal array
    ConstArray {
        /// Literal array id
        id: u32,
        /// Number of elements
        size: usize,
    },
    /// Enter or exit of a monitor
    Monitor {
        /// True for monitor enter
        entry: bool,
    },
}

bitflags! {
    /// Instruction properties that do not depend on the opcode alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstFlags: u8 {
        /// Never removed by dead code elimination, even without users
        const NO_DCE = 0x01;
        /// Reference store that requires a GC write barrier
        const NEEDS_BARRIER = 0x02;
        /// Save state of the on-stack-replacement entry of a loop
        const OSR_ENTRY = 0x04;
        /// Unsigned operation on its operands
        const UNSIGNED = 0x08;
    }
}

/// An IR instruction.
///
/// Fields are read through accessors; all mutation goes through [`Graph`](crate::ir::Graph)
/// so the input/user mirror stays consistent.
#[derive(Debug, Clone)]
pub struct Inst {
    pub(crate) id: InstId,
    pub(crate) opcode: Opcode,
    pub(crate) ty: Option<DataType>,
    pub(crate) pc: Option<u32>,
    pub(crate) block: Option<NodeId>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) users: Vec<User>,
    pub(crate) data: InstData,
    pub(crate) flags: InstFlags,
}

impl Inst {
    pub(crate) fn new(
        id: InstId,
        opcode: Opcode,
        ty: Option<DataType>,
        pc: Option<u32>,
        data: InstData,
    ) -> Self {
        Inst {
            id,
            opcode,
            ty,
            pc,
            block: None,
            inputs: Vec::new(),
            users: Vec::new(),
            data,
            flags: InstFlags::empty(),
        }
    }

    /// Arena id.
    #[must_use]
    pub fn id(&self) -> InstId {
        self.id
    }

    /// Opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Result type, `None` while not yet known.
    #[must_use]
    pub fn ty(&self) -> Option<DataType> {
        self.ty
    }

    /// Returns true once the result type is known.
    #[must_use]
    pub fn has_type(&self) -> bool {
        self.ty.is_some()
    }

    /// Bytecode offset the instruction was built for.
    #[must_use]
    pub fn pc(&self) -> Option<u32> {
        self.pc
    }

    /// Block the instruction is placed in, `None` when detached.
    #[must_use]
    pub fn block(&self) -> Option<NodeId> {
        self.block
    }

    /// Operands.
    #[must_use]
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Producer of operand `index`.
    #[must_use]
    pub fn input(&self, index: usize) -> Option<InstId> {
        self.inputs.get(index).map(|input| input.inst)
    }

    /// Back references of consumers.
    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Opcode specific payload.
    #[must_use]
    pub fn data(&self) -> &InstData {
        &self.data
    }

    /// Flags.
    #[must_use]
    pub fn flags(&self) -> InstFlags {
        self.flags
    }

    /// Returns true for `Phi`.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    /// Returns true for `CatchPhi`.
    #[must_use]
    pub fn is_catch_phi(&self) -> bool {
        self.opcode == Opcode::CatchPhi
    }

    /// Returns true for the catch-phi of the accumulator slot.
    #[must_use]
    pub fn is_acc_catch_phi(&self) -> bool {
        matches!(self.data, InstData::CatchPhi { is_acc: true, .. })
    }

    /// Returns true for every save-state flavour.
    #[must_use]
    pub fn is_save_state(&self) -> bool {
        self.opcode.is_save_state()
    }

    /// Returns true for `Constant`.
    #[must_use]
    pub fn is_const(&self) -> bool {
        self.opcode == Opcode::Constant
    }

    /// Value of a `Constant`.
    #[must_use]
    pub fn const_value(&self) -> Option<ConstValue> {
        match self.data {
            InstData::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Register of a `Phi`.
    #[must_use]
    pub fn linear_number(&self) -> Option<usize> {
        match self.data {
            InstData::Phi { linear_number } => Some(linear_number),
            _ => None,
        }
    }

    /// Type operand `index` is consumed as.
    ///
    /// Phis consume every input at their own type.
    #[must_use]
    pub fn input_type(&self, index: usize) -> Option<DataType> {
        if self.opcode.is_phi_like() {
            return self.ty;
        }
        self.inputs.get(index).and_then(|input| input.ty)
    }

    /// Register tag of save-state operand `index`.
    #[must_use]
    pub fn vreg(&self, index: usize) -> Option<VirtualRegister> {
        self.inputs.get(index).and_then(|input| input.vreg)
    }
}
