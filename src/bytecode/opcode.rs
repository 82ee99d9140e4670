//! Bytecode opcodes and their static properties.
//!
//! The instruction set is register based with an implicit accumulator: most arithmetic reads
//! the accumulator and one register and writes the accumulator back. Mnemonics follow the
//! usual conventions: a `.64` suffix selects 64-bit operands, `.obj` references, an `f`
//! prefix floating point.

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

bitflags! {
    /// Control flow and data flow properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BytecodeFlags: u16 {
        /// Transfers control to a jump target
        const JUMP = 0x0001;
        /// The jump is only taken when a condition holds
        const CONDITIONAL = 0x0002;
        /// Leaves the method normally
        const RETURN = 0x0004;
        /// Leaves the method by raising an exception
        const THROW = 0x0008;
        /// May raise an exception
        const CAN_THROW = 0x0010;
        /// Calls another method
        const CALL = 0x0020;
        /// Operands are a register range starting at the first register
        const RANGE = 0x0040;
        /// Reads the accumulator
        const ACC_READ = 0x0080;
        /// Writes the accumulator
        const ACC_WRITE = 0x0100;
    }
}

/// A bytecode opcode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[allow(missing_docs)]
pub enum Opcode {
    #[strum(serialize = "nop")]
    Nop,

    // Register moves
    #[strum(serialize = "mov")]
    Mov,
    #[strum(serialize = "mov.64")]
    MovWide,
    #[strum(serialize = "mov.obj")]
    MovObj,
    #[strum(serialize = "movi")]
    Movi,
    #[strum(serialize = "movi.64")]
    MoviWide,
    #[strum(serialize = "fmovi")]
    Fmovi,
    #[strum(serialize = "fmovi.64")]
    FmoviWide,
    #[strum(serialize = "mov.null")]
    MovNull,

    // Accumulator loads and stores
    #[strum(serialize = "lda")]
    Lda,
    #[strum(serialize = "lda.64")]
    LdaWide,
    #[strum(serialize = "lda.obj")]
    LdaObj,
    #[strum(serialize = "ldai")]
    Ldai,
    #[strum(serialize = "ldai.64")]
    LdaiWide,
    #[strum(serialize = "fldai")]
    Fldai,
    #[strum(serialize = "fldai.64")]
    FldaiWide,
    #[strum(serialize = "lda.null")]
    LdaNull,
    #[strum(serialize = "lda.str")]
    LdaStr,
    #[strum(serialize = "lda.type")]
    LdaType,
    #[strum(serialize = "lda.const")]
    LdaConst,
    #[strum(serialize = "sta")]
    Sta,
    #[strum(serialize = "sta.64")]
    StaWide,
    #[strum(serialize = "sta.obj")]
    StaObj,

    // Binary arithmetic, acc = acc op vreg
    #[strum(serialize = "add2")]
    Add2,
    #[strum(serialize = "add2.64")]
    Add2Wide,
    #[strum(serialize = "sub2")]
    Sub2,
    #[strum(serialize = "sub2.64")]
    Sub2Wide,
    #[strum(serialize = "mul2")]
    Mul2,
    #[strum(serialize = "mul2.64")]
    Mul2Wide,
    #[strum(serialize = "div2")]
    Div2,
    #[strum(serialize = "div2.64")]
    Div2Wide,
    #[strum(serialize = "mod2")]
    Mod2,
    #[strum(serialize = "mod2.64")]
    Mod2Wide,
    #[strum(serialize = "and2")]
    And2,
    #[strum(serialize = "and2.64")]
    And2Wide,
    #[strum(serialize = "or2")]
    Or2,
    #[strum(serialize = "or2.64")]
    Or2Wide,
    #[strum(serialize = "xor2")]
    Xor2,
    #[strum(serialize = "xor2.64")]
    Xor2Wide,
    #[strum(serialize = "shl2")]
    Shl2,
    #[strum(serialize = "shl2.64")]
    Shl2Wide,
    #[strum(serialize = "shr2")]
    Shr2,
    #[strum(serialize = "shr2.64")]
    Shr2Wide,
    #[strum(serialize = "ashr2")]
    Ashr2,
    #[strum(serialize = "ashr2.64")]
    Ashr2Wide,
    #[strum(serialize = "fadd2")]
    Fadd2,
    #[strum(serialize = "fadd2.64")]
    Fadd2Wide,
    #[strum(serialize = "fsub2")]
    Fsub2,
    #[strum(serialize = "fsub2.64")]
    Fsub2Wide,
    #[strum(serialize = "fmul2")]
    Fmul2,
    #[strum(serialize = "fmul2.64")]
    Fmul2Wide,
    #[strum(serialize = "fdiv2")]
    Fdiv2,
    #[strum(serialize = "fdiv2.64")]
    Fdiv2Wide,
    #[strum(serialize = "fmod2")]
    Fmod2,
    #[strum(serialize = "fmod2.64")]
    Fmod2Wide,

    // Binary arithmetic with an immediate, acc = acc op imm
    #[strum(serialize = "addi")]
    Addi,
    #[strum(serialize = "subi")]
    Subi,
    #[strum(serialize = "muli")]
    Muli,
    #[strum(serialize = "divi")]
    Divi,
    #[strum(serialize = "modi")]
    Modi,
    #[strum(serialize = "andi")]
    Andi,
    #[strum(serialize = "ori")]
    Ori,
    #[strum(serialize = "xori")]
    Xori,
    #[strum(serialize = "shli")]
    Shli,
    #[strum(serialize = "shri")]
    Shri,
    #[strum(serialize = "ashri")]
    Ashri,
    /// vreg = vreg + imm
    #[strum(serialize = "inci")]
    Inci,

    // Unary arithmetic on the accumulator
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "neg.64")]
    NegWide,
    #[strum(serialize = "fneg")]
    Fneg,
    #[strum(serialize = "fneg.64")]
    FnegWide,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "not.64")]
    NotWide,

    // Conversions of the accumulator
    #[strum(serialize = "i32toi64")]
    I32toI64,
    #[strum(serialize = "i32tof32")]
    I32toF32,
    #[strum(serialize = "i32tof64")]
    I32toF64,
    #[strum(serialize = "i32tou16")]
    I32toU16,
    #[strum(serialize = "i32toi16")]
    I32toI16,
    #[strum(serialize = "i32tou8")]
    I32toU8,
    #[strum(serialize = "i32toi8")]
    I32toI8,
    #[strum(serialize = "i64toi32")]
    I64toI32,
    #[strum(serialize = "i64tof64")]
    I64toF64,
    #[strum(serialize = "f32toi32")]
    F32toI32,
    #[strum(serialize = "f32tof64")]
    F32toF64,
    #[strum(serialize = "f64toi32")]
    F64toI32,
    #[strum(serialize = "f64toi64")]
    F64toI64,
    #[strum(serialize = "f64tof32")]
    F64toF32,

    // Three-way comparisons, acc = cmp(acc, vreg)
    #[strum(serialize = "cmp.64")]
    Cmp64,
    #[strum(serialize = "ucmp")]
    Ucmp,
    #[strum(serialize = "ucmp.64")]
    Ucmp64,
    #[strum(serialize = "fcmpl")]
    Fcmpl,
    #[strum(serialize = "fcmpg")]
    Fcmpg,
    #[strum(serialize = "fcmpl.64")]
    Fcmpl64,
    #[strum(serialize = "fcmpg.64")]
    Fcmpg64,

    // Jumps
    #[strum(serialize = "jmp")]
    Jmp,
    #[strum(serialize = "jeqz")]
    Jeqz,
    #[strum(serialize = "jnez")]
    Jnez,
    #[strum(serialize = "jltz")]
    Jltz,
    #[strum(serialize = "jgtz")]
    Jgtz,
    #[strum(serialize = "jlez")]
    Jlez,
    #[strum(serialize = "jgez")]
    Jgez,
    #[strum(serialize = "jeqz.obj")]
    JeqzObj,
    #[strum(serialize = "jnez.obj")]
    JnezObj,
    #[strum(serialize = "jeq")]
    Jeq,
    #[strum(serialize = "jne")]
    Jne,
    #[strum(serialize = "jlt")]
    Jlt,
    #[strum(serialize = "jgt")]
    Jgt,
    #[strum(serialize = "jle")]
    Jle,
    #[strum(serialize = "jge")]
    Jge,
    #[strum(serialize = "jeq.obj")]
    JeqObj,
    #[strum(serialize = "jne.obj")]
    JneObj,

    // Method exits
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "return.64")]
    ReturnWide,
    #[strum(serialize = "return.obj")]
    ReturnObj,
    #[strum(serialize = "return.void")]
    ReturnVoid,
    #[strum(serialize = "throw")]
    Throw,

    // Calls
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "call.range")]
    CallRange,
    #[strum(serialize = "call.acc")]
    CallAcc,
    #[strum(serialize = "call.virt")]
    CallVirt,
    #[strum(serialize = "call.virt.range")]
    CallVirtRange,
    #[strum(serialize = "call.virt.acc")]
    CallVirtAcc,
    #[strum(serialize = "initobj")]
    InitObj,
    #[strum(serialize = "initobj.range")]
    InitObjRange,

    // Objects
    #[strum(serialize = "newobj")]
    NewObj,
    #[strum(serialize = "ldobj")]
    LdObj,
    #[strum(serialize = "ldobj.64")]
    LdObjWide,
    #[strum(serialize = "ldobj.obj")]
    LdObjObj,
    #[strum(serialize = "stobj")]
    StObj,
    #[strum(serialize = "stobj.64")]
    StObjWide,
    #[strum(serialize = "stobj.obj")]
    StObjObj,
    #[strum(serialize = "ldstatic")]
    LdStatic,
    #[strum(serialize = "ldstatic.64")]
    LdStaticWide,
    #[strum(serialize = "ldstatic.obj")]
    LdStaticObj,
    #[strum(serialize = "ststatic")]
    StStatic,
    #[strum(serialize = "ststatic.64")]
    StStaticWide,
    #[strum(serialize = "ststatic.obj")]
    StStaticObj,
    #[strum(serialize = "checkcast")]
    CheckCast,
    #[strum(serialize = "isinstance")]
    IsInstance,

    // Arrays
    #[strum(serialize = "newarr")]
    NewArr,
    #[strum(serialize = "lenarr")]
    LenArr,
    #[strum(serialize = "ldarr.8")]
    Ldarr8,
    #[strum(serialize = "ldarru.8")]
    Ldarru8,
    #[strum(serialize = "ldarr.16")]
    Ldarr16,
    #[strum(serialize = "ldarru.16")]
    Ldarru16,
    #[strum(serialize = "ldarr")]
    Ldarr,
    #[strum(serialize = "ldarr.64")]
    LdarrWide,
    #[strum(serialize = "fldarr.32")]
    Fldarr32,
    #[strum(serialize = "fldarr.64")]
    FldarrWide,
    #[strum(serialize = "ldarr.obj")]
    LdarrObj,
    #[strum(serialize = "starr.8")]
    Starr8,
    #[strum(serialize = "starr.16")]
    Starr16,
    #[strum(serialize = "starr")]
    Starr,
    #[strum(serialize = "starr.64")]
    StarrWide,
    #[strum(serialize = "fstarr.32")]
    Fstarr32,
    #[strum(serialize = "fstarr.64")]
    FstarrWide,
    #[strum(serialize = "starr.obj")]
    StarrObj,
}

impl Opcode {
    /// Static properties of the opcode.
    #[must_use]
    pub const fn flags(self) -> BytecodeFlags {
        use Opcode::*;

        const READ: u16 = BytecodeFlags::ACC_READ.bits();
        const WRITE: u16 = BytecodeFlags::ACC_WRITE.bits();
        const THROWS: u16 = BytecodeFlags::CAN_THROW.bits();
        const CALL: u16 = BytecodeFlags::CALL.bits() | THROWS | WRITE;
        const RANGE: u16 = BytecodeFlags::RANGE.bits();
        const JUMP: u16 = BytecodeFlags::JUMP.bits();
        const COND: u16 = JUMP | BytecodeFlags::CONDITIONAL.bits() | READ;
        const RET: u16 = BytecodeFlags::RETURN.bits();

        let bits = match self {
            Nop | Mov | MovWide | MovObj | Movi | MoviWide | Fmovi | FmoviWide | MovNull
            | Inci => 0,
            Lda | LdaWide | LdaObj | Ldai | LdaiWide | Fldai | FldaiWide | LdaNull => WRITE,
            LdaStr | LdaType => WRITE | THROWS,
            LdaConst => THROWS,
            Sta | StaWide | StaObj => READ,

            Add2 | Add2Wide | Sub2 | Sub2Wide | Mul2 | Mul2Wide | And2 | And2Wide | Or2
            | Or2Wide | Xor2 | Xor2Wide | Shl2 | Shl2Wide | Shr2 | Shr2Wide | Ashr2
            | Ashr2Wide | Fadd2 | Fadd2Wide | Fsub2 | Fsub2Wide | Fmul2 | Fmul2Wide | Fdiv2
            | Fdiv2Wide | Fmod2 | Fmod2Wide => READ | WRITE,
            Div2 | Div2Wide | Mod2 | Mod2Wide => READ | WRITE | THROWS,
            Addi | Subi | Muli | Andi | Ori | Xori | Shli | Shri | Ashri => READ | WRITE,
            Divi | Modi => READ | WRITE | THROWS,

            Neg | NegWide | Fneg | FnegWide | Not | NotWide => READ | WRITE,
            I32toI64 | I32toF32 | I32toF64 | I32toU16 | I32toI16 | I32toU8 | I32toI8
            | I64toI32 | I64toF64 | F32toI32 | F32toF64 | F64toI32 | F64toI64 | F64toF32 => {
                READ | WRITE
            }
            Cmp64 | Ucmp | Ucmp64 | Fcmpl | Fcmpg | Fcmpl64 | Fcmpg64 => READ | WRITE,

            Jmp => JUMP,
            Jeqz | Jnez | Jltz | Jgtz | Jlez | Jgez | JeqzObj | JnezObj | Jeq | Jne | Jlt
            | Jgt | Jle | Jge | JeqObj | JneObj => COND,

            Return | ReturnWide | ReturnObj => RET | READ,
            ReturnVoid => RET,
            Throw => BytecodeFlags::THROW.bits() | THROWS,

            Call | CallVirt | InitObj => CALL,
            CallRange | CallVirtRange | InitObjRange => CALL | RANGE,
            CallAcc | CallVirtAcc => CALL | READ,

            NewObj => THROWS,
            LdObj | LdObjWide | LdObjObj => WRITE | THROWS,
            StObj | StObjWide | StObjObj => READ | THROWS,
            LdStatic | LdStaticWide | LdStaticObj => WRITE | THROWS,
            StStatic | StStaticWide | StStaticObj => READ | THROWS,
            CheckCast => READ | THROWS,
            IsInstance => READ | WRITE | THROWS,

            NewArr => THROWS,
            LenArr => WRITE | THROWS,
            Ldarr8 | Ldarru8 | Ldarr16 | Ldarru16 | Ldarr | LdarrWide | Fldarr32 | FldarrWide
            | LdarrObj => READ | WRITE | THROWS,
            Starr8 | Starr16 | Starr | StarrWide | Fstarr32 | FstarrWide | StarrObj => {
                READ | THROWS
            }
        };
        BytecodeFlags::from_bits_truncate(bits)
    }

    /// Returns true for jumps, conditional or not.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        self.flags().contains(BytecodeFlags::JUMP)
    }

    /// Returns true for conditional jumps.
    #[must_use]
    pub const fn is_conditional(self) -> bool {
        self.flags().contains(BytecodeFlags::CONDITIONAL)
    }

    /// Returns true for instructions after which control never falls through.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        let flags = self.flags();
        flags.intersects(BytecodeFlags::RETURN.union(BytecodeFlags::THROW))
            || (flags.contains(BytecodeFlags::JUMP) && !flags.contains(BytecodeFlags::CONDITIONAL))
    }

    /// Returns true if the instruction may raise an exception.
    #[must_use]
    pub const fn can_throw(self) -> bool {
        self.flags().contains(BytecodeFlags::CAN_THROW)
    }

    /// Returns true if the immediate operand is 64 bits wide.
    #[must_use]
    pub const fn has_wide_immediate(self) -> bool {
        matches!(
            self,
            Opcode::MoviWide | Opcode::FmoviWide | Opcode::LdaiWide | Opcode::FldaiWide
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::Add2Wide.to_string(), "add2.64");
        assert_eq!(Opcode::from_str("call.virt.range").ok(), Some(Opcode::CallVirtRange));
        let name: &'static str = Opcode::ReturnVoid.into();
        assert_eq!(name, "return.void");
    }

    #[test]
    fn test_control_flow_flags() {
        assert!(Opcode::Jmp.is_terminator());
        assert!(!Opcode::Jeqz.is_terminator());
        assert!(Opcode::Jeqz.is_conditional());
        assert!(Opcode::Jeqz.flags().contains(BytecodeFlags::ACC_READ));
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::ReturnVoid.is_terminator());
        assert!(!Opcode::Call.is_terminator());
    }

    #[test]
    fn test_every_terminator_leaves_or_jumps() {
        for opcode in Opcode::iter() {
            if opcode.is_terminator() {
                let flags = opcode.flags();
                assert!(
                    flags.intersects(
                        BytecodeFlags::JUMP | BytecodeFlags::RETURN | BytecodeFlags::THROW
                    ),
                    "{opcode}"
                );
            }
            if opcode.flags().contains(BytecodeFlags::CALL) {
                assert!(opcode.can_throw(), "{opcode}");
            }
        }
    }
}
