//! Mapping of bytecode opcodes to IR constructors.

use crate::{
    builder::inst_builder::InstBuilder,
    bytecode::{BytecodeInstruction, Opcode as Bc},
    ir::{ConditionCode, DataType, InstData, Opcode},
    Result,
};

/// Register operands of a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgsForm {
    /// Every argument is listed as a register
    Short,
    /// Arguments occupy consecutive registers starting at the first operand
    Range,
    /// Like `Short`, with the accumulator spliced in at the immediate's position
    Acc,
}

/// Opcode and operand type of two-operand arithmetic.
fn binary_op(opcode: Bc) -> Option<(Opcode, DataType)> {
    use DataType::{Float32, Float64, Int32, Int64};
    let op = match opcode {
        Bc::Add2 | Bc::Addi => (Opcode::Add, Int32),
        Bc::Add2Wide => (Opcode::Add, Int64),
        Bc::Sub2 | Bc::Subi => (Opcode::Sub, Int32),
        Bc::Sub2Wide => (Opcode::Sub, Int64),
        Bc::Mul2 | Bc::Muli => (Opcode::Mul, Int32),
        Bc::Mul2Wide => (Opcode::Mul, Int64),
        Bc::Div2 | Bc::Divi => (Opcode::Div, Int32),
        Bc::Div2Wide => (Opcode::Div, Int64),
        Bc::Mod2 | Bc::Modi => (Opcode::Mod, Int32),
        Bc::Mod2Wide => (Opcode::Mod, Int64),
        Bc::And2 | Bc::Andi => (Opcode::And, Int32),
        Bc::And2Wide => (Opcode::And, Int64),
        Bc::Or2 | Bc::Ori => (Opcode::Or, Int32),
        Bc::Or2Wide => (Opcode::Or, Int64),
        Bc::Xor2 | Bc::Xori => (Opcode::Xor, Int32),
        Bc::Xor2Wide => (Opcode::Xor, Int64),
        Bc::Shl2 | Bc::Shli => (Opcode::Shl, Int32),
        Bc::Shl2Wide => (Opcode::Shl, Int64),
        Bc::Shr2 | Bc::Shri => (Opcode::Shr, Int32),
        Bc::Shr2Wide => (Opcode::Shr, Int64),
        Bc::Ashr2 | Bc::Ashri => (Opcode::AShr, Int32),
        Bc::Ashr2Wide => (Opcode::AShr, Int64),
        Bc::Fadd2 => (Opcode::Add, Float32),
        Bc::Fadd2Wide => (Opcode::Add, Float64),
        Bc::Fsub2 => (Opcode::Sub, Float32),
        Bc::Fsub2Wide => (Opcode::Sub, Float64),
        Bc::Fmul2 => (Opcode::Mul, Float32),
        Bc::Fmul2Wide => (Opcode::Mul, Float64),
        Bc::Fdiv2 => (Opcode::Div, Float32),
        Bc::Fdiv2Wide => (Opcode::Div, Float64),
        Bc::Fmod2 => (Opcode::Mod, Float32),
        Bc::Fmod2Wide => (Opcode::Mod, Float64),
        _ => return None,
    };
    Some(op)
}

/// Source and target type of a conversion.
fn conversion(opcode: Bc) -> Option<(DataType, DataType)> {
    use DataType::{Float32, Float64, Int16, Int32, Int64, Int8, Uint16, Uint8};
    let types = match opcode {
        Bc::I32toI64 => (Int32, Int64),
        Bc::I32toF32 => (Int32, Float32),
        Bc::I32toF64 => (Int32, Float64),
        Bc::I32toU16 => (Int32, Uint16),
        Bc::I32toI16 => (Int32, Int16),
        Bc::I32toU8 => (Int32, Uint8),
        Bc::I32toI8 => (Int32, Int8),
        Bc::I64toI32 => (Int64, Int32),
        Bc::I64toF64 => (Int64, Float64),
        Bc::F32toI32 => (Float32, Int32),
        Bc::F32toF64 => (Float32, Float64),
        Bc::F64toI32 => (Float64, Int32),
        Bc::F64toI64 => (Float64, Int64),
        Bc::F64toF32 => (Float64, Float32),
        _ => return None,
    };
    Some(types)
}

/// Condition of a conditional jump.
fn jump_condition(opcode: Bc) -> ConditionCode {
    match opcode {
        Bc::Jeqz | Bc::JeqzObj | Bc::Jeq | Bc::JeqObj => ConditionCode::Eq,
        Bc::Jnez | Bc::JnezObj | Bc::Jne | Bc::JneObj => ConditionCode::Ne,
        Bc::Jltz | Bc::Jlt => ConditionCode::Lt,
        Bc::Jgtz | Bc::Jgt => ConditionCode::Gt,
        Bc::Jlez | Bc::Jle => ConditionCode::Le,
        _ => ConditionCode::Ge,
    }
}

impl InstBuilder<'_> {
    /// Translates one bytecode instruction at the end of the current block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UndefinedRegister`] for reads of undefined registers and
    /// [`crate::Error::Malformed`] for missing operands or unknown literal arrays.
    pub fn build_instruction(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        if let Some((opcode, ty)) = binary_op(inst.opcode) {
            return if inst.imm.is_some() {
                self.build_binary_imm(opcode, ty, inst)
            } else {
                self.build_binary(opcode, ty, inst)
            };
        }
        if let Some((from, to)) = conversion(inst.opcode) {
            return self.build_cast(from, to);
        }

        match inst.opcode {
            Bc::Nop | Bc::Jmp => Ok(()),

            Bc::Mov | Bc::MovWide | Bc::MovObj => self.build_mov(inst),
            Bc::Movi | Bc::MoviWide | Bc::Fmovi | Bc::FmoviWide => {
                let constant = self.graph.find_or_create_int(inst.imm()?);
                self.update_definition(inst.vreg(0)?, constant);
                Ok(())
            }
            Bc::MovNull => {
                let null = self.graph.null_ptr();
                self.update_definition(inst.vreg(0)?, null);
                Ok(())
            }
            Bc::Lda | Bc::LdaWide | Bc::LdaObj => {
                let value = self.get_definition(inst.vreg(0)?)?;
                self.update_definition_acc(value);
                Ok(())
            }
            Bc::Ldai | Bc::LdaiWide | Bc::Fldai | Bc::FldaiWide => {
                let constant = self.graph.find_or_create_int(inst.imm()?);
                self.update_definition_acc(constant);
                Ok(())
            }
            Bc::LdaNull => {
                let null = self.graph.null_ptr();
                self.update_definition_acc(null);
                Ok(())
            }
            Bc::Sta | Bc::StaWide | Bc::StaObj => {
                let value = self.get_definition_acc()?;
                self.update_definition(inst.vreg(0)?, value);
                Ok(())
            }
            Bc::LdaStr => self.build_load_string(inst.id()?),
            Bc::LdaType => self.build_load_type(inst.id()?),
            Bc::LdaConst => self.build_load_const_array(inst),

            Bc::Inci => self.build_inci(inst),
            Bc::Neg | Bc::Not => self.build_unary(inst.opcode, DataType::Int32),
            Bc::NegWide | Bc::NotWide => self.build_unary(inst.opcode, DataType::Int64),
            Bc::Fneg => self.build_unary(inst.opcode, DataType::Float32),
            Bc::FnegWide => self.build_unary(inst.opcode, DataType::Float64),

            Bc::Cmp64 => self.build_cmp(inst, DataType::Int64, ConditionCode::Lt),
            Bc::Ucmp => self.build_cmp(inst, DataType::Uint32, ConditionCode::B),
            Bc::Ucmp64 => self.build_cmp(inst, DataType::Uint64, ConditionCode::B),
            Bc::Fcmpl => self.build_cmp(inst, DataType::Float32, ConditionCode::Lt),
            Bc::Fcmpg => self.build_cmp(inst, DataType::Float32, ConditionCode::Gt),
            Bc::Fcmpl64 => self.build_cmp(inst, DataType::Float64, ConditionCode::Lt),
            Bc::Fcmpg64 => self.build_cmp(inst, DataType::Float64, ConditionCode::Gt),

            Bc::Jeqz | Bc::Jnez | Bc::Jltz | Bc::Jgtz | Bc::Jlez | Bc::Jgez => {
                self.build_if_imm(jump_condition(inst.opcode), DataType::Int32)
            }
            Bc::JeqzObj | Bc::JnezObj => {
                self.build_if_imm(jump_condition(inst.opcode), DataType::Reference)
            }
            Bc::Jeq | Bc::Jne | Bc::Jlt | Bc::Jgt | Bc::Jle | Bc::Jge => {
                self.build_if(inst, jump_condition(inst.opcode), DataType::Int32)
            }
            Bc::JeqObj | Bc::JneObj => {
                self.build_if(inst, jump_condition(inst.opcode), DataType::Reference)
            }

            Bc::Return | Bc::ReturnWide | Bc::ReturnObj => self.build_return(),
            Bc::ReturnVoid => {
                let ret = self.create(Opcode::ReturnVoid, Some(DataType::Void), InstData::None);
                self.add_instruction(ret);
                Ok(())
            }
            Bc::Throw => self.build_throw(inst),

            Bc::Call | Bc::CallVirt => self.build_call(inst, ArgsForm::Short),
            Bc::CallRange | Bc::CallVirtRange => self.build_call(inst, ArgsForm::Range),
            Bc::CallAcc | Bc::CallVirtAcc => self.build_call(inst, ArgsForm::Acc),
            Bc::InitObj => self.build_init_object(inst, ArgsForm::Short),
            Bc::InitObjRange => self.build_init_object(inst, ArgsForm::Range),

            Bc::NewObj => self.build_new_object(inst),
            Bc::LdObj | Bc::LdObjWide => self.build_load_object(inst, false),
            Bc::LdObjObj => self.build_load_object(inst, true),
            Bc::StObj | Bc::StObjWide => self.build_store_object(inst, false),
            Bc::StObjObj => self.build_store_object(inst, true),
            Bc::LdStatic | Bc::LdStaticWide => self.build_load_static(inst, false),
            Bc::LdStaticObj => self.build_load_static(inst, true),
            Bc::StStatic | Bc::StStaticWide => self.build_store_static(inst, false),
            Bc::StStaticObj => self.build_store_static(inst, true),
            Bc::CheckCast => self.build_check_cast(inst),
            Bc::IsInstance => self.build_is_instance(inst),

            Bc::NewArr => self.build_new_array(inst),
            Bc::LenArr => self.build_len_array(inst),
            Bc::Ldarr8 => self.build_load_array(inst, DataType::Int8),
            Bc::Ldarru8 => self.build_load_array(inst, DataType::Uint8),
            Bc::Ldarr16 => self.build_load_array(inst, DataType::Int16),
            Bc::Ldarru16 => self.build_load_array(inst, DataType::Uint16),
            Bc::Ldarr => self.build_load_array(inst, DataType::Int32),
            Bc::LdarrWide => self.build_load_array(inst, DataType::Int64),
            Bc::Fldarr32 => self.build_load_array(inst, DataType::Float32),
            Bc::FldarrWide => self.build_load_array(inst, DataType::Float64),
            Bc::LdarrObj => self.build_load_array(inst, DataType::Reference),
            Bc::Starr8 => self.build_store_array(inst, DataType::Int8),
            Bc::Starr16 => self.build_store_array(inst, DataType::Int16),
            Bc::Starr => self.build_store_array(inst, DataType::Int32),
            Bc::StarrWide => self.build_store_array(inst, DataType::Int64),
            Bc::Fstarr32 => self.build_store_array(inst, DataType::Float32),
            Bc::FstarrWide => self.build_store_array(inst, DataType::Float64),
            Bc::StarrObj => self.build_store_array(inst, DataType::Reference),

            opcode => Err(malformed_error!("unexpected {} at {:#x}", opcode, inst.pc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_binary_ops_cover_arithmetic() {
        for opcode in Bc::iter() {
            let name: &'static str = opcode.into();
            let register_form = name.ends_with("2") || name.ends_with("2.64");
            if register_form && !name.contains("arr") {
                assert!(binary_op(opcode).is_some(), "{name}");
            }
        }
        assert_eq!(binary_op(Bc::Fmod2Wide), Some((Opcode::Mod, DataType::Float64)));
        assert_eq!(binary_op(Bc::Ashri), Some((Opcode::AShr, DataType::Int32)));
        assert!(binary_op(Bc::Inci).is_none());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(conversion(Bc::I32toU16), Some((DataType::Int32, DataType::Uint16)));
        assert_eq!(conversion(Bc::F64toF32), Some((DataType::Float64, DataType::Float32)));
        assert!(conversion(Bc::Cmp64).is_none());
    }

    #[test]
    fn test_jump_conditions() {
        assert_eq!(jump_condition(Bc::JnezObj), ConditionCode::Ne);
        assert_eq!(jump_condition(Bc::Jgez), ConditionCode::Ge);
        assert_eq!(jump_condition(Bc::Jge), ConditionCode::Ge);
        assert_eq!(jump_condition(Bc::Jlt), ConditionCode::Lt);
    }
}
