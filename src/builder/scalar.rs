//! Moves, arithmetic, comparisons and control flow.

use crate::{
    builder::inst_builder::InstBuilder,
    bytecode::{BytecodeInstruction, Opcode as Bc},
    ir::{ConditionCode, DataType, InstData, InstId, Opcode},
    Result,
};

impl InstBuilder<'_> {
    pub(crate) fn build_mov(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let value = self.get_definition(inst.vreg(1)?)?;
        self.update_definition(inst.vreg(0)?, value);
        Ok(())
    }

    /// `acc = acc op vreg`
    pub(crate) fn build_binary(
        &mut self,
        opcode: Opcode,
        ty: DataType,
        inst: &BytecodeInstruction,
    ) -> Result<()> {
        let lhs = self.get_definition_acc()?;
        let rhs = self.get_definition(inst.vreg(0)?)?;
        let result = self.binary_op(opcode, ty, lhs, rhs);
        self.update_definition_acc(result);
        Ok(())
    }

    /// `acc = acc op imm`
    pub(crate) fn build_binary_imm(
        &mut self,
        opcode: Opcode,
        ty: DataType,
        inst: &BytecodeInstruction,
    ) -> Result<()> {
        let lhs = self.get_definition_acc()?;
        let rhs = self.graph.find_or_create_int(inst.imm()?);
        let result = self.binary_op(opcode, ty, lhs, rhs);
        self.update_definition_acc(result);
        Ok(())
    }

    /// `vreg = vreg + imm`, on 32-bit integers.
    pub(crate) fn build_inci(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let vreg = inst.vreg(0)?;
        let lhs = self.get_definition(vreg)?;
        let rhs = self.graph.find_or_create_int(inst.imm()?);
        let result = self.binary_op(Opcode::Add, DataType::Int32, lhs, rhs);
        self.update_definition(vreg, result);
        Ok(())
    }

    /// Integer division and remainder divide by a `ZeroCheck` of the divisor.
    fn binary_op(&mut self, opcode: Opcode, ty: DataType, lhs: InstId, rhs: InstId) -> InstId {
        let divisor = if matches!(opcode, Opcode::Div | Opcode::Mod) && ty.is_integral() {
            let save_state = self.add_save_state();
            let check = self.create(Opcode::ZeroCheck, Some(ty), InstData::None);
            self.graph.append_input(check, rhs, Some(ty));
            self.graph.append_input(check, save_state, None);
            self.add_instruction(check);
            check
        } else {
            rhs
        };

        let result = self.create(opcode, Some(ty), InstData::None);
        self.graph.append_input(result, lhs, Some(ty));
        self.graph.append_input(result, divisor, Some(ty));
        self.add_instruction(result);
        result
    }

    pub(crate) fn build_unary(&mut self, bytecode: Bc, ty: DataType) -> Result<()> {
        let opcode = match bytecode {
            Bc::Not | Bc::NotWide => Opcode::Not,
            _ => Opcode::Neg,
        };
        let value = self.get_definition_acc()?;
        let result = self.create(opcode, Some(ty), InstData::None);
        self.graph.append_input(result, value, Some(ty));
        self.add_instruction(result);
        self.update_definition_acc(result);
        Ok(())
    }

    pub(crate) fn build_cast(&mut self, from: DataType, to: DataType) -> Result<()> {
        let value = self.get_definition_acc()?;
        let cast = self.cast(value, from, to);
        self.update_definition_acc(cast);
        Ok(())
    }

    /// Appends a `Cast` and types an untyped operand with the source type.
    pub(crate) fn cast(&mut self, value: InstId, from: DataType, to: DataType) -> InstId {
        let producer = self.graph.inst(value);
        if producer.opcode().is_phi_like() && !producer.has_type() {
            self.graph.set_type(value, from);
        }
        let cast = self.create(Opcode::Cast, Some(to), InstData::Operands(from));
        self.graph.append_input(cast, value, Some(from));
        self.add_instruction(cast);
        cast
    }

    /// Three-way comparison into the accumulator: -1, 0 or 1.
    ///
    /// The condition code records how unordered floating point operands compare: `Lt`
    /// yields -1 for NaN, `Gt` yields 1.
    pub(crate) fn build_cmp(
        &mut self,
        inst: &BytecodeInstruction,
        operands: DataType,
        cc: ConditionCode,
    ) -> Result<()> {
        let lhs = self.get_definition_acc()?;
        let rhs = self.get_definition(inst.vreg(0)?)?;
        let cmp = self.create(
            Opcode::Cmp,
            Some(DataType::Int32),
            InstData::Compare { cc, operands },
        );
        self.graph.append_input(cmp, lhs, Some(operands));
        self.graph.append_input(cmp, rhs, Some(operands));
        self.add_instruction(cmp);
        self.update_definition_acc(cmp);
        Ok(())
    }

    /// Branch on the accumulator compared with zero or null.
    pub(crate) fn build_if_imm(&mut self, cc: ConditionCode, operands: DataType) -> Result<()> {
        let value = self.get_definition_acc()?;
        let branch = self.create(
            Opcode::IfImm,
            Some(DataType::Void),
            InstData::IfImm {
                cc,
                operands,
                imm: 0,
            },
        );
        self.graph.append_input(branch, value, Some(operands));
        self.add_instruction(branch);
        Ok(())
    }

    /// Branch on the accumulator compared with a register.
    pub(crate) fn build_if(
        &mut self,
        inst: &BytecodeInstruction,
        cc: ConditionCode,
        operands: DataType,
    ) -> Result<()> {
        let lhs = self.get_definition_acc()?;
        let rhs = self.get_definition(inst.vreg(0)?)?;
        let branch = self.create(
            Opcode::If,
            Some(DataType::Void),
            InstData::Compare { cc, operands },
        );
        self.graph.append_input(branch, lhs, Some(operands));
        self.graph.append_input(branch, rhs, Some(operands));
        self.add_instruction(branch);
        Ok(())
    }

    pub(crate) fn build_return(&mut self) -> Result<()> {
        let ty = self.runtime.return_type(self.method);
        let value = self.get_definition_acc()?;
        let ret = self.create(Opcode::Return, Some(ty), InstData::None);
        self.graph.append_input(ret, value, Some(ty));
        self.add_instruction(ret);
        Ok(())
    }

    pub(crate) fn build_throw(&mut self, _inst: &BytecodeInstruction) -> Result<()> {
        let exception = self.get_definition_acc()?;
        let save_state = self.add_save_state();
        let throw = self.create(Opcode::Throw, Some(DataType::Void), InstData::None);
        self.graph
            .append_input(throw, exception, Some(DataType::Reference));
        self.graph.append_input(throw, save_state, None);
        self.add_instruction(throw);
        Ok(())
    }
}
