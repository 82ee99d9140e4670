//! Inline expansion of intrinsic calls.

use crate::{
    builder::{dispatch::ArgsForm, inst_builder::InstBuilder},
    bytecode::BytecodeInstruction,
    ir::{ConditionCode, DataType, InstData, InstId, Opcode},
    runtime::IntrinsicId,
    Result,
};

/// Operand type of the math intrinsics.
fn math_type(intrinsic: IntrinsicId) -> DataType {
    use IntrinsicId::*;
    match intrinsic {
        MathAbsI32 | MathMinI32 | MathMaxI32 => DataType::Int32,
        MathAbsI64 | MathMinI64 | MathMaxI64 => DataType::Int64,
        MathAbsF32 | MathSqrtF32 | MathMinF32 | MathMaxF32 | FloatIsNan => DataType::Float32,
        _ => DataType::Float64,
    }
}

impl InstBuilder<'_> {
    pub(crate) fn build_intrinsic(
        &mut self,
        inst: &BytecodeInstruction,
        form: ArgsForm,
        method_id: u32,
        intrinsic: IntrinsicId,
    ) -> Result<()> {
        use IntrinsicId::*;

        let is_static = self.runtime.is_method_static_by_id(self.method, method_id);
        let args = self.call_arguments(inst, form, method_id, !is_static)?;
        let arg = |index: usize| {
            args.get(index).map(|&(value, _)| value).ok_or_else(|| {
                malformed_error!("intrinsic {} at {:#x} misses argument {}", intrinsic, inst.pc, index)
            })
        };

        let result = match intrinsic {
            MathAbsI32 | MathAbsI64 | MathAbsF32 | MathAbsF64 => {
                Some(self.unary(Opcode::Abs, math_type(intrinsic), arg(0)?))
            }
            MathSqrtF32 | MathSqrtF64 => Some(self.unary(Opcode::Sqrt, math_type(intrinsic), arg(0)?)),
            MathMinI32 | MathMinI64 | MathMinF32 | MathMinF64 => {
                Some(self.binary(Opcode::Min, math_type(intrinsic), arg(0)?, arg(1)?))
            }
            MathMaxI32 | MathMaxI64 | MathMaxF32 | MathMaxF64 => {
                Some(self.binary(Opcode::Max, math_type(intrinsic), arg(0)?, arg(1)?))
            }
            // NaN is the only value that differs from itself
            FloatIsNan | DoubleIsNan => {
                let value = arg(0)?;
                Some(self.compare(ConditionCode::Ne, math_type(intrinsic), value, value))
            }
            StringLength => Some(self.string_length(arg(0)?)),
            StringIsEmpty => {
                let length = self.string_length(arg(0)?);
                let zero = self.graph.find_or_create_int(0);
                Some(self.compare(ConditionCode::Eq, DataType::Int32, length, zero))
            }
            CharIsUpperCase => Some(self.char_in_range(arg(0)?, 'A')),
            CharIsLowerCase => Some(self.char_in_range(arg(0)?, 'a')),
            CharToUpperCase => Some(self.char_shift_case(arg(0)?, 'a', -32)),
            CharToLowerCase => Some(self.char_shift_case(arg(0)?, 'A', 32)),
            ObjectMonitorEnter | ObjectMonitorExit => {
                self.monitor(arg(0)?, intrinsic == ObjectMonitorEnter);
                None
            }
            Other(_) => self.default_intrinsic(method_id, intrinsic, is_static, &args),
        };

        match result {
            Some(result) => self.update_definition_acc(result),
            None => self.update_definition_acc_none(),
        }
        Ok(())
    }

    fn unary(&mut self, opcode: Opcode, ty: DataType, value: InstId) -> InstId {
        let inst = self.create(opcode, Some(ty), InstData::None);
        self.graph.append_input(inst, value, Some(ty));
        self.add_instruction(inst);
        inst
    }

    fn binary(&mut self, opcode: Opcode, ty: DataType, lhs: InstId, rhs: InstId) -> InstId {
        let inst = self.create(opcode, Some(ty), InstData::None);
        self.graph.append_input(inst, lhs, Some(ty));
        self.graph.append_input(inst, rhs, Some(ty));
        self.add_instruction(inst);
        inst
    }

    fn compare(&mut self, cc: ConditionCode, operands: DataType, lhs: InstId, rhs: InstId) -> InstId {
        let inst = self.create(
            Opcode::Compare,
            Some(DataType::Bool),
            InstData::Compare { cc, operands },
        );
        self.graph.append_input(inst, lhs, Some(operands));
        self.graph.append_input(inst, rhs, Some(operands));
        self.add_instruction(inst);
        inst
    }

    /// Strings are arrays of characters; with compression the low bit of the stored length
    /// is the compression flag.
    fn string_length(&mut self, string: InstId) -> InstId {
        let save_state = self.add_save_state();
        let checked = self.null_check(string, save_state);
        let length = self.unary(Opcode::LenArray, DataType::Int32, checked);
        self.graph.set_input_type(length, 0, DataType::Reference);
        if !self.runtime.is_compressed_strings_enabled() {
            return length;
        }
        let one = self.graph.find_or_create_int(1);
        self.binary(Opcode::Shr, DataType::Int32, length, one)
    }

    /// `c - first <= 25`, unsigned
    fn char_in_range(&mut self, value: InstId, first: char) -> InstId {
        let first = self.graph.find_or_create_int(i64::from(u32::from(first)));
        let offset = self.binary(Opcode::Sub, DataType::Uint16, value, first);
        let last = self.graph.find_or_create_int(25);
        self.compare(ConditionCode::Be, DataType::Uint16, offset, last)
    }

    /// `c + in_range(c) * delta`, moving letters of one case to the other
    fn char_shift_case(&mut self, value: InstId, first: char, delta: i64) -> InstId {
        let in_range = self.char_in_range(value, first);
        let factor = self.cast(in_range, DataType::Bool, DataType::Uint16);
        let delta = self.graph.find_or_create_int(delta);
        let shift = self.binary(Opcode::Mul, DataType::Uint16, factor, delta);
        self.binary(Opcode::Add, DataType::Uint16, value, shift)
    }

    fn monitor(&mut self, object: InstId, entry: bool) {
        let save_state = self.add_save_state();
        let object = if entry {
            self.null_check(object, save_state)
        } else {
            object
        };
        let monitor = self.create(
            Opcode::Monitor,
            Some(DataType::Void),
            InstData::Monitor { entry },
        );
        self.graph
            .append_input(monitor, object, Some(DataType::Reference));
        self.graph.append_input(monitor, save_state, None);
        self.add_instruction(monitor);
    }

    /// A generic `Intrinsic` node. It needs a save state when it may call into the runtime
    /// or dereferences a receiver.
    fn default_intrinsic(
        &mut self,
        method_id: u32,
        intrinsic: IntrinsicId,
        is_static: bool,
        args: &[(InstId, DataType)],
    ) -> Option<InstId> {
        let ret = self.runtime.method_return_type_by_id(self.method, method_id);
        let mut args = args.to_vec();

        let save_state = if !is_static || intrinsic.requires_state() {
            Some(self.add_save_state())
        } else {
            None
        };
        if let (false, Some(save_state)) = (is_static, save_state) {
            args[0].0 = self.null_check(args[0].0, save_state);
        }

        let inst = self.create(Opcode::Intrinsic, Some(ret), InstData::Intrinsic(intrinsic));
        for (value, ty) in args {
            self.graph.append_input(inst, value, Some(ty));
        }
        if let Some(save_state) = save_state {
            self.graph.append_input(inst, save_state, None);
        }
        self.add_instruction(inst);
        (ret != DataType::Void).then_some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::BuilderOptions,
        bytecode::MethodAssembler,
        ir::GraphMode,
        runtime::MethodDesc,
        test::{build, build_with, find, opcodes, TestRuntime},
    };

    fn runtime_with(intrinsic: IntrinsicId, desc: MethodDesc) -> TestRuntime {
        let mut runtime = TestRuntime::with_method(&desc.args, desc.ret);
        runtime.add_method(20, desc.intrinsic(intrinsic));
        runtime
    }

    #[test]
    fn test_math_intrinsics() {
        let runtime = runtime_with(
            IntrinsicId::MathMaxF64,
            MethodDesc::new("Math.max", &[DataType::Float64; 2], DataType::Float64),
        );
        let code = MethodAssembler::new().call(20, &[0, 1]).ret().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();

        let max = find(&graph, Opcode::Max).unwrap();
        assert_eq!(max.ty(), Some(DataType::Float64));
        assert!(!opcodes(&graph).contains(&Opcode::CallStatic));
    }

    #[test]
    fn test_is_nan_compares_value_with_itself() {
        let runtime = runtime_with(
            IntrinsicId::DoubleIsNan,
            MethodDesc::new("Double.isNaN", &[DataType::Float64], DataType::Bool),
        );
        let code = MethodAssembler::new().call(20, &[0]).ret().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();

        let compare = find(&graph, Opcode::Compare).unwrap();
        assert_eq!(compare.input(0), compare.input(1));
        assert_eq!(
            compare.data(),
            &InstData::Compare {
                cc: ConditionCode::Ne,
                operands: DataType::Float64
            }
        );
    }

    #[test]
    fn test_compressed_string_length() {
        let mut runtime = TestRuntime::with_method(&[DataType::Reference], DataType::Int32);
        runtime.add_method(
            20,
            MethodDesc::new("String.length", &[], DataType::Int32)
                .instance()
                .intrinsic(IntrinsicId::StringLength),
        );
        runtime.set_compressed_strings(true);
        let code = MethodAssembler::new()
            .emit_id(crate::bytecode::Opcode::CallVirt, &[0], 20)
            .ret()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();

        let ops = opcodes(&graph);
        let len = ops.iter().position(|&op| op == Opcode::LenArray).unwrap();
        assert_eq!(ops[len - 1], Opcode::NullCheck);
        assert_eq!(ops[len + 1], Opcode::Shr);
    }

    #[test]
    fn test_monitor_exit_has_no_null_check() {
        let mut runtime = TestRuntime::with_method(&[DataType::Reference], DataType::Void);
        runtime.add_method(
            20,
            MethodDesc::new("Monitor.exit", &[DataType::Reference], DataType::Void)
                .intrinsic(IntrinsicId::ObjectMonitorExit),
        );
        let code = MethodAssembler::new().call(20, &[0]).ret_void().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();

        let monitor = find(&graph, Opcode::Monitor).unwrap();
        assert_eq!(monitor.data(), &InstData::Monitor { entry: false });
        assert!(!opcodes(&graph).contains(&Opcode::NullCheck));
    }

    #[test]
    fn test_intrinsics_disabled_build_calls() {
        let runtime = runtime_with(
            IntrinsicId::MathAbsI32,
            MethodDesc::new("Math.abs", &[DataType::Int32], DataType::Int32),
        );
        let code = MethodAssembler::new().call(20, &[0]).ret().finish().unwrap();
        let graph = build_with(
            &runtime,
            &code,
            BuilderOptions::non_optimizing(),
            GraphMode::default(),
        )
        .unwrap();
        assert!(find(&graph, Opcode::Abs).is_none());
        assert!(find(&graph, Opcode::CallStatic).is_some());
    }

    #[test]
    fn test_runtime_intrinsic_requires_state() {
        let runtime = runtime_with(
            IntrinsicId::Other(3),
            MethodDesc::new("Runtime.gc", &[], DataType::Void),
        );
        let code = MethodAssembler::new().call(20, &[]).ret_void().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();
        let intrinsic = find(&graph, Opcode::Intrinsic).unwrap();
        assert!(graph.inst(intrinsic.input(0).unwrap()).is_save_state());
    }

    #[test]
    fn test_char_to_upper_case_shape() {
        let runtime = runtime_with(
            IntrinsicId::CharToUpperCase,
            MethodDesc::new("Char.toUpperCase", &[DataType::Uint16], DataType::Uint16),
        );
        let code = MethodAssembler::new().call(20, &[0]).ret().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();
        let ops = opcodes(&graph);
        for opcode in [Opcode::Sub, Opcode::Compare, Opcode::Cast, Opcode::Mul, Opcode::Add] {
            assert!(ops.contains(&opcode), "{opcode}");
        }
        let ret = find(&graph, Opcode::Return).unwrap();
        assert_eq!(graph.inst(ret.input(0).unwrap()).opcode(), Opcode::Add);
    }
}
