//! Calls and object construction.
//!
//! A call is built as
//!
//! ```text
//! SaveState -> [NullCheck receiver | InitClass] -> [Resolve*] -> Call*
//! ```
//!
//! Callees that resolve at compile time are called directly with `CallStatic` or
//! `CallVirtual`. Otherwise a `ResolveStatic` / `ResolveVirtual` fetches the target from a
//! runtime table slot and feeds `CallResolvedStatic` / `CallResolvedVirtual`. Interface
//! methods always dispatch through `ResolveVirtual` but own no slot.

use crate::{
    builder::{dispatch::ArgsForm, inst_builder::InstBuilder},
    bytecode::{BytecodeInstruction, Opcode as Bc},
    ir::{DataType, InstData, InstId, Opcode},
    runtime::{MethodPtr, SlotKind},
    Result,
};

impl InstBuilder<'_> {
    pub(crate) fn build_call(&mut self, inst: &BytecodeInstruction, form: ArgsForm) -> Result<()> {
        let method_id = inst.id()?;
        if self.options.encode_intrinsics {
            if let Some(intrinsic) = self.runtime.intrinsic_id(self.method, method_id) {
                return self.build_intrinsic(inst, form, method_id, intrinsic);
            }
        }

        let is_static = !matches!(inst.opcode, Bc::CallVirt | Bc::CallVirtRange | Bc::CallVirtAcc)
            && self.runtime.is_method_static_by_id(self.method, method_id);
        let mut args = self.call_arguments(inst, form, method_id, !is_static)?;
        let callee = self.resolve_method(method_id);
        let save_state = self.add_save_state();

        let call = if is_static {
            self.static_call(method_id, callee, &args, save_state)
        } else {
            let receiver = self.null_check(args[0].0, save_state);
            args[0].0 = receiver;
            self.virtual_call(method_id, callee, &args, save_state)
        };

        if self.graph.inst(call).ty() == Some(DataType::Void) {
            self.update_definition_acc_none();
        } else {
            self.update_definition_acc(call);
        }
        Ok(())
    }

    /// Reads the arguments of a call with their declared types, receiver first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the instruction lists fewer registers than
    /// the callee takes.
    pub(crate) fn call_arguments(
        &mut self,
        inst: &BytecodeInstruction,
        form: ArgsForm,
        method_id: u32,
        has_receiver: bool,
    ) -> Result<Vec<(InstId, DataType)>> {
        let declared = self
            .runtime
            .method_arguments_count_by_id(self.method, method_id);
        let hidden = usize::from(has_receiver);

        let mut args = Vec::with_capacity(declared + hidden);
        for index in 0..declared + hidden {
            let value = match form {
                ArgsForm::Short => self.get_definition(inst.vreg(index)?)?,
                ArgsForm::Range => self.get_definition(inst.vreg(0)? + index)?,
                ArgsForm::Acc => {
                    let acc_position = usize::try_from(inst.imm()?).map_err(|_| {
                        malformed_error!("negative accumulator position at {:#x}", inst.pc)
                    })?;
                    match index.cmp(&acc_position) {
                        std::cmp::Ordering::Less => self.get_definition(inst.vreg(index)?)?,
                        std::cmp::Ordering::Equal => self.get_definition_acc()?,
                        std::cmp::Ordering::Greater => {
                            self.get_definition(inst.vreg(index - 1)?)?
                        }
                    }
                }
            };
            let ty = if index < hidden {
                DataType::Reference
            } else {
                self.runtime
                    .method_argument_type_by_id(self.method, method_id, index - hidden)
            };
            args.push((value, ty));
        }
        Ok(args)
    }

    fn static_call(
        &mut self,
        method_id: u32,
        callee: Option<MethodPtr>,
        args: &[(InstId, DataType)],
        save_state: InstId,
    ) -> InstId {
        let ret = self.runtime.method_return_type_by_id(self.method, method_id);
        let data = InstData::Call {
            method_id,
            method: callee,
        };

        let Some(callee) = callee else {
            self.add_table_slot(method_id, SlotKind::Method);
            let resolve = self.create(Opcode::ResolveStatic, Some(DataType::Pointer), data.clone());
            self.graph.append_input(resolve, save_state, None);
            self.add_instruction(resolve);

            let call = self.create(Opcode::CallResolvedStatic, Some(ret), data);
            self.graph
                .append_input(call, resolve, Some(DataType::Pointer));
            self.append_call_inputs(call, args, save_state);
            self.add_instruction(call);
            return call;
        };

        let class_id = self.runtime.class_id_of_method_id(self.method, method_id);
        if class_id != self.runtime.class_id_of_method(self.method) {
            let class = self.resolve_class(class_id);
            let init = self.create(
                Opcode::InitClass,
                Some(DataType::Void),
                InstData::Class {
                    type_id: class_id,
                    class,
                },
            );
            self.graph.append_input(init, save_state, None);
            self.add_instruction(init);
        }

        log::trace!("static call of {}", self.runtime.method_name(callee));
        let call = self.create(Opcode::CallStatic, Some(ret), data);
        self.append_call_inputs(call, args, save_state);
        self.add_instruction(call);
        call
    }

    fn virtual_call(
        &mut self,
        method_id: u32,
        callee: Option<MethodPtr>,
        args: &[(InstId, DataType)],
        save_state: InstId,
    ) -> InstId {
        let ret = self.runtime.method_return_type_by_id(self.method, method_id);
        let data = InstData::Call {
            method_id,
            method: callee,
        };
        let interface = callee.is_some_and(|callee| self.runtime.is_interface_method(callee));

        if callee.is_some() && !interface {
            let call = self.create(Opcode::CallVirtual, Some(ret), data);
            self.append_call_inputs(call, args, save_state);
            self.add_instruction(call);
            return call;
        }

        if !interface {
            self.add_table_slot(method_id, SlotKind::VirtualMethod);
        }
        let resolve = self.create(Opcode::ResolveVirtual, Some(DataType::Pointer), data.clone());
        self.graph
            .append_input(resolve, args[0].0, Some(DataType::Reference));
        self.graph.append_input(resolve, save_state, None);
        self.add_instruction(resolve);

        let call = self.create(Opcode::CallResolvedVirtual, Some(ret), data);
        self.graph
            .append_input(call, resolve, Some(DataType::Pointer));
        self.append_call_inputs(call, args, save_state);
        self.add_instruction(call);
        call
    }

    fn append_call_inputs(&mut self, call: InstId, args: &[(InstId, DataType)], save_state: InstId) {
        for &(value, ty) in args {
            self.graph.append_input(call, value, Some(ty));
        }
        self.graph.append_input(call, save_state, None);
    }

    /// `initobj`: allocates an instance of the constructor's class into the accumulator
    /// and calls the constructor on it.
    pub(crate) fn build_init_object(
        &mut self,
        inst: &BytecodeInstruction,
        form: ArgsForm,
    ) -> Result<()> {
        let method_id = inst.id()?;
        let type_id = self.runtime.class_id_of_method_id(self.method, method_id);
        let mut args = self.call_arguments(inst, form, method_id, false)?;

        let save_state = self.add_save_state();
        let init = self.load_and_init_class(type_id, save_state);
        let class = self.resolve_class(type_id);
        let object = self.create(
            Opcode::NewObject,
            Some(DataType::Reference),
            InstData::Class { type_id, class },
        );
        self.graph
            .append_input(object, init, Some(DataType::Reference));
        self.graph.append_input(object, save_state, None);
        self.add_instruction(object);
        self.update_definition_acc(object);

        args.insert(0, (object, DataType::Reference));
        let save_state = self.add_save_state();
        let callee = self.resolve_method(method_id);
        let data = InstData::Call {
            method_id,
            method: callee,
        };
        let call = if callee.is_some() {
            self.create(Opcode::CallStatic, Some(DataType::Void), data)
        } else {
            self.add_table_slot(method_id, SlotKind::Method);
            let resolve = self.create(Opcode::ResolveStatic, Some(DataType::Pointer), data.clone());
            self.graph.append_input(resolve, save_state, None);
            self.add_instruction(resolve);
            let call = self.create(Opcode::CallResolvedStatic, Some(DataType::Void), data);
            self.graph
                .append_input(call, resolve, Some(DataType::Pointer));
            call
        };
        self.append_call_inputs(call, &args, save_state);
        self.add_instruction(call);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        builder::BuilderOptions,
        bytecode::{MethodAssembler, Opcode as Bc},
        ir::{DataType, GraphMode, InstData, Opcode},
        runtime::{MethodDesc, RuntimeInterface, SlotKind},
        test::{build, build_with, find, opcodes, TestRuntime},
    };

    #[test]
    fn test_resolved_static_call() {
        let mut runtime = TestRuntime::with_method(&[DataType::Int32], DataType::Int32);
        runtime.add_method(
            5,
            MethodDesc::new("Math.twice", &[DataType::Int32], DataType::Int32),
        );
        let code = MethodAssembler::new()
            .call(5, &[0])
            .ret()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();

        let call = find(&graph, Opcode::CallStatic).unwrap();
        assert_eq!(call.inputs().len(), 2);
        assert_eq!(call.input_type(0), Some(DataType::Int32));
        assert!(graph.inst(call.input(1).unwrap()).is_save_state());
        // Same class, no initialization
        assert!(!opcodes(&graph).contains(&Opcode::InitClass));
        assert!(runtime.unresolved_types().is_empty());
    }

    #[test]
    fn test_static_call_into_other_class_initializes_it() {
        let mut runtime = TestRuntime::with_method(&[], DataType::Void);
        runtime.add_method(5, MethodDesc::new("Other.run", &[], DataType::Void).class(4));
        runtime.add_class(4, true);
        let code = MethodAssembler::new().call(5, &[]).ret_void().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();

        let ops = opcodes(&graph);
        let init = ops.iter().position(|&op| op == Opcode::InitClass).unwrap();
        let call = ops.iter().position(|&op| op == Opcode::CallStatic).unwrap();
        assert!(init < call);
    }

    #[test]
    fn test_unresolved_static_call_registers_one_slot() {
        let mut runtime = TestRuntime::with_method(&[], DataType::Int32);
        runtime.add_method(
            9,
            MethodDesc::new("Lazy.value", &[], DataType::Int32).unresolved(),
        );
        let code = MethodAssembler::new().call(9, &[]).ret().finish().unwrap();
        let graph = build(&runtime, &code).unwrap();

        let resolve = find(&graph, Opcode::ResolveStatic).unwrap();
        let call = find(&graph, Opcode::CallResolvedStatic).unwrap();
        assert_eq!(call.input(0), Some(resolve.id()));
        let slots = runtime.unresolved_types().slots_of(runtime.method);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].1, SlotKind::Method);
    }

    #[test]
    fn test_aot_registers_no_slot() {
        let mut runtime = TestRuntime::with_method(&[], DataType::Int32);
        runtime.add_method(
            9,
            MethodDesc::new("Lazy.value", &[], DataType::Int32).unresolved(),
        );
        let code = MethodAssembler::new().call(9, &[]).ret().finish().unwrap();
        let mode = GraphMode {
            aot: true,
            ..GraphMode::default()
        };
        let graph = build_with(&runtime, &code, BuilderOptions::default(), mode).unwrap();
        assert!(find(&graph, Opcode::CallResolvedStatic).is_some());
        assert!(runtime.unresolved_types().is_empty());
    }

    #[test]
    fn test_virtual_call_checks_receiver() {
        let mut runtime = TestRuntime::with_method(&[DataType::Reference], DataType::Void);
        runtime.add_method(
            3,
            MethodDesc::new("Obj.touch", &[], DataType::Void).instance(),
        );
        let code = MethodAssembler::new()
            .emit_id(Bc::CallVirt, &[0], 3)
            .ret_void()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();

        let call = find(&graph, Opcode::CallVirtual).unwrap();
        let receiver = graph.inst(call.input(0).unwrap());
        assert_eq!(receiver.opcode(), Opcode::NullCheck);
        assert_eq!(call.ty(), Some(DataType::Void));
    }

    #[test]
    fn test_interface_call_is_resolved_without_slot() {
        let mut runtime = TestRuntime::with_method(&[DataType::Reference], DataType::Void);
        runtime.add_method(
            3,
            MethodDesc::new("Runnable.run", &[], DataType::Void)
                .instance()
                .interface(),
        );
        let code = MethodAssembler::new()
            .emit_id(Bc::CallVirt, &[0], 3)
            .ret_void()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();
        assert!(find(&graph, Opcode::ResolveVirtual).is_some());
        assert!(find(&graph, Opcode::CallResolvedVirtual).is_some());
        assert!(runtime.unresolved_types().is_empty());
    }

    #[test]
    fn test_accumulator_argument_position() {
        let mut runtime = TestRuntime::with_method(&[DataType::Int32, DataType::Int32], DataType::Int32);
        runtime.add_method(
            5,
            MethodDesc::new("sum3", &[DataType::Int32; 3], DataType::Int32),
        );
        let code = MethodAssembler::new()
            .ldai(7)
            .emit_id_imm(Bc::CallAcc, &[0, 1], 5, 1)
            .ret()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();

        let call = find(&graph, Opcode::CallStatic).unwrap();
        let seven = graph.inst(call.input(1).unwrap());
        assert_eq!(seven.const_value().and_then(|v| v.as_int()), Some(7));
        assert_eq!(graph.inst(call.input(0).unwrap()).opcode(), Opcode::Parameter);
    }

    #[test]
    fn test_range_arguments() {
        let mut runtime = TestRuntime::with_method(&[DataType::Int64, DataType::Int64], DataType::Int64);
        runtime.add_method(
            5,
            MethodDesc::new("max", &[DataType::Int64; 2], DataType::Int64),
        );
        let code = MethodAssembler::new()
            .emit_id(Bc::CallRange, &[0], 5)
            .ret()
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();
        let call = find(&graph, Opcode::CallStatic).unwrap();
        assert_eq!(call.inputs().len(), 3);
        assert_eq!(graph.parameters(), &[call.input(0).unwrap(), call.input(1).unwrap()]);
    }

    #[test]
    fn test_init_object_calls_constructor() {
        let mut runtime = TestRuntime::with_method(&[DataType::Int32], DataType::Reference);
        runtime.add_method(
            6,
            MethodDesc::new("Point.<init>", &[DataType::Int32], DataType::Void)
                .instance()
                .class(2),
        );
        runtime.add_class(2, true);
        let code = MethodAssembler::new()
            .emit_id(Bc::InitObj, &[0], 6)
            .emit(Bc::ReturnObj, &[])
            .finish()
            .unwrap();
        let graph = build(&runtime, &code).unwrap();

        let object = find(&graph, Opcode::NewObject).unwrap();
        let ctor = find(&graph, Opcode::CallStatic).unwrap();
        assert_eq!(ctor.input(0), Some(object.id()));
        assert_eq!(
            ctor.data(),
            &InstData::Call {
                method_id: 6,
                method: runtime.resolve_method(runtime.method, 6)
            }
        );
        let ret = find(&graph, Opcode::Return).unwrap();
        assert_eq!(ret.input(0), Some(object.id()));
    }
}
