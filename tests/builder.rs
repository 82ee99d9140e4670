//! End-to-end graph construction through the public API.

use irscope::prelude::*;
use irscope::{
    ir::{ConstValue, VRegKind},
    utils::graph::NodeId,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build(runtime: &StaticRuntime, method: MethodPtr, code: &MethodCode) -> Result<Graph> {
    init();
    let graph = IrBuilder::new(runtime, method, code).build()?;
    GraphChecker::new(&graph).check()?;
    Ok(graph)
}

fn pc_of(code: &MethodCode, opcode: BytecodeOpcode, imm: i64) -> Option<u32> {
    code.instructions()
        .iter()
        .find(|inst| inst.opcode == opcode && inst.imm == Some(imm))
        .map(|inst| inst.pc)
}

fn int_value(graph: &Graph, id: InstId) -> Option<i64> {
    graph.inst(id).const_value().and_then(ConstValue::as_int)
}

fn phis_of(graph: &Graph, block: NodeId) -> Vec<&Inst> {
    graph
        .block(block)
        .phis()
        .iter()
        .map(|&phi| graph.inst(phi))
        .collect()
}

#[test]
fn diamond_merges_register_in_one_phi() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("pick", &[DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .lda(1)
        .jump(BytecodeOpcode::Jeqz, &[], "else")
        .movi(0, 5)
        .jmp("merge")
        .label("else")
        .movi(0, 7)
        .label("merge")
        .lda(0)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let ret = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Return)
        .expect("return");
    let merge = ret.block().expect("placed");
    let phis = phis_of(&graph, merge);
    assert_eq!(phis.len(), 1);

    let phi = phis[0];
    assert_eq!(phi.linear_number(), Some(0));
    assert_eq!(phi.ty(), Some(DataType::Int32));
    assert_eq!(ret.input(0), Some(phi.id()));

    let preds = graph.block(merge).preds();
    assert_eq!(preds.len(), 2);
    for (index, &pred) in preds.iter().enumerate() {
        let value = int_value(&graph, phi.input(index).expect("input")).expect("constant");
        assert!(value == 5 || value == 7);
        let movi = pc_of(&code, BytecodeOpcode::Movi, value);
        assert_eq!(graph.block(pred).guest_pc(), movi);
    }
    Ok(())
}

#[test]
fn loop_invariant_register_is_replaced_by_its_value() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    // r0 = counter, r1 = 3, v2 = limit
    let method = runtime.add_method(
        0,
        MethodDesc::new("sum", &[DataType::Int32], DataType::Int32).registers(2),
    );
    let code = MethodAssembler::new()
        .movi(1, 3)
        .movi(0, 0)
        .label("head")
        .lda(0)
        .jump(BytecodeOpcode::Jge, &[2], "exit")
        .lda(0)
        .emit(BytecodeOpcode::Add2, &[1])
        .sta(0)
        .jmp("head")
        .label("exit")
        .lda(1)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let three = graph
        .find_constant(ConstValue::Int64(3))
        .expect("constant 3");
    let ret = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Return)
        .expect("return");
    assert_eq!(ret.input(0), Some(three));

    let add = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Add)
        .expect("add");
    assert_eq!(add.input(1), Some(three));

    // Only the counter still needs a phi
    let phis: Vec<&Inst> = graph.instructions().filter(|inst| inst.is_phi()).collect();
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].linear_number(), Some(0));
    assert_eq!(phis[0].ty(), Some(DataType::Int32));
    Ok(())
}

#[test]
fn unresolved_static_call_registers_one_slot() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(0, MethodDesc::new("caller", &[DataType::Int64], DataType::Int64));
    runtime.add_method(
        9,
        MethodDesc::new("callee", &[DataType::Int64], DataType::Int64).unresolved(),
    );
    let code = MethodAssembler::new().call(9, &[0]).ret().finish()?;
    let graph = build(&runtime, method, &code)?;

    let call = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::CallResolvedStatic)
        .expect("call");
    let resolve = graph.inst(call.input(0).expect("resolve input"));
    assert_eq!(resolve.opcode(), Opcode::ResolveStatic);
    assert!(graph
        .instructions()
        .all(|inst| inst.opcode() != Opcode::CallStatic));

    let slots = runtime.unresolved_types().slots_of(method);
    assert_eq!(slots.len(), 1);
    assert_eq!((slots[0].0, slots[0].1), (9, SlotKind::Method));
    assert_eq!(runtime.unresolved_types().len(), 1);
    Ok(())
}

#[test]
fn int32_value_merged_with_zero_literal_is_int32() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("clamp", &[DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 0)
        .lda(1)
        .jump(BytecodeOpcode::Jltz, &[], "done")
        .lda(1)
        .emit(BytecodeOpcode::Neg, &[])
        .sta(0)
        .label("done")
        .lda(0)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let phi = graph
        .instructions()
        .find(|inst| inst.is_phi())
        .expect("phi");
    assert_eq!(phi.ty(), Some(DataType::Int32));
    let inputs: Vec<Opcode> = phi
        .inputs()
        .iter()
        .map(|input| graph.inst(input.inst).opcode())
        .collect();
    assert!(inputs.contains(&Opcode::Constant));
    assert!(inputs.contains(&Opcode::Neg));
    Ok(())
}

#[test]
fn straight_line_code_creates_no_phis() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("mix", &[DataType::Int32, DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .lda(1)
        .emit(BytecodeOpcode::Mul2, &[2])
        .sta(0)
        .jmp("next")
        .label("next")
        .lda(0)
        .emit(BytecodeOpcode::Sub2, &[1])
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    assert!(graph.instructions().all(|inst| !inst.is_phi()));
    let sub = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Sub)
        .expect("sub");
    let mul = graph.inst(sub.input(0).expect("lhs"));
    assert_eq!(mul.opcode(), Opcode::Mul);
    Ok(())
}

#[test]
fn diamond_whose_arms_agree_needs_no_phi() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("keep", &[DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 5)
        .lda(1)
        .jump(BytecodeOpcode::Jeqz, &[], "else")
        .lda(1)
        .jmp("merge")
        .label("else")
        .lda(1)
        .label("merge")
        .lda(0)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    assert!(graph.instructions().all(|inst| !inst.is_phi()));
    let ret = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Return)
        .expect("return");
    let value = ret.input(0).expect("operand");
    assert_eq!(int_value(&graph, value), Some(5));
    Ok(())
}

#[test]
fn cycle_entered_twice_gets_phis_at_both_entries() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("tangle", &[DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 0)
        .lda(1)
        .jump(BytecodeOpcode::Jeqz, &[], "b")
        .label("a")
        .emit_imm(BytecodeOpcode::Inci, &[0], 1)
        .label("b")
        .lda(0)
        .jump(BytecodeOpcode::Jltz, &[], "a")
        .lda(0)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let a = pc_of(&code, BytecodeOpcode::Inci, 1);
    let phis: Vec<&Inst> = graph
        .instructions()
        .filter(|inst| inst.is_phi() && inst.linear_number() == Some(0))
        .collect();
    assert_eq!(phis.len(), 2);
    assert_ne!(phis[0].block(), phis[1].block());
    assert!(phis
        .iter()
        .any(|phi| phi.block().and_then(|block| graph.block(block).guest_pc()) == a));
    for phi in &phis {
        assert_eq!(phi.ty(), Some(DataType::Int32));
        assert_eq!(phi.inputs().len(), 2);
    }

    let ret = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::Return)
        .expect("return");
    let returned = ret.input(0).expect("operand");
    assert!(phis.iter().any(|phi| phi.id() == returned));
    assert!(graph.loops().iter().any(|info| info.irreducible));
    Ok(())
}

#[test]
fn save_state_inputs_dominate_their_save_state() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("loop", &[DataType::Int32, DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 1)
        .label("head")
        .lda(0)
        .jump(BytecodeOpcode::Jge, &[1], "exit")
        .lda(2)
        .emit(BytecodeOpcode::Div2, &[0])
        .sta(0)
        .jmp("head")
        .label("exit")
        .lda(0)
        .ret()
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let mut save_states = 0;
    for save_state in graph.instructions().filter(|inst| inst.is_save_state()) {
        save_states += 1;
        for input in save_state.inputs() {
            assert!(graph.inst_dominates(input.inst, save_state.id()));
        }
    }
    assert!(save_states > 0);
    Ok(())
}

#[test]
fn catch_handler_sees_definitions_of_throwing_instructions() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("guarded", &[DataType::Int32, DataType::Int32], DataType::Int32)
            .registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 1)
        .label("try")
        .lda(1)
        .emit(BytecodeOpcode::Div2, &[2])
        .sta(0)
        .ret()
        .label("try_end")
        .label("handler")
        .lda(0)
        .ret()
        .try_block("try", "try_end", &[("handler", None)])
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    let catch_begin = graph
        .blocks()
        .find(|block| block.is_catch_begin())
        .expect("catch-begin block");
    let ret = graph
        .instructions()
        .filter(|inst| inst.opcode() == Opcode::Return)
        .find(|inst| {
            let block = inst.block().expect("placed");
            graph.block(block).is_catch() || graph.block_dominates(catch_begin.id(), block)
        })
        .expect("handler return");
    let value = graph.inst(ret.input(0).expect("returned value"));
    assert!(value.is_catch_phi());
    assert!(!value.is_acc_catch_phi());
    assert_eq!(value.ty(), Some(DataType::Int32));
    Ok(())
}

#[test]
fn reading_an_undefined_register_fails() {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("broken", &[DataType::Int32], DataType::Int32).registers(2),
    );
    let code = MethodAssembler::new()
        .movi(0, 4)
        .lda(1)
        .emit(BytecodeOpcode::Add2, &[0])
        .ret()
        .finish()
        .expect("assembles");

    match build(&runtime, method, &code) {
        Err(Error::UndefinedRegister { vreg, .. }) => assert_eq!(vreg, 1),
        other => panic!("expected an undefined register, got {other:?}"),
    }
}

#[test]
fn dynamic_method_captures_environment() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("js", &[DataType::Any], DataType::Any).dynamic(),
    );
    let code = MethodAssembler::new()
        .emit_id(BytecodeOpcode::LdaStr, &[], 3)
        .emit(BytecodeOpcode::ReturnObj, &[])
        .finish()?;
    let graph = build(&runtime, method, &code)?;

    assert!(graph.mode().dynamic);
    let load = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::LoadFromConstantPool)
        .expect("constant pool load");
    let pool = graph.inst(load.input(0).expect("pool"));
    assert_eq!(pool.opcode(), Opcode::LoadConstantPool);
    Ok(())
}

#[test]
fn safepoint_skips_numeric_values() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("f", &[DataType::Int32, DataType::Reference], DataType::Void),
    );
    let code = MethodAssembler::new().ret_void().finish()?;
    let graph = build(&runtime, method, &code)?;

    let safepoint = graph
        .instructions()
        .find(|inst| inst.opcode() == Opcode::SafePoint)
        .expect("safepoint");
    let tags: Vec<VRegKind> = (0..safepoint.inputs().len())
        .filter_map(|index| safepoint.vreg(index).map(|vreg| vreg.kind))
        .collect();
    assert_eq!(tags, vec![VRegKind::Vreg]);
    assert_eq!(
        graph.inst(safepoint.input(0).expect("input")).ty(),
        Some(DataType::Reference)
    );
    Ok(())
}

#[test]
fn parallel_builds_match_sequential_builds() -> Result<()> {
    let mut runtime = StaticRuntime::new();
    let methods: Vec<MethodPtr> = (0..4)
        .map(|id| {
            runtime.add_method(
                id,
                MethodDesc::new("abs", &[DataType::Int32], DataType::Int32),
            )
        })
        .collect();
    let code = MethodAssembler::new()
        .lda(0)
        .jump(BytecodeOpcode::Jgez, &[], "done")
        .lda(0)
        .emit(BytecodeOpcode::Neg, &[])
        .label("done")
        .ret()
        .finish()?;
    let inputs: Vec<(MethodPtr, &MethodCode)> = methods.iter().map(|&m| (m, &code)).collect();

    let graphs = build_graphs(&runtime, &inputs, BuilderOptions::default(), GraphMode::default());
    let sequential = build(&runtime, methods[0], &code)?;
    for graph in graphs {
        assert_eq!(graph?.to_string(), sequential.to_string());
    }
    Ok(())
}
