//! Phi resolution on hand-built graphs and on graphs produced by the builder.

use irscope::{
    builder::{BuilderOptions, IrBuilder, PhiResolver},
    bytecode::{MethodAssembler, Opcode as BytecodeOpcode},
    ir::{DataType, Graph, GraphChecker, GraphMode, InstData, InstId, Opcode},
    runtime::{MethodDesc, MethodPtr, StaticRuntime},
    utils::graph::NodeId,
};

fn append(
    graph: &mut Graph,
    block: NodeId,
    opcode: Opcode,
    ty: DataType,
    inputs: &[InstId],
) -> InstId {
    let id = graph.create_inst(opcode, Some(ty), Some(0), InstData::None);
    graph.append_inst(block, id);
    for &input in inputs {
        graph.append_input(id, input, Some(ty));
    }
    id
}

fn phi(graph: &mut Graph, block: NodeId, inputs: &[InstId]) -> InstId {
    let id = graph.create_inst(Opcode::Phi, None, None, InstData::Phi { linear_number: 0 });
    graph.append_inst(block, id);
    for &input in inputs {
        graph.append_input(id, input, None);
    }
    id
}

#[test]
fn phi_missing_an_operand_is_replaced() {
    let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
    let entry = graph.create_block(Some(0));
    let left = graph.create_block(Some(4));
    let right = graph.create_block(Some(8));
    let merge = graph.create_block(Some(12));
    let (start, end) = (graph.start_block(), graph.end_block());
    graph.add_edge(start, entry);
    graph.add_edge(entry, left);
    graph.add_edge(entry, right);
    graph.add_edge(left, merge);
    graph.add_edge(right, merge);
    graph.add_edge(merge, end);
    graph.analyze();

    let value = append(&mut graph, entry, Opcode::NewObject, DataType::Reference, &[]);
    let phi = phi(&mut graph, merge, &[value]);
    let ret = append(&mut graph, merge, Opcode::Return, DataType::Reference, &[phi]);

    PhiResolver::new(&mut graph, BuilderOptions::default()).run();

    assert!(graph.inst(phi).block().is_none());
    assert!(graph.block(merge).phis().is_empty());
    assert_eq!(graph.inst(ret).input(0), Some(value));
}

#[test]
fn loop_phi_merging_only_itself_is_folded() {
    let mut graph = Graph::new(MethodPtr::new(0), GraphMode::default());
    let entry = graph.create_block(Some(0));
    let header = graph.create_block(Some(4));
    let body = graph.create_block(Some(8));
    let exit = graph.create_block(Some(12));
    let (start, end) = (graph.start_block(), graph.end_block());
    graph.add_edge(start, entry);
    graph.add_edge(entry, header);
    graph.add_edge(header, body);
    graph.add_edge(header, exit);
    graph.add_edge(body, header);
    graph.add_edge(exit, end);
    graph.analyze();
    assert_eq!(graph.block(header).preds().len(), 2);

    let init = graph.add_parameter(0, DataType::Int32);
    let phi = phi(&mut graph, header, &[init]);
    graph.append_input(phi, phi, None);
    let ret = append(&mut graph, exit, Opcode::Return, DataType::Int32, &[phi]);

    PhiResolver::new(&mut graph, BuilderOptions::default()).run();

    assert!(graph.inst(phi).block().is_none());
    assert_eq!(graph.inst(ret).input(0), Some(init));
}

#[test]
fn resolving_a_built_graph_again_keeps_its_phis() -> irscope::Result<()> {
    let mut runtime = StaticRuntime::new();
    let method = runtime.add_method(
        0,
        MethodDesc::new("count", &[DataType::Int32], DataType::Int32).registers(1),
    );
    let code = MethodAssembler::new()
        .movi(0, 0)
        .label("head")
        .lda(0)
        .jump(BytecodeOpcode::Jge, &[1], "done")
        .lda(0)
        .emit_imm(BytecodeOpcode::Addi, &[], 1)
        .sta(0)
        .jmp("head")
        .label("done")
        .lda(0)
        .ret()
        .finish()?;

    let mut graph = IrBuilder::new(&runtime, method, &code).build()?;
    let phis = |graph: &Graph| -> Vec<InstId> {
        graph.instructions().filter(|inst| inst.is_phi()).map(|inst| inst.id()).collect()
    };
    let before = phis(&graph);
    assert_eq!(before.len(), 1);

    PhiResolver::new(&mut graph, BuilderOptions::default()).run();

    assert_eq!(phis(&graph), before);
    assert_eq!(graph.inst(before[0]).ty(), Some(DataType::Int32));
    GraphChecker::new(&graph).check()
}
