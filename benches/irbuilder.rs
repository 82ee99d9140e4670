#![allow(unused)]
extern crate irscope;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use irscope::prelude::*;
use std::hint::black_box;

/// A loop summing `0..n` with a nested diamond and an unresolved call per iteration.
fn loop_method(runtime: &mut StaticRuntime, id: u32) -> Result<(MethodPtr, MethodCode)> {
    let method = runtime.add_method(
        id,
        MethodDesc::new("sum", &[DataType::Int32], DataType::Int32).registers(2),
    );
    let code = MethodAssembler::new()
        .movi(0, 0)
        .movi(1, 0)
        .label("head")
        .lda(1)
        .jump(BytecodeOpcode::Jge, &[2], "done")
        .lda(1)
        .emit_imm(BytecodeOpcode::Andi, &[], 1)
        .jump(BytecodeOpcode::Jeqz, &[], "even")
        .lda(0)
        .emit(BytecodeOpcode::Add2, &[1])
        .sta(0)
        .jmp("next")
        .label("even")
        .call(1000, &[1])
        .label("next")
        .lda(1)
        .emit_imm(BytecodeOpcode::Addi, &[], 1)
        .sta(1)
        .jmp("head")
        .label("done")
        .lda(0)
        .ret()
        .finish()?;
    Ok((method, code))
}

/// Benchmark building a single method and building a batch of methods in parallel
fn bench_build(c: &mut Criterion) {
    let mut runtime = StaticRuntime::new();
    runtime.add_method(
        1000,
        MethodDesc::new("callee", &[DataType::Int32], DataType::Void).unresolved(),
    );
    let methods: Vec<(MethodPtr, MethodCode)> = (0..64)
        .map(|id| loop_method(&mut runtime, id).expect("Failed to assemble method"))
        .collect();

    let (method, code) = &methods[0];
    let mut group = c.benchmark_group("irbuilder_single");
    group.throughput(Throughput::Elements(1));
    group.bench_function("build", |b| {
        b.iter(|| {
            let graph = IrBuilder::new(&runtime, *method, black_box(code))
                .build()
                .unwrap();
            black_box(graph)
        });
    });
    group.finish();

    let inputs: Vec<(MethodPtr, &MethodCode)> =
        methods.iter().map(|(method, code)| (*method, code)).collect();
    let mut group = c.benchmark_group("irbuilder_parallel");
    group.throughput(Throughput::Elements(inputs.len() as u64));
    group.bench_function("build_graphs", |b| {
        b.iter(|| {
            let graphs = build_graphs(
                &runtime,
                black_box(&inputs),
                BuilderOptions::default(),
                GraphMode::default(),
            );
            black_box(graphs)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
